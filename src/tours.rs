//! Tour decoding and bound tracking.
//!
//! The solver boundary returns tours in a packed run-length form: one flat
//! buffer of node indices of total length N plus a per-agent offset table.
//! That encoding exists only at the wire boundary; everything above it works
//! with an explicit sequence of per-agent tours.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::instance::{AgentSet, Instance};

/// The wire-level tour encoding: `paths` is a flat buffer of node indices and
/// `offsets[a]` is the start of agent `a`'s segment (its end is the next
/// offset, or the buffer length for the last agent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedPaths {
    pub paths: Vec<usize>,
    pub offsets: Vec<usize>,
}

/// Violations of the packed-buffer contract. These indicate a broken
/// producer, not a user error, and are treated as fatal by the callers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("offset table is empty")]
    EmptyOffsets,

    #[error("first offset is {0}, expected 0")]
    NonZeroFirstOffset(usize),

    #[error("offsets decrease at agent {agent} ({prev} -> {next})")]
    DecreasingOffsets { agent: usize, prev: usize, next: usize },

    #[error("offset {offset} of agent {agent} exceeds buffer length {len}")]
    OffsetOutOfRange { agent: usize, offset: usize, len: usize },

    #[error("agent count {agents} does not match offset table length {offsets}")]
    AgentCountMismatch { agents: usize, offsets: usize },

    #[error("node index {node} out of range for {n} nodes")]
    NodeOutOfRange { node: usize, n: usize },
}

/// Decoded per-agent tours with their travel lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTours {
    pub tours: Vec<Vec<usize>>,
    pub lengths: Vec<i64>,
}

/// Split the packed buffer into per-agent tours and compute each tour's
/// travel cost. A closed tour (agent start == end) of at least two nodes
/// additionally pays the closing edge back to its first node; open tours and
/// degenerate single-node tours never do.
pub fn decode(packed: &PackedPaths, agents: &AgentSet, instance: &Instance) -> Result<DecodedTours, DecodeError> {
    let num_agents = agents.len();
    let len = packed.paths.len();

    if packed.offsets.is_empty() {
        return Err(DecodeError::EmptyOffsets);
    }
    if packed.offsets.len() != num_agents {
        return Err(DecodeError::AgentCountMismatch { agents: num_agents, offsets: packed.offsets.len() });
    }
    if packed.offsets[0] != 0 {
        return Err(DecodeError::NonZeroFirstOffset(packed.offsets[0]));
    }
    for a in 1..num_agents {
        if packed.offsets[a] < packed.offsets[a - 1] {
            return Err(DecodeError::DecreasingOffsets {
                agent: a,
                prev: packed.offsets[a - 1],
                next: packed.offsets[a],
            });
        }
    }
    for (a, &off) in packed.offsets.iter().enumerate() {
        if off > len {
            return Err(DecodeError::OffsetOutOfRange { agent: a, offset: off, len });
        }
    }

    let n = instance.n();
    let mut tours = Vec::with_capacity(num_agents);
    let mut lengths = Vec::with_capacity(num_agents);

    for a in 0..num_agents {
        let start = packed.offsets[a];
        let end = if a + 1 < num_agents { packed.offsets[a + 1] } else { len };
        let segment = &packed.paths[start..end];

        for &node in segment {
            if node >= n {
                return Err(DecodeError::NodeOutOfRange { node, n });
            }
        }

        let mut length: i64 = 0;
        for pair in segment.windows(2) {
            length += i64::from(instance.weight(pair[0], pair[1]));
        }
        if agents.is_closed(a) && segment.len() >= 2 {
            length += i64::from(instance.weight(segment[segment.len() - 1], segment[0]));
        }

        tours.push(segment.to_vec());
        lengths.push(length);
    }

    Ok(DecodedTours { tours, lengths })
}

/// An anytime lower/upper bound pair on the global objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Bounds { lower, upper }
    }

    /// Relative optimality gap `upper / lower - 1`, or infinity when the
    /// lower bound is not positive.
    pub fn gap(&self) -> f64 {
        if self.lower > 0.0 {
            self.upper / self.lower - 1.0
        } else {
            f64::INFINITY
        }
    }

    /// The search has proven optimality.
    pub fn is_optimal(&self) -> bool {
        self.lower >= self.upper
    }

    /// `lower > upper` can only come from a solver or decoder defect. It is
    /// never clamped here; the certifier turns it into a fatal violation.
    pub fn is_consistent(&self) -> bool {
        self.lower <= self.upper
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::AgentSet;

    fn instance(n: usize) -> Instance {
        // w[i][j] = 10*i + j, so every edge cost is distinct
        let weights = (0..n * n).map(|idx| (10 * (idx / n) + idx % n) as i32).collect();
        Instance::new("grid", n, weights).unwrap()
    }

    #[test]
    fn test_decode_partitions_buffer() {
        let inst = instance(6);
        let agents = AgentSet::new(vec![0, 3, 5], vec![0, 4, 5]).unwrap();
        let packed = PackedPaths { paths: vec![0, 1, 2, 3, 4, 5], offsets: vec![0, 3, 5] };

        let decoded = decode(&packed, &agents, &inst).unwrap();
        assert_eq!(decoded.tours, vec![vec![0, 1, 2], vec![3, 4], vec![5]]);

        let total: usize = decoded.tours.iter().map(Vec::len).sum();
        assert_eq!(total, packed.paths.len());
    }

    #[test]
    fn test_decode_round_trips() {
        let inst = instance(6);
        let agents = AgentSet::new(vec![0, 2], vec![1, 5]).unwrap();
        let packed = PackedPaths { paths: vec![0, 1, 2, 3, 4, 5], offsets: vec![0, 2] };

        let decoded = decode(&packed, &agents, &inst).unwrap();
        let rebuilt: Vec<usize> = decoded.tours.concat();
        assert_eq!(rebuilt, packed.paths);
    }

    #[test]
    fn test_closed_tour_pays_closing_edge() {
        let inst = instance(4);
        let closed = AgentSet::closed_at(0, 1).unwrap();
        let open = AgentSet::new(vec![0], vec![3]).unwrap();
        let packed = PackedPaths { paths: vec![0, 1, 2, 3], offsets: vec![0] };

        // open: w(0,1) + w(1,2) + w(2,3) = 1 + 12 + 23 = 36
        let open_len = decode(&packed, &open, &inst).unwrap().lengths[0];
        assert_eq!(open_len, 36);

        // closed adds w(3,0) = 30
        let closed_len = decode(&packed, &closed, &inst).unwrap().lengths[0];
        assert_eq!(closed_len, 66);
    }

    #[test]
    fn test_single_node_closed_tour_has_zero_length() {
        let inst = instance(3);
        let agents = AgentSet::new(vec![0, 1], vec![0, 1]).unwrap();
        let packed = PackedPaths { paths: vec![0, 1, 2], offsets: vec![0, 1] };

        let decoded = decode(&packed, &agents, &inst).unwrap();
        // agent 0 visits only node 0: no closing edge despite start == end
        assert_eq!(decoded.lengths[0], 0);
        // agent 1 visits [1, 2], closed: w(1,2) + w(2,1) = 12 + 21
        assert_eq!(decoded.lengths[1], 33);
    }

    #[test]
    fn test_decode_rejects_bad_offsets() {
        let inst = instance(4);
        let agents = AgentSet::closed_at(0, 2).unwrap();

        let valid = PackedPaths { paths: vec![0, 1, 2, 3], offsets: vec![0, 3] };
        assert!(decode(&valid, &agents, &inst).is_ok());

        let shifted = PackedPaths { paths: vec![0, 1, 2, 3], offsets: vec![2, 3] };
        assert_eq!(
            decode(&shifted, &agents, &inst).unwrap_err(),
            DecodeError::NonZeroFirstOffset(2)
        );

        let backwards = PackedPaths { paths: vec![0, 1, 2, 3], offsets: vec![0, 5] };
        assert_eq!(
            decode(&backwards, &agents, &inst).unwrap_err(),
            DecodeError::OffsetOutOfRange { agent: 1, offset: 5, len: 4 }
        );

        let three = AgentSet::closed_at(0, 3).unwrap();
        let bad = PackedPaths { paths: vec![0, 1, 2, 3], offsets: vec![0, 3, 2] };
        assert_eq!(
            decode(&bad, &three, &inst).unwrap_err(),
            DecodeError::DecreasingOffsets { agent: 2, prev: 3, next: 2 }
        );

        let wrong_count = PackedPaths { paths: vec![0, 1, 2, 3], offsets: vec![0] };
        assert_eq!(
            decode(&wrong_count, &agents, &inst).unwrap_err(),
            DecodeError::AgentCountMismatch { agents: 2, offsets: 1 }
        );
    }

    #[test]
    fn test_decode_rejects_out_of_range_node() {
        let inst = instance(3);
        let agents = AgentSet::closed_at(0, 1).unwrap();
        let packed = PackedPaths { paths: vec![0, 7, 2], offsets: vec![0] };
        assert_eq!(
            decode(&packed, &agents, &inst).unwrap_err(),
            DecodeError::NodeOutOfRange { node: 7, n: 3 }
        );
    }

    #[test]
    fn test_gap_zero_iff_equal() {
        assert_eq!(Bounds::new(7542.0, 7542.0).gap(), 0.0);
        assert!(Bounds::new(7542.0, 7543.0).gap() > 0.0);
        assert!(Bounds::new(0.0, 5.0).gap().is_infinite());
    }

    #[test]
    fn test_gap_monotone() {
        let base = Bounds::new(100.0, 110.0).gap();
        assert!(Bounds::new(100.0, 120.0).gap() > base);
        assert!(Bounds::new(90.0, 110.0).gap() > base);
        assert!(Bounds::new(105.0, 110.0).gap() < base);
    }

    #[test]
    fn test_bounds_consistency() {
        assert!(Bounds::new(5.0, 5.0).is_optimal());
        assert!(Bounds::new(5.0, 6.0).is_consistent());
        assert!(!Bounds::new(6.0, 5.0).is_consistent());
    }
}
