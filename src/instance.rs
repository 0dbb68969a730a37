//! Problem instances and agent configurations for the mTSP/VRP solver.
//!
//! An [`Instance`] is a directed integer cost matrix over N nodes, optionally
//! carrying 2D display coordinates. Precedence constraints ("j must follow i")
//! are encoded in the matrix itself through [`PRECEDENCE_WEIGHT`] and must
//! form a DAG; this is the single canonical precedence representation used
//! by the crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel weight marking a precedence constraint: `w[i][j] == PRECEDENCE_WEIGHT`
/// requires node `j` to be visited after node `i`.
pub const PRECEDENCE_WEIGHT: i32 = -1;

/// Validation errors for instances and agent sets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstanceError {
    #[error("instance must contain at least one node")]
    Empty,

    #[error("weight matrix has {len} entries, expected {expected} for {n} nodes")]
    BadMatrixShape { n: usize, len: usize, expected: usize },

    #[error("negative weight {weight} at ({from}, {to}); only the precedence sentinel {PRECEDENCE_WEIGHT} is allowed")]
    NegativeWeight { from: usize, to: usize, weight: i32 },

    #[error("precedence constraints contain a cycle through node {node}")]
    CyclicPrecedence { node: usize },

    #[error("{count} coordinate pairs supplied for {n} nodes")]
    BadCoordinateCount { count: usize, n: usize },

    #[error("agent set is empty")]
    NoAgents,

    #[error("start and end position lists differ in length ({starts} vs {ends})")]
    MismatchedPositions { starts: usize, ends: usize },

    #[error("agent {agent} position {position} out of range for {n} nodes")]
    PositionOutOfRange { agent: usize, position: usize, n: usize },

    #[error("agents {first} and {second} share start position {position}, which is disallowed by the solve options")]
    SharedStartPosition { first: usize, second: usize, position: usize },
}

/// A directed mTSP/VRP instance: N nodes and a row-major N×N cost matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    name: String,
    n: usize,
    weights: Vec<i32>,
    coords: Option<Vec<(f64, f64)>>,
}

impl Instance {
    /// Build an instance from a row-major weight matrix, validating its shape,
    /// rejecting negative weights other than the precedence sentinel, and
    /// checking that precedence edges are acyclic.
    pub fn new(name: impl Into<String>, n: usize, weights: Vec<i32>) -> Result<Self, InstanceError> {
        if n == 0 {
            return Err(InstanceError::Empty);
        }
        let expected = n * n;
        if weights.len() != expected {
            return Err(InstanceError::BadMatrixShape { n, len: weights.len(), expected });
        }
        for (idx, &w) in weights.iter().enumerate() {
            if w < 0 && w != PRECEDENCE_WEIGHT {
                return Err(InstanceError::NegativeWeight { from: idx / n, to: idx % n, weight: w });
            }
        }
        let instance = Instance { name: name.into(), n, weights, coords: None };
        instance.check_precedence_acyclic()?;
        Ok(instance)
    }

    /// Attach 2D display coordinates, one pair per node. Only needed for
    /// rendering.
    pub fn with_coords(mut self, coords: Vec<(f64, f64)>) -> Result<Self, InstanceError> {
        if coords.len() != self.n {
            return Err(InstanceError::BadCoordinateCount { count: coords.len(), n: self.n });
        }
        self.coords = Some(coords);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of nodes.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Directed travel cost from `from` to `to`.
    #[inline]
    pub fn weight(&self, from: usize, to: usize) -> i32 {
        self.weights[from * self.n + to]
    }

    /// Whether the matrix marks "`to` must be visited after `from`".
    #[inline]
    pub fn is_precedence(&self, from: usize, to: usize) -> bool {
        self.weight(from, to) == PRECEDENCE_WEIGHT
    }

    /// The raw row-major matrix, as handed to the solver boundary.
    pub fn weights(&self) -> &[i32] {
        &self.weights
    }

    pub fn coords(&self) -> Option<&[(f64, f64)]> {
        self.coords.as_deref()
    }

    /// Iterative three-color DFS over the precedence edges.
    fn check_precedence_acyclic(&self) -> Result<(), InstanceError> {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let n = self.n;
        let mut color = vec![WHITE; n];

        for root in 0..n {
            if color[root] != WHITE {
                continue;
            }
            // Stack entries are (node, next successor to try).
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            color[root] = GRAY;

            while let Some(&(node, next)) = stack.last() {
                let mut cursor = next;
                let mut successor = None;
                while cursor < n {
                    let s = cursor;
                    cursor += 1;
                    if self.is_precedence(node, s) {
                        successor = Some(s);
                        break;
                    }
                }
                if let Some(top) = stack.last_mut() {
                    top.1 = cursor;
                }
                match successor {
                    Some(s) => match color[s] {
                        GRAY => return Err(InstanceError::CyclicPrecedence { node: s }),
                        WHITE => {
                            color[s] = GRAY;
                            stack.push((s, 0));
                        }
                        _ => {}
                    },
                    None => {
                        color[node] = BLACK;
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }
}

/// How per-agent tour lengths are aggregated into the global objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationMode {
    /// Minimize the sum of tour lengths.
    Sum,
    /// Minimize the longest tour.
    Max,
}

impl OptimizationMode {
    /// Aggregate per-agent objective contributions.
    pub fn aggregate(self, per_agent: impl IntoIterator<Item = f64>) -> f64 {
        match self {
            OptimizationMode::Sum => per_agent.into_iter().sum(),
            OptimizationMode::Max => per_agent.into_iter().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Translation to the solver boundary flag.
    pub fn as_flag(self) -> i32 {
        match self {
            OptimizationMode::Sum => 0,
            OptimizationMode::Max => 1,
        }
    }
}

impl std::fmt::Display for OptimizationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizationMode::Sum => write!(f, "sum"),
            OptimizationMode::Max => write!(f, "max"),
        }
    }
}

/// Per-agent start and end anchors. `start == end` makes the agent's tour
/// closed (it returns to its depot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSet {
    start_positions: Vec<usize>,
    end_positions: Vec<usize>,
}

impl AgentSet {
    pub fn new(start_positions: Vec<usize>, end_positions: Vec<usize>) -> Result<Self, InstanceError> {
        if start_positions.is_empty() {
            return Err(InstanceError::NoAgents);
        }
        if start_positions.len() != end_positions.len() {
            return Err(InstanceError::MismatchedPositions {
                starts: start_positions.len(),
                ends: end_positions.len(),
            });
        }
        Ok(AgentSet { start_positions, end_positions })
    }

    /// All agents start and end at the same depot node (closed tours).
    pub fn closed_at(depot: usize, agents: usize) -> Result<Self, InstanceError> {
        Self::new(vec![depot; agents], vec![depot; agents])
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.start_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start_positions.is_empty()
    }

    pub fn start_positions(&self) -> &[usize] {
        &self.start_positions
    }

    pub fn end_positions(&self) -> &[usize] {
        &self.end_positions
    }

    /// Whether agent `a`'s tour is closed.
    pub fn is_closed(&self, a: usize) -> bool {
        self.start_positions[a] == self.end_positions[a]
    }

    /// Check every anchor against the instance's node range, optionally
    /// rejecting repeated start positions (whether agents may share a depot
    /// is a configuration choice, not an assumption).
    pub fn validate_against(&self, instance: &Instance, allow_shared_starts: bool) -> Result<(), InstanceError> {
        let n = instance.n();
        for (agent, (&s, &e)) in self.start_positions.iter().zip(&self.end_positions).enumerate() {
            if s >= n {
                return Err(InstanceError::PositionOutOfRange { agent, position: s, n });
            }
            if e >= n {
                return Err(InstanceError::PositionOutOfRange { agent, position: e, n });
            }
        }
        if !allow_shared_starts {
            for i in 0..self.start_positions.len() {
                for j in i + 1..self.start_positions.len() {
                    if self.start_positions[i] == self.start_positions[j] {
                        return Err(InstanceError::SharedStartPosition {
                            first: i,
                            second: j,
                            position: self.start_positions[i],
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(n: usize, fill: i32) -> Vec<i32> {
        vec![fill; n * n]
    }

    #[test]
    fn test_rejects_bad_shape() {
        let err = Instance::new("bad", 3, vec![0; 8]).unwrap_err();
        assert_eq!(err, InstanceError::BadMatrixShape { n: 3, len: 8, expected: 9 });
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut w = square(2, 1);
        w[1] = -7;
        let err = Instance::new("bad", 2, w).unwrap_err();
        assert_eq!(err, InstanceError::NegativeWeight { from: 0, to: 1, weight: -7 });
    }

    #[test]
    fn test_precedence_sentinel_allowed() {
        let mut w = square(3, 1);
        w[2] = PRECEDENCE_WEIGHT; // (0, 2)
        let inst = Instance::new("prec", 3, w).unwrap();
        assert!(inst.is_precedence(0, 2));
        assert!(!inst.is_precedence(2, 0));
    }

    #[test]
    fn test_precedence_cycle_rejected() {
        let mut w = square(3, 1);
        w[1] = PRECEDENCE_WEIGHT; // 0 -> 1
        w[3 + 2] = PRECEDENCE_WEIGHT; // 1 -> 2
        w[2 * 3] = PRECEDENCE_WEIGHT; // 2 -> 0
        let err = Instance::new("cycle", 3, w).unwrap_err();
        assert!(matches!(err, InstanceError::CyclicPrecedence { .. }));
    }

    #[test]
    fn test_precedence_chain_accepted() {
        let mut w = square(4, 1);
        w[1] = PRECEDENCE_WEIGHT; // 0 -> 1
        w[4 + 2] = PRECEDENCE_WEIGHT; // 1 -> 2
        w[4 + 3] = PRECEDENCE_WEIGHT; // 1 -> 3
        assert!(Instance::new("dag", 4, w).is_ok());
    }

    #[test]
    fn test_agent_set_validation() {
        let inst = Instance::new("t", 4, square(4, 1)).unwrap();
        let agents = AgentSet::new(vec![0, 2], vec![0, 3]).unwrap();
        assert!(agents.validate_against(&inst, true).is_ok());
        assert!(agents.is_closed(0));
        assert!(!agents.is_closed(1));

        let out = AgentSet::new(vec![0, 4], vec![0, 0]).unwrap();
        assert_eq!(
            out.validate_against(&inst, true).unwrap_err(),
            InstanceError::PositionOutOfRange { agent: 1, position: 4, n: 4 }
        );
    }

    #[test]
    fn test_shared_starts_configurable() {
        let inst = Instance::new("t", 4, square(4, 1)).unwrap();
        let shared = AgentSet::closed_at(0, 2).unwrap();
        assert!(shared.validate_against(&inst, true).is_ok());
        assert_eq!(
            shared.validate_against(&inst, false).unwrap_err(),
            InstanceError::SharedStartPosition { first: 0, second: 1, position: 0 }
        );
    }

    #[test]
    fn test_mode_aggregation() {
        let lengths = [3.0, 7.0, 2.0];
        assert_eq!(OptimizationMode::Sum.aggregate(lengths), 12.0);
        assert_eq!(OptimizationMode::Max.aggregate(lengths), 7.0);
        assert_eq!(OptimizationMode::Sum.as_flag(), 0);
        assert_eq!(OptimizationMode::Max.as_flag(), 1);
    }
}
