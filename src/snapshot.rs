//! Fractional relaxation snapshots captured during the search.
//!
//! The solver delivers each snapshot as a raw row-major A×N×N tensor whose
//! backing memory is valid only for the duration of one callback invocation.
//! [`FractionalSnapshot::from_raw`] validates the element count and takes a
//! deep copy at that boundary; nothing in the crate reads the source memory
//! afterwards.

use std::sync::Mutex;

use thiserror::Error;

use crate::instance::{Instance, OptimizationMode};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("tensor has {len} values, expected {expected} ({agents}x{nodes}x{nodes})")]
pub struct TensorShapeError {
    pub agents: usize,
    pub nodes: usize,
    pub len: usize,
    pub expected: usize,
}

/// One intermediate edge-selection state of the LP relaxation:
/// `value(a, s, t)` is the weight with which agent `a` traverses `s -> t`.
#[derive(Debug, Clone, PartialEq)]
pub struct FractionalSnapshot {
    agents: usize,
    nodes: usize,
    values: Vec<f64>,
}

impl FractionalSnapshot {
    /// Deep-copy a raw row-major tensor after validating its element count.
    pub fn from_raw(raw: &[f64], agents: usize, nodes: usize) -> Result<Self, TensorShapeError> {
        let expected = agents * nodes * nodes;
        if raw.len() != expected {
            return Err(TensorShapeError { agents, nodes, len: raw.len(), expected });
        }
        Ok(FractionalSnapshot { agents, nodes, values: raw.to_vec() })
    }

    /// An all-zero tensor, mainly for tests and renderer fixtures.
    pub fn zeros(agents: usize, nodes: usize) -> Self {
        FractionalSnapshot { agents, nodes, values: vec![0.0; agents * nodes * nodes] }
    }

    pub fn agents(&self) -> usize {
        self.agents
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    #[inline]
    pub fn value(&self, agent: usize, from: usize, to: usize) -> f64 {
        self.values[(agent * self.nodes + from) * self.nodes + to]
    }

    #[inline]
    pub fn set(&mut self, agent: usize, from: usize, to: usize, value: f64) {
        self.values[(agent * self.nodes + from) * self.nodes + to] = value;
    }

    /// Zero the `from -> to` entry for every agent. Used to suppress the
    /// artificial inter-agent sequencing edges before rendering.
    pub fn zero_edge(&mut self, from: usize, to: usize) {
        for a in 0..self.agents {
            self.set(a, from, to, 0.0);
        }
    }

    /// Agent `a`'s relaxation objective: sum of weight times selection value
    /// over all edges.
    pub fn agent_objective(&self, a: usize, instance: &Instance) -> f64 {
        let mut total = 0.0;
        for s in 0..self.nodes {
            for t in 0..self.nodes {
                total += f64::from(instance.weight(s, t)) * self.value(a, s, t);
            }
        }
        total
    }

    /// The global relaxation objective under the given aggregation mode.
    pub fn objective(&self, instance: &Instance, mode: OptimizationMode) -> f64 {
        mode.aggregate((0..self.agents).map(|a| self.agent_objective(a, instance)))
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    seen: usize,
    retained: Vec<FractionalSnapshot>,
}

/// Append-only store of deep-copied snapshots in solver-emission order,
/// retaining every `stride`-th one.
///
/// The collaborator is assumed to serialize callback invocations, but that
/// guarantee is informal, so the store is guarded by a mutex and safe to
/// append from a collaborator-owned thread.
#[derive(Debug)]
pub struct SnapshotStore {
    stride: usize,
    inner: Mutex<StoreInner>,
}

impl SnapshotStore {
    /// Retain every snapshot.
    pub fn new() -> Self {
        Self::with_stride(1)
    }

    /// Retain snapshots 0, `stride`, `2*stride`, ... in emission order.
    pub fn with_stride(stride: usize) -> Self {
        SnapshotStore {
            stride: stride.max(1),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Record one emission; keeps it only if it falls on the stride.
    pub fn record(&self, snapshot: FractionalSnapshot) {
        let mut inner = self.lock();
        if inner.seen % self.stride == 0 {
            inner.retained.push(snapshot);
        }
        inner.seen += 1;
    }

    /// Total number of emissions observed, retained or not.
    pub fn seen(&self) -> usize {
        self.lock().seen
    }

    pub fn len(&self) -> usize {
        self.lock().retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the store, yielding the retained snapshots in emission order.
    pub fn into_snapshots(self) -> Vec<FractionalSnapshot> {
        match self.inner.into_inner() {
            Ok(inner) => inner.retained,
            Err(poisoned) => poisoned.into_inner().retained,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;

    #[test]
    fn test_from_raw_validates_shape() {
        let raw = vec![0.5; 2 * 3 * 3];
        let snap = FractionalSnapshot::from_raw(&raw, 2, 3).unwrap();
        assert_eq!(snap.value(1, 2, 2), 0.5);

        let err = FractionalSnapshot::from_raw(&raw, 2, 4).unwrap_err();
        assert_eq!(err, TensorShapeError { agents: 2, nodes: 4, len: 18, expected: 32 });
    }

    #[test]
    fn test_from_raw_is_a_deep_copy() {
        let mut raw = vec![0.25; 1 * 2 * 2];
        let snap = FractionalSnapshot::from_raw(&raw, 1, 2).unwrap();
        raw[0] = 0.75;
        assert_eq!(snap.value(0, 0, 0), 0.25);
    }

    #[test]
    fn test_zero_edge_hits_all_agents() {
        let mut snap = FractionalSnapshot::zeros(2, 3);
        snap.set(0, 1, 2, 0.4);
        snap.set(1, 1, 2, 0.6);
        snap.set(1, 2, 1, 0.9);
        snap.zero_edge(1, 2);
        assert_eq!(snap.value(0, 1, 2), 0.0);
        assert_eq!(snap.value(1, 1, 2), 0.0);
        assert_eq!(snap.value(1, 2, 1), 0.9);
    }

    #[test]
    fn test_objective_aggregation() {
        let inst = Instance::new("obj", 2, vec![0, 4, 6, 0]).unwrap();
        let mut snap = FractionalSnapshot::zeros(2, 2);
        snap.set(0, 0, 1, 1.0); // contributes 4
        snap.set(1, 1, 0, 0.5); // contributes 3
        assert_eq!(snap.objective(&inst, OptimizationMode::Sum), 7.0);
        assert_eq!(snap.objective(&inst, OptimizationMode::Max), 4.0);
    }

    #[test]
    fn test_store_keeps_emission_order() {
        let store = SnapshotStore::new();
        for i in 0..4 {
            let mut s = FractionalSnapshot::zeros(1, 2);
            s.set(0, 0, 1, i as f64);
            store.record(s);
        }
        let kept = store.into_snapshots();
        let values: Vec<f64> = kept.iter().map(|s| s.value(0, 0, 1)).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_store_stride_sampling() {
        let store = SnapshotStore::with_stride(3);
        for i in 0..8 {
            let mut s = FractionalSnapshot::zeros(1, 2);
            s.set(0, 0, 1, i as f64);
            store.record(s);
        }
        assert_eq!(store.seen(), 8);
        let kept = store.into_snapshots();
        let values: Vec<f64> = kept.iter().map(|s| s.value(0, 0, 1)).collect();
        assert_eq!(values, vec![0.0, 3.0, 6.0]);
    }

    #[test]
    fn test_stride_zero_behaves_like_one() {
        let store = SnapshotStore::with_stride(0);
        store.record(FractionalSnapshot::zeros(1, 1));
        store.record(FractionalSnapshot::zeros(1, 1));
        assert_eq!(store.len(), 2);
    }
}
