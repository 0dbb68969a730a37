//! The single blocking call into the external mTSP/VRP solver.
//!
//! [`RawMtspSolver`] is the call boundary: flat input slices, out-parameters
//! for bounds and the packed path buffer, and an optional streaming callback
//! that observes fractional relaxation snapshots mid-search. The snapshot
//! slice handed to the callback is valid only for that invocation, so the
//! gateway deep-copies it into a per-call [`SnapshotStore`] before returning.
//!
//! [`SolverGateway`] wraps the raw call with input validation, status-code
//! mapping, and output decoding. Status codes are surfaced unchanged as
//! [`SolveError`] variants; there is no internal retry.

#[cfg(feature = "ffi")]
pub mod ffi;

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::error::Error;
use crate::instance::{AgentSet, Instance, OptimizationMode};
use crate::snapshot::{FractionalSnapshot, SnapshotStore};
use crate::tours::{decode, Bounds, PackedPaths};

/// Marshalled inputs for one raw solve call.
#[derive(Debug)]
pub struct RawSolveRequest<'a> {
    pub num_agents: usize,
    pub num_nodes: usize,
    pub start_positions: &'a [usize],
    pub end_positions: &'a [usize],
    pub weights: &'a [i32],
    pub optimization_mode: i32,
    pub timeout_ms: i32,
    pub num_threads: usize,
}

/// Caller-owned output buffers for one raw solve call.
#[derive(Debug)]
pub struct RawSolveOutput<'a> {
    pub lower_bound: &'a mut f64,
    pub upper_bound: &'a mut f64,
    pub paths: &'a mut [usize],
    pub offsets: &'a mut [usize],
}

/// Status code for a call that found a result before the timeout.
pub const STATUS_SOLVED: i32 = 0;
/// Status code for a call that hit the timeout but still has a result; the
/// bounds carry the remaining gap.
pub const STATUS_TIMEOUT_WITH_RESULT: i32 = 1;

/// The call boundary to the external solver.
///
/// Implementations must treat `on_fractional` as a rendezvous point: each
/// invocation completes before search progress resumes, and the slice it
/// receives must not be retained past the invocation.
pub trait RawMtspSolver {
    fn solve_raw(
        &self,
        request: &RawSolveRequest<'_>,
        output: &mut RawSolveOutput<'_>,
        on_fractional: Option<&mut dyn FnMut(&[f64]) -> i32>,
    ) -> i32;
}

/// Terminal failures reported by the solver, mapped 1:1 from its status
/// codes and never retried or transformed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SolveError {
    #[error("solver timed out without producing any result")]
    TimeoutNoResult,

    #[error("instance is infeasible")]
    Infeasible,

    #[error("solver rejected the input sizes")]
    InvalidInputSize,

    #[error("solver rejected an input pointer")]
    InvalidInputPointer,

    #[error("precedence constraints are cyclic")]
    CyclicDependency,

    #[error("precedence constraints are incompatible with the agent configuration")]
    IncompatibleDependency,

    #[error("solver returned unknown status code {0}")]
    UnknownStatus(i32),
}

impl SolveError {
    /// Map a negative status code to its error; `None` for non-negative
    /// codes, which denote a usable result.
    pub fn from_status(code: i32) -> Option<Self> {
        match code {
            c if c >= 0 => None,
            -1 => Some(SolveError::TimeoutNoResult),
            -2 => Some(SolveError::Infeasible),
            -3 => Some(SolveError::InvalidInputSize),
            -4 => Some(SolveError::InvalidInputPointer),
            -5 => Some(SolveError::CyclicDependency),
            -6 => Some(SolveError::IncompatibleDependency),
            c => Some(SolveError::UnknownStatus(c)),
        }
    }
}

/// Options for one solve call.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    pub mode: OptimizationMode,
    pub timeout: Duration,
    pub threads: usize,
    /// `Some(k)` wires the fractional callback and retains every k-th
    /// snapshot; `None` leaves the callback unwired.
    pub snapshot_stride: Option<usize>,
    /// Whether several agents may share a start position.
    pub allow_shared_starts: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            mode: OptimizationMode::Sum,
            timeout: Duration::from_secs(5 * 60),
            threads: 1,
            snapshot_stride: None,
            allow_shared_starts: true,
        }
    }
}

/// Decoded result of a successful solve call.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub bounds: Bounds,
    /// Per-agent ordered node sequences; together they partition [0, N).
    pub tours: Vec<Vec<usize>>,
    /// Per-agent tour lengths, including closing edges for closed tours.
    pub lengths: Vec<i64>,
    /// The solver hit its timeout but still produced this (unproven) result.
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl SolveResult {
    /// Optimality was proven.
    pub fn is_optimal(&self) -> bool {
        self.bounds.is_optimal()
    }
}

/// A solve result together with the snapshots captured during the search.
#[derive(Debug)]
pub struct SolveOutcome {
    pub result: SolveResult,
    pub snapshots: Vec<FractionalSnapshot>,
}

/// Owns the blocking call into the external solver.
pub struct SolverGateway<S> {
    raw: S,
}

impl<S: RawMtspSolver> SolverGateway<S> {
    pub fn new(raw: S) -> Self {
        SolverGateway { raw }
    }

    pub fn raw(&self) -> &S {
        &self.raw
    }

    /// Run one blocking solve. Validates inputs, wires the optional snapshot
    /// capture, maps the status code, and decodes the packed path buffer.
    pub fn solve(
        &self,
        instance: &Instance,
        agents: &AgentSet,
        options: &SolveOptions,
    ) -> Result<SolveOutcome, Error> {
        agents.validate_against(instance, options.allow_shared_starts)?;

        let num_agents = agents.len();
        let num_nodes = instance.n();

        let request = RawSolveRequest {
            num_agents,
            num_nodes,
            start_positions: agents.start_positions(),
            end_positions: agents.end_positions(),
            weights: instance.weights(),
            optimization_mode: options.mode.as_flag(),
            timeout_ms: options.timeout.as_millis().min(i32::MAX as u128) as i32,
            num_threads: options.threads.max(1),
        };

        let mut lower = 0.0;
        let mut upper = 0.0;
        let mut paths = vec![0usize; num_nodes];
        let mut offsets = vec![0usize; num_agents];
        let mut output = RawSolveOutput {
            lower_bound: &mut lower,
            upper_bound: &mut upper,
            paths: &mut paths,
            offsets: &mut offsets,
        };

        // The store lives exactly as long as this call; snapshots are
        // deep-copied into it before each callback invocation returns.
        let store = options.snapshot_stride.map(SnapshotStore::with_stride);

        let started = Instant::now();
        let status = match &store {
            Some(store) => {
                let mut capture = |raw: &[f64]| -> i32 {
                    match FractionalSnapshot::from_raw(raw, num_agents, num_nodes) {
                        Ok(snapshot) => {
                            store.record(snapshot);
                            0
                        }
                        Err(e) => {
                            log::error!("dropping malformed fractional snapshot: {}", e);
                            0
                        }
                    }
                };
                self.raw.solve_raw(&request, &mut output, Some(&mut capture))
            }
            None => self.raw.solve_raw(&request, &mut output, None),
        };
        let elapsed = started.elapsed();

        if let Some(err) = SolveError::from_status(status) {
            log::warn!("solver failed on '{}': {}", instance.name(), err);
            return Err(err.into());
        }

        let packed = PackedPaths { paths, offsets };
        let decoded = decode(&packed, agents, instance)?;

        let result = SolveResult {
            bounds: Bounds::new(lower, upper),
            tours: decoded.tours,
            lengths: decoded.lengths,
            timed_out: status == STATUS_TIMEOUT_WITH_RESULT,
            elapsed,
        };
        log::debug!(
            "solved '{}' with {} agents: bounds {}, {} snapshot(s)",
            instance.name(),
            num_agents,
            result.bounds,
            store.as_ref().map_or(0, SnapshotStore::len),
        );

        let snapshots = store.map(SnapshotStore::into_snapshots).unwrap_or_default();
        Ok(SolveOutcome { result, snapshots })
    }
}
