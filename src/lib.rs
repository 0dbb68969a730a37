//! mTSP/VRP Solver Driver Library
//!
//! Host-side plumbing around an external branch-and-bound mTSP/VRP solver
//! that is reached through a single blocking call with an optional
//! streaming callback.
//!
//! # Features
//!
//! - Packed path buffer decoding into per-agent tours with travel lengths
//! - Anytime lower/upper bound tracking and optimality-gap computation
//! - Deep-copied capture of fractional relaxation snapshots from the
//!   solver's callback
//! - Live certification of results against best-known reference bounds
//! - Sequential benchmarking with incremental JSON persistence
//! - Deterministic SVG rendering of relaxation snapshots
//!
//! # Example
//!
//! ```no_run
//! use mtsp_vrp::instance::{AgentSet, Instance, OptimizationMode};
//! use mtsp_vrp::solver::{SolveOptions, SolverGateway};
//! # use mtsp_vrp::solver::{RawMtspSolver, RawSolveOutput, RawSolveRequest};
//! # struct Native;
//! # impl RawMtspSolver for Native {
//! #     fn solve_raw(&self, _: &RawSolveRequest<'_>, _: &mut RawSolveOutput<'_>,
//! #         _: Option<&mut dyn FnMut(&[f64]) -> i32>) -> i32 { 0 }
//! # }
//!
//! let instance = Instance::new("square", 4, vec![
//!     0, 1, 2, 1,
//!     1, 0, 1, 2,
//!     2, 1, 0, 1,
//!     1, 2, 1, 0,
//! ]).unwrap();
//! let agents = AgentSet::closed_at(0, 2).unwrap();
//!
//! let gateway = SolverGateway::new(Native);
//! let options = SolveOptions { mode: OptimizationMode::Max, ..Default::default() };
//! let outcome = gateway.solve(&instance, &agents, &options).unwrap();
//!
//! println!("bounds {} over {} tours", outcome.result.bounds, outcome.result.tours.len());
//! ```

pub mod benchmark;
pub mod certify;
pub mod error;
pub mod instance;
pub mod snapshot;
pub mod solver;
pub mod tours;
pub mod visualization;

pub use benchmark::{Benchmark, BenchmarkConfig, BenchmarkInstance, BenchmarkRecord};
pub use certify::{BoundCertifier, CertificationViolation, ReferenceDb, ReferenceSolution};
pub use error::{Error, Result};
pub use instance::{AgentSet, Instance, OptimizationMode, PRECEDENCE_WEIGHT};
pub use snapshot::{FractionalSnapshot, SnapshotStore};
pub use solver::{
    RawMtspSolver, SolveError, SolveOptions, SolveOutcome, SolveResult, SolverGateway,
};
pub use tours::{decode, Bounds, DecodeError, DecodedTours, PackedPaths};
pub use visualization::RelaxationRenderer;
