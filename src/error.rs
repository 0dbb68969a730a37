//! Crate-wide error type.
//!
//! Each failure domain keeps its own enum next to the code that produces it
//! (solver status codes, decoding faults, certification violations); this
//! module only unifies them for callers that drive a whole run.

use thiserror::Error;

use crate::certify::CertificationViolation;
use crate::instance::InstanceError;
use crate::solver::SolveError;
use crate::tours::DecodeError;

/// Result alias used by the higher-level entry points.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The external solver reported a terminal status code.
    #[error(transparent)]
    Solve(#[from] SolveError),

    /// The packed path buffer or offset table violated the producer contract.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Solver output contradicted best-known reference bounds.
    #[error(transparent)]
    Certification(#[from] CertificationViolation),

    /// The instance or agent configuration is malformed.
    #[error(transparent)]
    Instance(#[from] InstanceError),

    /// The instance carries no node coordinates, so it cannot be drawn.
    #[error("instance '{0}' has no node coordinates to render")]
    MissingCoordinates(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// SVG rasterization failed (only with the `resvg` feature).
    #[error("render error: {0}")]
    Render(String),
}
