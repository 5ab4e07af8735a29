//! Pipeline error types.

use thiserror::Error;

/// Fatal pipeline errors.
///
/// Recoverable data conditions (malformed dates, missing ages) never
/// reach this type; they are handled by substituting nulls during
/// normalization. Anything that does reach it aborts the run: single
/// attempt, fail closed, no partial report.
#[derive(Debug, Error)]
pub enum DemostatError {
    #[error("Cannot read source {path}: {reason}")]
    Source { path: String, reason: String },

    #[error("Required columns missing from header: {}", missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("Chunk {index} failed: {reason}")]
    ChunkFailed { index: usize, reason: String },

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Chart rendering failed: {0}")]
    Chart(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, DemostatError>;
