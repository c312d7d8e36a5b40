//! Error types surfaced by the core.
//!
//! Per the error-handling design: unsupported configuration is the only
//! class of failure that is reported to the caller as a `Result`. Invariant
//! violations (programming bugs) use `debug_assert!`/`unreachable!` instead,
//! and degenerate input (zero-area triangles, fully clipped polygons, empty
//! spans) is never an error — it is represented with `Option`/empty
//! collections and silently discarded by the caller.

use thiserror::Error;

/// Unsupported-configuration and resource-exhaustion failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    #[error("unsupported sample count {0} (only 1 and 4 are supported)")]
    UnsupportedSampleCount(u32),

    #[error("alpha-to-one is not supported")]
    AlphaToOneUnsupported,

    #[error("draw call submitted with no free ring slot")]
    DrawQueueFull,

    #[error("unsupported configuration: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = core::result::Result<T, PipelineError>;
