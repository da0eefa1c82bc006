//! # Error Types
//!
//! Error taxonomy for the detection core. Most per-window conditions are
//! deliberately *not* errors: a window without a detectable pitch is a normal
//! outcome and is reported as a detection event, never as an `Err`. The
//! variants here cover the recoverable faults that callers may want to log
//! or react to.

use thiserror::Error;

/// Errors produced by the detection core.
///
/// None of these abort the detection loop. A `BufferOverflow` means samples
/// were dropped and processing continues; model errors mean the neural
/// adapter fell back to the classical estimators for the session.
#[derive(Debug, Error)]
pub enum PitchError {
    /// The ring buffer could not absorb an incoming chunk. The chunk was
    /// dropped in its entirety.
    #[error("ring buffer full, dropped {dropped} incoming samples")]
    BufferOverflow {
        /// Number of samples in the dropped chunk.
        dropped: usize,
    },

    /// Fetching the neural model artifact failed or timed out.
    #[error("model fetch failed: {0}")]
    ModelFetchFailed(String),

    /// The fetched artifact could not be turned into a working estimator.
    #[error("model initialization failed: {0}")]
    ModelInitFailed(String),

    /// A target pitch from the music-theory collaborator was rejected
    /// (unknown note label or nonsensical frequency).
    #[error("invalid target pitch: {0}")]
    UnknownTarget(String),

    /// A configuration option failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
