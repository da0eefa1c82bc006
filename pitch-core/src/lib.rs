// pitch-core/src/lib.rs

//! The core logic for the pitch practice tool.
//! This crate turns raw audio sample chunks into stable, confidence-qualified
//! pitch detection events and compares them against a target note. It is
//! completely headless and contains no GUI code.
//!
//! ## Architecture
//! Raw chunks flow through a pre-allocated ring buffer into fixed-size
//! analysis windows. Each window is analyzed by the YIN estimator and a
//! weighted autocorrelation estimator, whose candidates are fused into one;
//! a stability filter smooths the stream of candidates into a reportable
//! pitch, and the note matcher grades it against the current target. An
//! optional neural estimator, loaded asynchronously from a cached model
//! artifact, supersedes the classical fusion once ready and silently falls
//! back if it never becomes available.

pub mod audio;
pub mod autocorr;
pub mod config;
pub mod error;
pub mod fusion;
pub mod neural;
pub mod notes;
pub mod pipeline;
pub mod ring;
pub mod stability;
pub mod yin;

pub use config::{MatchThresholds, PipelineConfig, YinProfile};
pub use error::PitchError;
pub use neural::{AdapterEvent, AdapterState, ModelCache, NeuralEstimatorAdapter};
pub use notes::{MatchResult, NoteMatcher, TargetPitch};
pub use pipeline::{DetectionEvent, DetectionPipeline, PitchReport};
pub use ring::SampleRingBuffer;
pub use stability::{StabilityFilter, StableReading};
pub use yin::{PitchCandidate, YinEstimator};
