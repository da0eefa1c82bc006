//! # Pipeline Configuration
//!
//! All tunable parameters for the detection pipeline, gathered into explicit
//! config structs instead of constants buried in the detection logic. The
//! structs are serde-derived so a front end can persist them; the core itself
//! never reads or writes settings.

use serde::{Deserialize, Serialize};

use crate::error::PitchError;

/// Threshold parameters for a single YIN detection pass.
///
/// Two profiles are typically in play: the normal profile, and a more
/// sensitive low-frequency profile used when the current target note sits
/// below [`MatchThresholds::low_freq_cutoff_hz`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YinProfile {
    /// Absolute threshold on the normalized difference function. The first
    /// local minimum below this value is taken as the period candidate.
    pub threshold: f32,
    /// Minimum acceptable confidence (1 minus the normalized difference at
    /// the chosen period). Results below this are reported as "no pitch".
    pub probability_cliff: f32,
}

impl YinProfile {
    /// Profile for general-purpose detection.
    pub fn normal() -> Self {
        YinProfile {
            threshold: 0.15,
            probability_cliff: 0.10,
        }
    }

    /// More sensitive profile for targets below the low-frequency cutoff,
    /// where the period length approaches the analysis window size.
    pub fn low_frequency() -> Self {
        YinProfile {
            threshold: 0.05,
            probability_cliff: 0.05,
        }
    }
}

/// Cents tolerances for deciding whether a detected pitch matches the target.
///
/// Tolerance is deliberately policy, not a single magic number: very low
/// notes are detected with less precision, and the root note of an exercise
/// is perceptually more forgiving.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchThresholds {
    /// Tolerance in cents for ordinary notes.
    pub default_cents: f32,
    /// Tolerance in cents when the target is the root note of the exercise.
    pub root_note_cents: f32,
    /// Tolerance in cents for detections below `low_freq_cutoff_hz`.
    pub low_freq_cents: f32,
    /// Detections below this frequency use `low_freq_cents`.
    pub low_freq_cutoff_hz: f32,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        MatchThresholds {
            default_cents: 15.0,
            root_note_cents: 25.0,
            low_freq_cents: 35.0,
            low_freq_cutoff_hz: 110.0,
        }
    }
}

/// Complete configuration for a [`DetectionPipeline`](crate::pipeline::DetectionPipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sample rate of the incoming audio in Hz.
    pub sample_rate: u32,
    /// Analysis window size in samples. Fixed for the pipeline's lifetime.
    pub window_size: usize,
    /// Ring buffer capacity as a multiple of the window size (>= 2, default 4).
    pub ring_capacity_windows: usize,
    /// YIN parameters for ordinary targets.
    pub yin: YinProfile,
    /// YIN parameters used when the target sits below the low-frequency cutoff.
    pub yin_low_freq: YinProfile,
    /// Frequencies outside this range are rejected by every estimator.
    pub plausible_range_hz: (f32, f32),
    /// Frequencies whose lag neighborhoods the autocorrelation estimator
    /// boosts. Defaults to F4 and F♯4, a historically under-detected band;
    /// set to empty for a neutral estimator.
    pub emphasis_hz: Vec<f32>,
    /// Signal level (combined RMS/peak measure) below which a window is
    /// reported as silence.
    pub min_level: f32,
    /// Minimum window RMS for a detection at or above the low-frequency
    /// cutoff to be reported. Low notes keep the lower `min_level` floor.
    pub min_level_high: f32,
    /// Cents tolerance policy for target matching.
    pub match_thresholds: MatchThresholds,
    /// Number of recent candidates the stability filter keeps.
    pub stability_history: usize,
    /// Relative tolerance for two readings to count as "the same pitch"
    /// (0.03 means +-3%).
    pub stability_tolerance: f32,
    /// Consecutive agreeing windows required before the stability filter
    /// locks onto a new pitch.
    pub stability_lock_streak: u32,
    /// Whether to re-test `frequency / 2` with a second YIN pass for
    /// low-frequency detections. A heuristic octave correction, not a
    /// guaranteed resolver; disable it if it double-detects on your input.
    pub halving_correction: bool,
    /// Maximum distance in Hz between the second pass and `frequency / 2`
    /// for the halving correction to apply.
    pub halving_tolerance_hz: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            sample_rate: 44_100,
            window_size: 2048,
            ring_capacity_windows: 4,
            yin: YinProfile::normal(),
            yin_low_freq: YinProfile::low_frequency(),
            plausible_range_hz: (50.0, 2000.0),
            emphasis_hz: vec![349.23, 369.99],
            min_level: 0.001,
            min_level_high: 0.002,
            match_thresholds: MatchThresholds::default(),
            stability_history: 8,
            stability_tolerance: 0.03,
            stability_lock_streak: 4,
            halving_correction: true,
            halving_tolerance_hz: 5.0,
        }
    }
}

impl PipelineConfig {
    /// Checks the configuration for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), PitchError> {
        if self.sample_rate == 0 {
            return Err(PitchError::InvalidConfig("sample_rate must be non-zero".into()));
        }
        if self.window_size < 64 {
            return Err(PitchError::InvalidConfig(
                "window_size must be at least 64 samples".into(),
            ));
        }
        if self.ring_capacity_windows < 2 {
            return Err(PitchError::InvalidConfig(
                "ring_capacity_windows must be at least 2".into(),
            ));
        }
        let (lo, hi) = self.plausible_range_hz;
        if !(lo > 0.0 && hi > lo) {
            return Err(PitchError::InvalidConfig(
                "plausible_range_hz must satisfy 0 < min < max".into(),
            ));
        }
        if self.stability_history < 3 {
            return Err(PitchError::InvalidConfig(
                "stability_history must be at least 3".into(),
            ));
        }
        if self.stability_lock_streak == 0 {
            return Err(PitchError::InvalidConfig(
                "stability_lock_streak must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn default_emphasis_covers_the_under_detected_band() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.emphasis_hz, vec![349.23, 369.99]);
        assert!(cfg.min_level_high > cfg.min_level);
    }

    #[test]
    fn rejects_degenerate_values() {
        let mut cfg = PipelineConfig::default();
        cfg.window_size = 16;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.plausible_range_hz = (2000.0, 50.0);
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.stability_history = 1;
        assert!(cfg.validate().is_err());
    }
}
