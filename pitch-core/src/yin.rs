//! # YIN Pitch Estimator
//!
//! Time-domain fundamental-frequency estimation based on the YIN algorithm:
//! difference function, cumulative-mean normalization, absolute-threshold
//! minimum search and parabolic refinement. Optimized for monophonic
//! instrument input.
//!
//! ## Features
//! - Local-minimum refinement after the threshold crossing to avoid locking
//!   onto a sub-harmonic shoulder
//! - Parabolic interpolation for sub-sample accuracy, clamped to +-1 sample
//! - Amplitude gating to reject silence before any O(N^2) work
//! - Plausible-range and confidence-cliff rejection

use crate::config::YinProfile;

/// One estimator's answer for a single analysis window.
///
/// Produced fresh per window and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchCandidate {
    /// Estimated fundamental frequency in Hz, always positive.
    pub frequency: f32,
    /// Estimate quality in `[0, 1]`.
    pub confidence: f32,
}

/// Root-mean-square level of a window. Used as the cheap silence gate.
pub fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f32 = window.iter().map(|&s| s * s).sum();
    (sum / window.len() as f32).sqrt()
}

/// YIN fundamental-frequency estimator.
///
/// Holds the normalized-difference scratch buffer so repeated calls do not
/// allocate. One instance serves one pipeline; the window size is expected
/// to stay constant for the instance's lifetime.
pub struct YinEstimator {
    sample_rate: u32,
    min_freq: f32,
    max_freq: f32,
    min_level: f32,
    /// Scratch for the cumulative-mean normalized difference function.
    diff: Vec<f32>,
}

impl YinEstimator {
    /// Creates an estimator for windows of `window_size` samples.
    ///
    /// `plausible_range_hz` bounds the frequencies the estimator will report;
    /// `min_level` is the RMS below which a window is treated as silent.
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        plausible_range_hz: (f32, f32),
        min_level: f32,
    ) -> Self {
        YinEstimator {
            sample_rate,
            min_freq: plausible_range_hz.0,
            max_freq: plausible_range_hz.1,
            min_level,
            diff: vec![0.0; window_size / 2],
        }
    }

    /// Runs one YIN pass over `window`.
    ///
    /// Returns `None` for silence, noise, or any rejected result. Rejection
    /// is a valid outcome, not an error; the pipeline treats it like a
    /// silent window.
    pub fn estimate(&mut self, window: &[f32], profile: &YinProfile) -> Option<PitchCandidate> {
        let half = window.len() / 2;
        if half < 2 {
            return None;
        }
        if self.diff.len() != half {
            // Window size changed via reconfiguration; resize the scratch
            // outside the steady state.
            self.diff.resize(half, 0.0);
        }

        // Cheap gate first: skip the O(N^2) work for silent windows.
        if rms(window) < self.min_level {
            return None;
        }

        // Step 1: difference function d(tau). d(0) is overwritten by the
        // normalization step, so start at 1.
        for tau in 1..half {
            let mut sum = 0.0;
            for i in 0..half {
                let delta = window[i] - window[i + tau];
                sum += delta * delta;
            }
            self.diff[tau] = sum;
        }

        // Step 2: cumulative-mean normalization. A zero running sum (e.g. a
        // constant signal) normalizes to 1, which no threshold accepts.
        let mut running_sum = 0.0;
        self.diff[0] = 1.0;
        for tau in 1..half {
            running_sum += self.diff[tau];
            if running_sum != 0.0 {
                self.diff[tau] *= tau as f32 / running_sum;
            } else {
                self.diff[tau] = 1.0;
            }
        }

        // Step 3: absolute-threshold search with local-minimum refinement.
        // After the first crossing, keep walking while the function still
        // decreases so we land in the dip, not on its shoulder.
        let mut tau_estimate = None;
        let mut tau = 1;
        while tau < half {
            if self.diff[tau] < profile.threshold {
                while tau + 1 < half && self.diff[tau + 1] < self.diff[tau] {
                    tau += 1;
                }
                tau_estimate = Some(tau);
                break;
            }
            tau += 1;
        }
        let tau_estimate = tau_estimate?;

        // Step 4: parabolic interpolation around the chosen lag, correction
        // clamped to +-1 sample to avoid runaway extrapolation.
        let refined_tau = if tau_estimate > 0 && tau_estimate + 1 < half {
            let s0 = self.diff[tau_estimate - 1];
            let s1 = self.diff[tau_estimate];
            let s2 = self.diff[tau_estimate + 1];
            let denom = s0 + s2 - 2.0 * s1;
            if denom != 0.0 {
                let delta = ((s0 - s2) / (2.0 * denom)).clamp(-1.0, 1.0);
                tau_estimate as f32 + delta
            } else {
                tau_estimate as f32
            }
        } else {
            tau_estimate as f32
        };
        if refined_tau <= 0.0 {
            return None;
        }

        let frequency = self.sample_rate as f32 / refined_tau;
        let confidence = (1.0 - self.diff[tau_estimate]).clamp(0.0, 1.0);

        if !frequency.is_finite() || frequency < self.min_freq || frequency > self.max_freq {
            return None;
        }
        if confidence < profile.probability_cliff {
            return None;
        }

        Some(PitchCandidate { frequency, confidence })
    }
}
