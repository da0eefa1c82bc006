//! # Autocorrelation Estimator
//!
//! Secondary lag-domain estimator used to cross-validate YIN in ambiguous
//! bands. It correlates the window against itself over the lag range implied
//! by the plausible frequency bounds, tapers the lags with a Hann-shaped
//! weight to soften edge artifacts, and optionally boosts lags around
//! configured emphasis frequencies. Never used alone as the final answer;
//! see the fusion stage.

use crate::yin::PitchCandidate;

/// Lags within this many samples of an emphasis lag receive the boost.
const EMPHASIS_LAG_RADIUS: usize = 10;
/// Correlation multiplier applied around emphasis lags.
const EMPHASIS_BOOST: f32 = 1.2;

/// Windowed, weighted autocorrelation pitch estimator.
pub struct AutocorrelationEstimator {
    sample_rate: u32,
    min_lag: usize,
    max_lag: usize,
    /// Lags corresponding to frequencies whose correlation gets boosted.
    emphasis_lags: Vec<usize>,
}

impl AutocorrelationEstimator {
    /// Creates an estimator scanning lags for `plausible_range_hz`.
    ///
    /// `emphasis_hz` lists frequencies (such as historically under-detected
    /// bands) whose lags receive extra weight; pass an empty slice for a
    /// neutral estimator.
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        plausible_range_hz: (f32, f32),
        emphasis_hz: &[f32],
    ) -> Self {
        let (min_freq, max_freq) = plausible_range_hz;
        let min_lag = ((sample_rate as f32 / max_freq).floor() as usize).max(1);
        let max_lag = ((sample_rate as f32 / min_freq).floor() as usize).min(window_size - 1);
        let emphasis_lags = emphasis_hz
            .iter()
            .filter(|&&f| f > 0.0)
            .map(|&f| (sample_rate as f32 / f).floor() as usize)
            .collect();
        AutocorrelationEstimator {
            sample_rate,
            min_lag,
            max_lag,
            emphasis_lags,
        }
    }

    #[cfg(test)]
    pub(crate) fn has_emphasis(&self) -> bool {
        !self.emphasis_lags.is_empty()
    }

    /// Picks the lag of maximum weighted correlation over the window.
    ///
    /// The Hann taper deliberately biases toward longer lags, which favors
    /// lower candidate frequencies; the fusion stage is responsible for
    /// arbitrating when this disagrees with YIN.
    pub fn estimate(&self, window: &[f32]) -> Option<PitchCandidate> {
        if self.min_lag >= self.max_lag || window.len() <= self.max_lag {
            return None;
        }

        let energy: f32 =
            window.iter().map(|&s| s * s).sum::<f32>() / window.len() as f32;
        if energy <= 0.0 {
            return None;
        }

        let mut best_lag = 0;
        let mut best_weighted = f32::NEG_INFINITY;
        let mut best_raw = 0.0;

        for lag in self.min_lag..=self.max_lag {
            let mut correlation = 0.0;
            for i in 0..window.len() - lag {
                correlation += window[i] * window[i + lag];
            }
            correlation /= (window.len() - lag) as f32;
            let raw = correlation;

            // Hann-shaped lag taper to reduce edge artifacts.
            let taper = 0.5
                * (1.0
                    - (2.0 * std::f32::consts::PI * lag as f32 / self.max_lag as f32).cos());
            correlation *= taper;

            if self
                .emphasis_lags
                .iter()
                .any(|&e| lag.abs_diff(e) < EMPHASIS_LAG_RADIUS)
            {
                correlation *= EMPHASIS_BOOST;
            }

            if correlation > best_weighted {
                best_weighted = correlation;
                best_raw = raw;
                best_lag = lag;
            }
        }

        if best_lag == 0 || best_raw <= 0.0 {
            return None;
        }

        let frequency = self.sample_rate as f32 / best_lag as f32;
        // A perfectly periodic signal correlates at full energy; noise decays
        // toward zero. The ratio is a usable confidence once clamped.
        let confidence = (best_raw / energy).clamp(0.0, 1.0);

        Some(PitchCandidate { frequency, confidence })
    }
}
