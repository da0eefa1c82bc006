//! # Estimator Fusion
//!
//! Combines the YIN and autocorrelation candidates for one window into a
//! single candidate. Agreement is rewarded with a confidence-weighted
//! average; disagreement (typically an octave apart) is resolved by picking
//! the more plausible candidate outright, never by averaging, because the
//! average of two octaves is a musically meaningless frequency.

use crate::yin::PitchCandidate;

/// Ratio band within which the two estimators count as agreeing.
const AGREEMENT_LOW: f32 = 0.9;
const AGREEMENT_HIGH: f32 = 1.1;
/// Weight on the YIN frequency when averaging agreeing candidates.
const YIN_WEIGHT: f32 = 0.6;
/// Edge given to YIN when the candidates disagree: near-ties go to the
/// primary estimator, not the cross-check.
const YIN_PREFERENCE: f32 = 1.1;
/// Minimum confidence for an autocorrelation candidate to stand on its own
/// when YIN found nothing. The autocorrelation stage is a cross-check, not a
/// primary estimator.
const MIN_LONE_CONFIDENCE: f32 = 0.5;
/// Plausibility penalty for candidates at the edges of the musical range.
const BAND_EDGE_PENALTY: f32 = 0.8;
/// Band considered fully plausible without penalty.
const PLAUSIBLE_BAND_HZ: (f32, f32) = (100.0, 800.0);

/// Fuses per-window candidates from the two classical estimators.
pub struct EstimatorFusion {
    min_freq: f32,
    max_freq: f32,
}

impl EstimatorFusion {
    /// Creates a fusion stage bounded by the pipeline's plausible range.
    pub fn new(plausible_range_hz: (f32, f32)) -> Self {
        EstimatorFusion {
            min_freq: plausible_range_hz.0,
            max_freq: plausible_range_hz.1,
        }
    }

    /// Combines the two candidates. Either side may be absent, in which case
    /// the other is passed through unchanged.
    pub fn fuse(
        &self,
        yin: Option<PitchCandidate>,
        autocorr: Option<PitchCandidate>,
    ) -> Option<PitchCandidate> {
        let (yin, autocorr) = match (yin, autocorr) {
            (Some(y), Some(a)) => (y, a),
            (Some(y), None) => return Some(y),
            (None, Some(a)) => {
                return (a.confidence >= MIN_LONE_CONFIDENCE).then_some(a);
            }
            (None, None) => return None,
        };

        let ratio = yin.frequency / autocorr.frequency;
        if ratio > AGREEMENT_LOW && ratio < AGREEMENT_HIGH {
            // Consensus: weighted average, YIN weighted higher. Confidence is
            // the max of the two inputs scaled by how closely they agree, so
            // a match at the edge of the band scores below a perfect one.
            let frequency =
                yin.frequency * YIN_WEIGHT + autocorr.frequency * (1.0 - YIN_WEIGHT);
            let agreement = 1.0 - (ratio - 1.0).abs();
            let confidence =
                (yin.confidence.max(autocorr.confidence) * agreement).clamp(0.0, 1.0);
            return Some(PitchCandidate { frequency, confidence });
        }

        // Disagreement, usually by roughly 2x. Score each candidate and keep
        // the winner as-is. A perfectly periodic signal scores both sides
        // near 1.0, so near-ties resolve toward YIN.
        if self.plausibility(&yin) * YIN_PREFERENCE >= self.plausibility(&autocorr) {
            Some(yin)
        } else {
            Some(autocorr)
        }
    }

    /// Heuristic score combining raw confidence with frequency-band
    /// plausibility. Candidates outside the configured range score zero.
    fn plausibility(&self, candidate: &PitchCandidate) -> f32 {
        let freq = candidate.frequency;
        if freq < self.min_freq || freq > self.max_freq {
            return 0.0;
        }
        let mut score = candidate.confidence;
        if freq < PLAUSIBLE_BAND_HZ.0 || freq > PLAUSIBLE_BAND_HZ.1 {
            score *= BAND_EDGE_PENALTY;
        }
        score
    }
}
