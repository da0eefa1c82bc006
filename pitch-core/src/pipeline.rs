//! # Detection Pipeline
//!
//! Orchestrates one analysis pass per window: silence gate, the two
//! classical estimators, fusion, the optional neural estimator, stability
//! filtering and target matching. Owns every piece of estimator state; no
//! globals, no singletons. Nothing in the per-window path allocates after
//! construction, and nothing in it can fail hard: a window that cannot be
//! analyzed degrades to a no-pitch event and processing continues.

use log::{debug, info};

use crate::autocorr::AutocorrelationEstimator;
use crate::config::PipelineConfig;
use crate::error::PitchError;
use crate::fusion::EstimatorFusion;
use crate::neural::{AdapterEvent, NeuralEstimatorAdapter};
use crate::notes::{self, NoteMatcher, TargetPitch};
use crate::ring::SampleRingBuffer;
use crate::stability::StabilityFilter;
use crate::yin::{PitchCandidate, YinEstimator, rms};

/// Peak level contributes to the silence gate at this weight, so short
/// plucks with a low RMS still register.
const PEAK_WEIGHT: f32 = 0.6;

/// One detection outcome per analysis window.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionEvent {
    /// Signal level below the silence gate.
    Silence,
    /// Signal present but no stable pitch. A normal outcome, not a failure.
    NoPitch,
    /// A stable, confidence-qualified pitch.
    Pitch(PitchReport),
}

/// Payload of a [`DetectionEvent::Pitch`].
#[derive(Debug, Clone, PartialEq)]
pub struct PitchReport {
    /// Stable detected frequency in Hz.
    pub frequency: f32,
    /// Name of the nearest note, for display.
    pub note: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Signed cents offset from the target, folded into (-600, 600].
    /// `None` when no target is set.
    pub cents_offset: Option<f32>,
    /// The target this report was compared against, if any.
    pub target: Option<TargetPitch>,
    /// Whether the detection matched the target within tolerance. Always
    /// `false` without a target.
    pub is_match: bool,
    /// Sequence number of the window that produced this report.
    pub window_seq: u64,
}

/// The detection core. Feed it sample chunks (or whole windows) and consume
/// discrete detection events.
pub struct DetectionPipeline {
    config: PipelineConfig,
    ring: SampleRingBuffer,
    /// Scratch window, taken out of `self` during analysis to satisfy the
    /// borrow checker without copying.
    window: Vec<f32>,
    yin: YinEstimator,
    autocorr: AutocorrelationEstimator,
    fusion: EstimatorFusion,
    stability: StabilityFilter,
    matcher: NoteMatcher,
    neural: Option<NeuralEstimatorAdapter>,
    target: Option<TargetPitch>,
    window_seq: u64,
}

impl DetectionPipeline {
    /// Creates a pipeline. All buffers are allocated here; the per-window
    /// path performs no further allocation.
    pub fn new(config: PipelineConfig) -> Result<Self, PitchError> {
        config.validate()?;
        Ok(DetectionPipeline {
            ring: SampleRingBuffer::new(config.window_size * config.ring_capacity_windows),
            window: vec![0.0; config.window_size],
            yin: YinEstimator::new(
                config.sample_rate,
                config.window_size,
                config.plausible_range_hz,
                config.min_level,
            ),
            autocorr: AutocorrelationEstimator::new(
                config.sample_rate,
                config.window_size,
                config.plausible_range_hz,
                &config.emphasis_hz,
            ),
            fusion: EstimatorFusion::new(config.plausible_range_hz),
            stability: StabilityFilter::new(
                config.stability_history,
                config.stability_tolerance,
                config.stability_lock_streak,
            ),
            matcher: NoteMatcher::new(config.match_thresholds),
            neural: None,
            target: None,
            window_seq: 0,
            config,
        })
    }

    /// Pipeline with default configuration.
    pub fn with_defaults() -> Self {
        DetectionPipeline::new(PipelineConfig::default())
            .expect("default configuration is valid")
    }

    /// Replaces the configuration, rebuilding estimators and clearing all
    /// transient state. A cold-path operation.
    pub fn configure(&mut self, config: PipelineConfig) -> Result<(), PitchError> {
        let mut rebuilt = DetectionPipeline::new(config)?;
        rebuilt.target = self.target.take();
        rebuilt.neural = self.neural.take();
        rebuilt.window_seq = self.window_seq;
        *self = rebuilt;
        Ok(())
    }

    /// Current configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Sets or clears the target pitch. Malformed targets are rejected and
    /// the previous target stays in effect.
    pub fn set_target(&mut self, target: Option<TargetPitch>) -> Result<(), PitchError> {
        if let Some(target) = &target {
            self.matcher.validate_target(target)?;
            debug!("target set to {} ({} Hz)", target.note_label, target.frequency);
        }
        self.target = target;
        Ok(())
    }

    /// Attaches an already-activated neural adapter. Once the adapter
    /// reports ready its output supersedes classical fusion; until then, and
    /// again after any failure, the classical path carries the session.
    pub fn attach_neural(&mut self, adapter: NeuralEstimatorAdapter) {
        self.neural = Some(adapter);
    }

    /// One-shot lifecycle notices from the neural adapter, if one is
    /// attached. Poll between windows; never blocks.
    pub fn poll_adapter_event(&mut self) -> Option<AdapterEvent> {
        let event = self.neural.as_mut()?.poll_event();
        if let Some(event) = &event {
            match event {
                AdapterEvent::Ready => info!("neural estimator active"),
                AdapterEvent::FellBack(reason) => {
                    info!("using classical estimators for this session: {reason}")
                }
            }
        }
        event
    }

    /// Clears per-window state for a new exercise: history, hysteresis lock
    /// and any buffered samples. The window sequence number keeps counting,
    /// so readings produced before the reset remain distinguishable from
    /// anything reported afterwards.
    pub fn reset(&mut self) {
        self.stability.reset();
        self.ring.clear();
        debug!("pipeline reset at window {}", self.window_seq);
    }

    /// Absorbs a raw chunk from the audio callback. Never blocks; an
    /// oversized chunk is dropped and reported.
    pub fn push_samples(&mut self, chunk: &[f32]) -> Result<(), PitchError> {
        self.ring.write(chunk)
    }

    /// Processes one buffered window if enough samples have accumulated.
    pub fn poll_window(&mut self) -> Option<DetectionEvent> {
        let mut window = std::mem::take(&mut self.window);
        let event = if self.ring.try_read_window(&mut window) {
            Some(self.process(&window))
        } else {
            None
        };
        self.window = window;
        event
    }

    /// Analyzes one complete window and returns the detection outcome.
    ///
    /// `window` must be exactly the configured window size; anything else is
    /// reported as `NoPitch` rather than panicking mid-stream.
    pub fn process(&mut self, window: &[f32]) -> DetectionEvent {
        self.window_seq += 1;
        let seq = self.window_seq;

        if window.len() != self.config.window_size {
            debug!("window {} has unexpected length {}", seq, window.len());
            return DetectionEvent::NoPitch;
        }

        // Silence gate: combined RMS/peak measure, so a short attack with a
        // low average level still counts as signal.
        let peak = window.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        let window_rms = rms(window);
        let level = window_rms.max(peak * PEAK_WEIGHT);
        if level < self.config.min_level {
            self.stability.push(None, seq);
            return DetectionEvent::Silence;
        }

        let candidate = self.classify_window(window);

        // Plausible-range gate before anything enters the history.
        let (min_freq, max_freq) = self.config.plausible_range_hz;
        let candidate = candidate.filter(|c| c.frequency >= min_freq && c.frequency <= max_freq);

        // Frequency-dependent energy floor: a quiet window may legitimately
        // carry a low note, but a detection above the low-frequency cutoff
        // needs more signal behind it.
        let candidate = candidate.filter(|c| window_rms >= self.min_level_for(c.frequency));

        let Some(reading) = self.stability.push(candidate, seq) else {
            return DetectionEvent::NoPitch;
        };

        let (note, _) = notes::find_nearest_note(reading.frequency);
        let (cents_offset, is_match) = match &self.target {
            Some(target) => {
                let result = self.matcher.match_against(&reading, target);
                (Some(result.cents_offset), result.is_match)
            }
            None => (None, false),
        };

        DetectionEvent::Pitch(PitchReport {
            frequency: reading.frequency,
            note,
            confidence: reading.confidence,
            cents_offset,
            target: self.target.clone(),
            is_match,
            window_seq: seq,
        })
    }

    /// Runs the estimators for one window and produces the fused candidate.
    /// The classical path always runs; a ready neural estimator supersedes
    /// its result, with the classical result kept as the per-window safety
    /// net when the neural call declines.
    fn classify_window(&mut self, window: &[f32]) -> Option<PitchCandidate> {
        let profile = if self.target_is_low_frequency() {
            self.config.yin_low_freq
        } else {
            self.config.yin
        };

        let mut yin_candidate = self.yin.estimate(window, &profile);
        if self.config.halving_correction {
            yin_candidate = self.apply_halving(window, yin_candidate);
        }

        let autocorr_candidate = self.autocorr.estimate(window);
        let fused = self.fusion.fuse(yin_candidate, autocorr_candidate);

        if let Some(neural) = &mut self.neural
            && let Some(candidate) = neural.estimate(window, self.config.sample_rate)
        {
            return Some(candidate);
        }
        fused
    }

    /// Low-frequency octave correction: when the estimate sits below the
    /// low-frequency cutoff, a second, more sensitive YIN pass re-tests half
    /// the detected frequency. Applied only when the second pass lands close
    /// to that half; a tunable heuristic, not a guaranteed resolver.
    fn apply_halving(
        &mut self,
        window: &[f32],
        candidate: Option<PitchCandidate>,
    ) -> Option<PitchCandidate> {
        let candidate = candidate?;
        let cutoff = self.config.match_thresholds.low_freq_cutoff_hz;
        if candidate.frequency >= cutoff {
            return Some(candidate);
        }
        let half = candidate.frequency / 2.0;
        if half < self.config.plausible_range_hz.0 {
            return Some(candidate);
        }
        let second = self.yin.estimate(window, &self.config.yin_low_freq);
        if let Some(second) = second
            && (second.frequency - half).abs() <= self.config.halving_tolerance_hz
        {
            debug!(
                "halving correction: {} Hz -> {} Hz",
                candidate.frequency, second.frequency
            );
            return Some(PitchCandidate {
                frequency: second.frequency,
                confidence: candidate.confidence.min(second.confidence),
            });
        }
        Some(candidate)
    }

    /// RMS floor for a detection at the given frequency.
    fn min_level_for(&self, frequency: f32) -> f32 {
        if frequency < self.config.match_thresholds.low_freq_cutoff_hz {
            self.config.min_level
        } else {
            self.config.min_level_high
        }
    }

    fn target_is_low_frequency(&self) -> bool {
        self.target
            .as_ref()
            .is_some_and(|t| t.frequency < self.config.match_thresholds.low_freq_cutoff_hz)
    }
}
