//! End-to-end pipeline behavior on synthetic signals: chunked ingestion,
//! silence and noise handling, target matching, and the neural adapter's
//! supersede/fallback paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use pitch_core::neural::{ModelSource, NeuralBackend, NeuralEstimator};
use pitch_core::{
    AdapterEvent, DetectionEvent, DetectionPipeline, ModelCache, NeuralEstimatorAdapter,
    PitchCandidate, TargetPitch,
};

const SAMPLE_RATE: u32 = 44_100;
const WINDOW: usize = 2048;

fn sine(freq: f32, len: usize, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()
        })
        .collect()
}

fn noise(seed: u64, len: usize, amplitude: f32) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = (state >> 33) as f32 / (1u64 << 31) as f32;
            (unit * 2.0 - 1.0) * amplitude
        })
        .collect()
}

fn target(frequency: f32, label: &str) -> TargetPitch {
    TargetPitch {
        frequency,
        note_label: label.to_string(),
        is_root: false,
    }
}

/// Feeds `windows` consecutive windows of the signal and returns the last
/// event.
fn run_windows(pipeline: &mut DetectionPipeline, signal: &[f32], windows: usize) -> DetectionEvent {
    let mut last = DetectionEvent::NoPitch;
    for i in 0..windows {
        let start = (i * WINDOW) % (signal.len() - WINDOW + 1);
        last = pipeline.process(&signal[start..start + WINDOW]);
    }
    last
}

#[test]
fn sine_is_reported_and_matches_its_target() {
    let mut pipeline = DetectionPipeline::with_defaults();
    pipeline.set_target(Some(target(220.0, "A3"))).unwrap();

    let signal = sine(220.0, WINDOW * 8, 0.5);
    let event = run_windows(&mut pipeline, &signal, 8);

    match event {
        DetectionEvent::Pitch(report) => {
            assert!(
                (report.frequency - 220.0).abs() / 220.0 < 0.01,
                "got {} Hz",
                report.frequency
            );
            assert_eq!(report.note, "A3");
            assert!(report.confidence >= 0.5, "confidence {}", report.confidence);
            assert!(report.is_match);
            assert!(report.cents_offset.unwrap().abs() < 15.0);
        }
        other => panic!("expected a pitch, got {other:?}"),
    }
}

#[test]
fn chunked_ingestion_matches_whole_window_processing() {
    let mut pipeline = DetectionPipeline::with_defaults();
    // Chunk size chosen to exercise ring wraparound repeatedly.
    let signal = sine(330.0, WINDOW * 8, 0.5);

    let mut events = Vec::new();
    for chunk in signal.chunks(480) {
        pipeline.push_samples(chunk).unwrap();
        while let Some(event) = pipeline.poll_window() {
            events.push(event);
        }
    }

    assert!(events.len() >= 7, "only {} windows analyzed", events.len());
    match events.last().unwrap() {
        DetectionEvent::Pitch(report) => {
            assert!(
                (report.frequency - 330.0).abs() / 330.0 < 0.01,
                "got {} Hz",
                report.frequency
            );
        }
        other => panic!("expected a pitch, got {other:?}"),
    }
}

#[test]
fn silent_windows_report_silence_never_pitch() {
    let mut pipeline = DetectionPipeline::with_defaults();
    let silence = vec![0.0; WINDOW];
    for _ in 0..10 {
        assert_eq!(pipeline.process(&silence), DetectionEvent::Silence);
    }
}

#[test]
fn low_amplitude_noise_does_not_produce_pitch() {
    let mut pipeline = DetectionPipeline::with_defaults();
    for seed in 0..20u64 {
        let window = noise(seed + 1, WINDOW, 0.01);
        match pipeline.process(&window) {
            DetectionEvent::Silence | DetectionEvent::NoPitch => {}
            DetectionEvent::Pitch(report) => {
                panic!("noise produced a pitch: {} Hz", report.frequency)
            }
        }
    }
}

#[test]
fn quiet_mid_range_detections_need_more_signal_than_low_notes() {
    // RMS of a 0.002-amplitude sine is ~0.0014: above the silence gate and
    // the low-note floor, below the floor for detections above the
    // low-frequency cutoff.
    let quiet_high = sine(220.0, WINDOW * 8, 0.002);
    let mut pipeline = DetectionPipeline::with_defaults();
    for i in 0..8 {
        let window = &quiet_high[i * WINDOW..(i + 1) * WINDOW];
        match pipeline.process(window) {
            DetectionEvent::Silence | DetectionEvent::NoPitch => {}
            DetectionEvent::Pitch(report) => {
                panic!("quiet 220 Hz window reported as {} Hz", report.frequency)
            }
        }
    }

    // The same level carries a low note.
    let quiet_low = sine(98.0, WINDOW * 8, 0.002);
    let mut pipeline = DetectionPipeline::with_defaults();
    match run_windows(&mut pipeline, &quiet_low, 8) {
        DetectionEvent::Pitch(report) => {
            assert!(
                (report.frequency - 98.0).abs() / 98.0 < 0.01,
                "got {} Hz",
                report.frequency
            );
        }
        other => panic!("expected a pitch, got {other:?}"),
    }

    // A louder mid-range note clears the higher floor.
    let loud_high = sine(220.0, WINDOW * 8, 0.01);
    let mut pipeline = DetectionPipeline::with_defaults();
    match run_windows(&mut pipeline, &loud_high, 8) {
        DetectionEvent::Pitch(report) => {
            assert!(
                (report.frequency - 220.0).abs() / 220.0 < 0.01,
                "got {} Hz",
                report.frequency
            );
        }
        other => panic!("expected a pitch, got {other:?}"),
    }
}

#[test]
fn low_string_note_matches_with_wide_tolerance() {
    let mut pipeline = DetectionPipeline::with_defaults();
    pipeline.set_target(Some(target(98.0, "G2"))).unwrap();

    let signal = sine(98.0, WINDOW * 8, 0.5);
    let event = run_windows(&mut pipeline, &signal, 8);

    match event {
        DetectionEvent::Pitch(report) => {
            assert!(
                (report.frequency - 98.0).abs() / 98.0 < 0.01,
                "got {} Hz",
                report.frequency
            );
            assert!(report.is_match);
        }
        other => panic!("expected a pitch, got {other:?}"),
    }
}

#[test]
fn reset_clears_history_between_exercises() {
    let mut pipeline = DetectionPipeline::with_defaults();

    let first = sine(220.0, WINDOW * 8, 0.5);
    run_windows(&mut pipeline, &first, 8);

    pipeline.reset();

    // The very first window of the new note must already report it, with no
    // influence from the previous lock.
    let second = sine(440.0, WINDOW * 2, 0.5);
    match pipeline.process(&second[..WINDOW]) {
        DetectionEvent::Pitch(report) => {
            assert!(
                (report.frequency - 440.0).abs() / 440.0 < 0.01,
                "stale state leaked: got {} Hz",
                report.frequency
            );
        }
        other => panic!("expected a pitch, got {other:?}"),
    }
}

// ---- neural adapter integration ----

struct StubSource {
    bytes: Option<Vec<u8>>,
    fetches: Arc<AtomicUsize>,
}

impl ModelSource for StubSource {
    fn content_key(&self) -> String {
        "integration-model".into()
    }

    fn fetch(&self) -> anyhow::Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.bytes
            .clone()
            .ok_or_else(|| anyhow::anyhow!("download failed"))
    }
}

struct FixedBackend {
    frequency: f32,
}

struct FixedEstimator {
    frequency: f32,
}

impl NeuralEstimator for FixedEstimator {
    fn estimate(&mut self, _window: &[f32], _sample_rate: u32) -> Option<PitchCandidate> {
        Some(PitchCandidate {
            frequency: self.frequency,
            confidence: 0.95,
        })
    }
}

impl NeuralBackend for FixedBackend {
    fn load(&self, _artifact: &[u8]) -> anyhow::Result<Box<dyn NeuralEstimator>> {
        Ok(Box::new(FixedEstimator {
            frequency: self.frequency,
        }))
    }
}

fn wait_for_settled(pipeline: &mut DetectionPipeline) -> AdapterEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(event) = pipeline.poll_adapter_event() {
            return event;
        }
        assert!(Instant::now() < deadline, "adapter never settled");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn ready_neural_estimator_supersedes_classical_fusion() {
    let mut adapter =
        NeuralEstimatorAdapter::new(SAMPLE_RATE, WINDOW).with_cache(ModelCache::disabled());
    adapter.activate(
        StubSource {
            bytes: Some(vec![0u8; 5000]),
            fetches: Arc::new(AtomicUsize::new(0)),
        },
        FixedBackend { frequency: 587.33 },
    );

    let mut pipeline = DetectionPipeline::with_defaults();
    pipeline.attach_neural(adapter);
    assert_eq!(wait_for_settled(&mut pipeline), AdapterEvent::Ready);

    // The input is a 220 Hz sine, but the neural estimator's answer wins.
    let signal = sine(220.0, WINDOW * 8, 0.5);
    match run_windows(&mut pipeline, &signal, 8) {
        DetectionEvent::Pitch(report) => {
            assert!(
                (report.frequency - 587.33).abs() < 0.01,
                "classical result leaked through: {} Hz",
                report.frequency
            );
            assert_eq!(report.note, "D5");
        }
        other => panic!("expected a pitch, got {other:?}"),
    }
}

#[test]
fn failed_neural_adapter_falls_back_to_classical_path() {
    let mut adapter =
        NeuralEstimatorAdapter::new(SAMPLE_RATE, WINDOW).with_cache(ModelCache::disabled());
    adapter.activate(
        StubSource {
            bytes: None,
            fetches: Arc::new(AtomicUsize::new(0)),
        },
        FixedBackend { frequency: 587.33 },
    );

    let mut pipeline = DetectionPipeline::with_defaults();
    pipeline.attach_neural(adapter);

    match wait_for_settled(&mut pipeline) {
        AdapterEvent::FellBack(reason) => assert!(reason.contains("download failed")),
        other => panic!("expected fallback, got {other:?}"),
    }
    // The notice is one-shot.
    assert_eq!(pipeline.poll_adapter_event(), None);

    // Classical detection still works.
    let signal = sine(220.0, WINDOW * 8, 0.5);
    match run_windows(&mut pipeline, &signal, 8) {
        DetectionEvent::Pitch(report) => {
            assert!(
                (report.frequency - 220.0).abs() / 220.0 < 0.01,
                "got {} Hz",
                report.frequency
            );
        }
        other => panic!("expected a pitch, got {other:?}"),
    }
}
