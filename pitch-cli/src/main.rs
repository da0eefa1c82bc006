//! # pitch-cli - terminal front end for the detection core
//!
//! Captures live audio on a dedicated thread, runs the detection pipeline
//! and prints one line per state change. An optional note argument (for
//! example `A3` or `F♯2`) sets the target to practice against.
//!
//! ## Architecture
//! - **Main thread**: waits for Enter, then signals shutdown
//! - **Audio thread**: capture + analysis loop, crossbeam `select!` over the
//!   raw-audio and shutdown channels
//! - **Communication**: crossbeam channels; the cpal callback never blocks

use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, Sender};
use log::{info, warn};
use pitch_core::{
    DetectionEvent, DetectionPipeline, PipelineConfig, PitchError, TargetPitch, audio, notes,
};

fn main() -> Result<()> {
    env_logger::init();

    let target = parse_target()?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let handle = start_audio_processing(target, shutdown_rx);

    println!("Listening... press Enter to stop.");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    let _ = shutdown_tx.send(());
    if let Some(handle) = handle {
        let _ = handle.join();
    }
    Ok(())
}

/// Builds the optional target from the first CLI argument.
fn parse_target() -> Result<Option<TargetPitch>> {
    let Some(label) = std::env::args().nth(1) else {
        return Ok(None);
    };
    let frequency = notes::note_frequency(&label)
        .with_context(|| format!("unknown note '{label}' (try e.g. A3 or F♯2)"))?;
    println!("Target: {label} ({frequency:.2} Hz)");
    Ok(Some(TargetPitch {
        frequency,
        note_label: label,
        is_root: false,
    }))
}

/// Spawns the dedicated capture + analysis thread.
fn start_audio_processing(
    target: Option<TargetPitch>,
    shutdown_rx: Receiver<()>,
) -> Option<JoinHandle<()>> {
    let handle = thread::spawn(move || {
        let (raw_audio_tx, raw_audio_rx): (Sender<Vec<f32>>, Receiver<Vec<f32>>) =
            crossbeam_channel::unbounded();

        let (stream, sample_rate) = match audio::start_capture(raw_audio_tx) {
            Ok(tuple) => tuple,
            Err(e) => {
                eprintln!("Fatal error starting audio: {e}");
                return;
            }
        };

        let config = PipelineConfig {
            sample_rate,
            ..PipelineConfig::default()
        };
        let mut pipeline = match DetectionPipeline::new(config) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Fatal error building pipeline: {e}");
                return;
            }
        };
        if let Err(e) = pipeline.set_target(target) {
            eprintln!("Rejected target: {e}");
        }

        info!("audio thread entering processing loop");
        let mut last_printed: Option<DetectionEvent> = None;
        loop {
            crossbeam_channel::select! {
                recv(raw_audio_rx) -> msg => match msg {
                    Ok(chunk) => {
                        if let Err(PitchError::BufferOverflow { dropped }) =
                            pipeline.push_samples(&chunk)
                        {
                            warn!("analysis behind audio, dropped {dropped} samples");
                        }
                        while let Some(event) = pipeline.poll_window() {
                            print_event(&event, &mut last_printed);
                        }
                    }
                    Err(_) => {
                        info!("audio channel closed");
                        break;
                    }
                },
                recv(shutdown_rx) -> _ => {
                    info!("received shutdown signal");
                    break;
                }
            }
        }

        if let Err(e) = stream.pause() {
            warn!("error pausing stream: {e}");
        }
        drop(stream);
    });
    Some(handle)
}

/// Prints pitch lines continuously but collapses repeated silence and
/// no-pitch into a single line each.
fn print_event(event: &DetectionEvent, last: &mut Option<DetectionEvent>) {
    match event {
        DetectionEvent::Pitch(report) => {
            let mark = if report.target.is_some() {
                if report.is_match { " ✓" } else { " ✗" }
            } else {
                ""
            };
            let cents = report
                .cents_offset
                .map(|c| format!(" {c:+.1} cents"))
                .unwrap_or_default();
            println!(
                "{:>8.2} Hz  {:<4} conf {:.2}{}{}",
                report.frequency, report.note, report.confidence, cents, mark
            );
        }
        DetectionEvent::Silence => {
            if !matches!(last, Some(DetectionEvent::Silence)) {
                println!("(silence)");
            }
        }
        DetectionEvent::NoPitch => {
            if !matches!(last, Some(DetectionEvent::NoPitch)) {
                println!("(no pitch)");
            }
        }
    }
    *last = Some(event.clone());
}
