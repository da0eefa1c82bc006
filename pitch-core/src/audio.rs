//! # Audio Capture Module
//!
//! Real-time audio capture using CPAL. This is the collaborator that feeds
//! raw sample chunks to the detection pipeline; it does no analysis itself.
//! The callback forwards whatever chunk size the device delivers and never
//! blocks: if the consumer is behind, chunks are dropped on the floor.

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use log::{info, warn};

/// Preferred capture sample rate in Hz.
pub const PREFERRED_SAMPLE_RATE: u32 = 44_100;

/// Starts audio capture from the default input device.
///
/// Sets up a mono f32 input stream and forwards each callback chunk to
/// `sender` with `try_send`, so a full channel drops the chunk instead of
/// stalling the audio callback.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - live stream handle and the actual rate
/// * `Err(e)` - no usable input device or configuration
pub fn start_capture(sender: Sender<Vec<f32>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, PREFERRED_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let sample_rate = cpal::SampleRate(PREFERRED_SAMPLE_RATE)
        .clamp(supported_config.min_sample_rate(), supported_config.max_sample_rate());
    let config = supported_config.with_sample_rate(sample_rate);

    let sample_rate_val = config.sample_rate().0;
    let config: cpal::StreamConfig = config.into();

    info!("selected sample rate: {} Hz", sample_rate_val);

    let err_fn = |err| warn!("audio stream error: {err}");

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            // Forward the chunk as-is; the pipeline's ring buffer does the
            // windowing. Dropped chunks are preferable to a blocked callback.
            let _ = sender.try_send(data.to_vec());
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate_val))
}

/// Finds the best supported configuration: mono, 32-bit float, sample rate
/// closest to the target.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i32 - target_rate as i32).abs();
            let max_diff = (c.max_sample_rate().0 as i32 - target_rate as i32).abs();
            min_diff.min(max_diff)
        })
}
