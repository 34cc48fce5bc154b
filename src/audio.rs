use std::sync::Arc;

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::mixer::{voice_channel, Mixer, VoiceSender};
use crate::sample::SampleBuffer;

/// Rate used for synthesis when there is no device to ask.
pub const FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// Where the sample provider sends playable hits.
///
/// Implementations must be cheap and non-blocking; `play` is called from the
/// sequencer's tick path.
pub trait AudioBackend: Send {
    fn sample_rate(&self) -> u32;
    fn play(&mut self, buffer: Arc<SampleBuffer>, gain: f32) -> anyhow::Result<()>;

    /// Cut every voice that is still sounding.
    fn silence(&mut self) {}
}

/// Backend that accepts and discards every hit.  Used when no audio device is
/// available, and in tests.
#[derive(Clone, Copy, Debug)]
pub struct NullBackend {
    sample_rate: u32,
}

impl NullBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new(FALLBACK_SAMPLE_RATE)
    }
}

impl AudioBackend for NullBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, _buffer: Arc<SampleBuffer>, _gain: f32) -> anyhow::Result<()> {
        Ok(())
    }
}

// ── Device output ─────────────────────────────────────────────────────────────

/// An open output stream on the default device.
///
/// The stream keeps running the mixer for as long as this value lives;
/// dropping it closes the device.  Not `Send` on every platform, so it stays
/// on the thread that opened it while the returned `VoiceSender` travels.
pub struct AudioOutput {
    _stream:     cpal::Stream,
    device_name: String,
}

impl AudioOutput {
    /// Open the default output device and start rendering.
    pub fn open() -> anyhow::Result<(Self, VoiceSender)> {
        let host = cpal::default_host();
        info!("Audio host: {:?}", host.id());

        let device = host.default_output_device().context("no default output device")?;
        let device_name = device.name().unwrap_or_else(|_| "unknown device".to_string());
        let config = device.default_output_config().context("no default output config")?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            anyhow::bail!("unsupported sample format {:?} (only f32 is supported)", config.sample_format());
        }

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let (sender, mixer) = voice_channel(sample_rate);

        let stream = build_output_stream(&device, &config.into(), mixer, channels)?;
        stream.play().context("failed to start output stream")?;
        info!("Audio stream started on {} at {} Hz, {} channels", device_name, sample_rate, channels);

        Ok((Self { _stream: stream, device_name }, sender))
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        info!("Closing audio output on {}", self.device_name);
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            mixer.render_interleaved(data, channels);
        },
        |err| error!("audio output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}
