use std::sync::Arc;

use anyhow::anyhow;
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::audio::AudioBackend;
use crate::sample::SampleBuffer;

/// Hard cap so the render callback never grows the voice pool.
pub const MAX_VOICES: usize = 32;
/// Depth of the command queue between the trigger side and the render side.
const QUEUE_DEPTH: usize = 1024;

pub enum VoiceCommand {
    Play { buffer: Arc<SampleBuffer>, gain: f32 },
    /// Cut every sounding voice.
    Silence,
}

/// One sounding hit.
struct Voice {
    buffer: Arc<SampleBuffer>,
    pos:    usize,
    gain:   f32,
}

impl Voice {
    #[inline]
    fn is_finished(&self) -> bool {
        self.pos >= self.buffer.data.len()
    }
}

// ── Render side ───────────────────────────────────────────────────────────────

/// Polyphonic voice pool.  Lives on whichever thread renders audio (the cpal
/// callback, or the offline bouncer) and only ever receives commands.
pub struct Mixer {
    rx:     Receiver<VoiceCommand>,
    voices: Vec<Voice>,
}

impl Mixer {
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.rx.try_recv() {
            match cmd {
                VoiceCommand::Play { buffer, gain } => {
                    if self.voices.len() >= MAX_VOICES {
                        // steal the oldest voice
                        self.voices.remove(0);
                    }
                    self.voices.push(Voice { buffer, pos: 0, gain });
                }
                VoiceCommand::Silence => self.voices.clear(),
            }
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        let mut mix = 0.0f32;
        for v in &mut self.voices {
            if let Some(s) = v.buffer.data.get(v.pos) {
                mix += s * v.gain;
            }
            v.pos += 1;
        }
        // Soft clip so stacked hits saturate instead of wrapping
        mix.tanh()
    }

    /// Fill a mono block.
    pub fn render(&mut self, out: &mut [f32]) {
        self.drain_commands();
        for frame in out.iter_mut() {
            *frame = self.next_sample();
        }
        self.voices.retain(|v| !v.is_finished());
    }

    /// Fill an interleaved block, duplicating the mono mix to every channel.
    pub fn render_interleaved(&mut self, out: &mut [f32], channels: usize) {
        self.drain_commands();
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let s = self.next_sample();
            frame.fill(s);
        }
        self.voices.retain(|v| !v.is_finished());
    }
}

// ── Trigger side ──────────────────────────────────────────────────────────────

/// Sending half of the voice queue; this is the `AudioBackend` the sample
/// provider talks to.
#[derive(Clone)]
pub struct VoiceSender {
    tx:          Sender<VoiceCommand>,
    sample_rate: u32,
}

impl AudioBackend for VoiceSender {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, buffer: Arc<SampleBuffer>, gain: f32) -> anyhow::Result<()> {
        match self.tx.try_send(VoiceCommand::Play { buffer, gain }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow!("voice queue full, hit dropped")),
            Err(TrySendError::Disconnected(_)) => Err(anyhow!("audio renderer has shut down")),
        }
    }

    fn silence(&mut self) {
        // best effort: dropped if the queue is full
        let _ = self.tx.try_send(VoiceCommand::Silence);
    }
}

/// Create a connected trigger/render pair.
pub fn voice_channel(sample_rate: u32) -> (VoiceSender, Mixer) {
    let (tx, rx) = crossbeam_channel::bounded(QUEUE_DEPTH);
    (
        VoiceSender { tx, sample_rate },
        Mixer { rx, voices: Vec::with_capacity(MAX_VOICES) },
    )
}
