//! Offline bounce: run the coordinator against a virtual clock and mix the
//! result into a buffer instead of a sound card.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{bail, Context};
use tracing::{debug, info};

use crate::coordinator::{lock, Coordinator, Poll};
use crate::kit::Kit;
use crate::mixer::{voice_channel, Mixer};
use crate::provider::SampleProvider;
use crate::sample::SampleBuffer;
use crate::sequencer::StepSequencer;

#[derive(Clone, Debug, PartialEq)]
pub struct RenderOptions {
    /// Whole passes through the pattern.
    pub loops:       u32,
    pub sample_rate: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { loops: 1, sample_rate: 44_100 }
    }
}

#[derive(Debug)]
pub struct Bounce {
    pub buffer: SampleBuffer,
    pub ticks:  u64,
    /// Pad hits issued over the whole render.
    pub hits:   usize,
}

/// Render `loops` passes of `sequencer`'s pattern through `kit`'s sounds.
///
/// Playback starts on step 0 and the buffer ends one full loop-length after
/// the last pass began, plus the longest sample so the final hits decay.
pub fn bounce(kit: &Kit, mut sequencer: StepSequencer, opts: &RenderOptions) -> anyhow::Result<Bounce> {
    if opts.loops == 0 {
        bail!("nothing to render: loop count is zero");
    }
    if opts.sample_rate == 0 {
        bail!("sample rate must be positive");
    }

    let (voices, mut mixer) = voice_channel(opts.sample_rate);
    let mut provider = SampleProvider::new(Box::new(voices)).with_fetcher(Box::new(kit.fetcher()));
    let pads = kit.pads();
    provider.load_kit(&pads);
    provider.set_master_gain(kit.session.master_gain);
    let tail = pads
        .iter()
        .filter_map(|p| provider.buffer(&p.id))
        .map(|b| b.len())
        .max()
        .unwrap_or(0);

    // rewind; the first tick plays step 0
    let length = sequencer.length();
    sequencer.stop();
    sequencer.start();
    let sequencer = Arc::new(Mutex::new(sequencer));
    let mut coordinator = Coordinator::new(Arc::clone(&sequencer), provider);

    let Some(origin) = coordinator.poll(Instant::now()).deadline() else {
        bail!("transport did not start");
    };
    let rate = opts.sample_rate as f64;
    let frame_at = |t: Instant| (t.saturating_duration_since(origin).as_secs_f64() * rate).round() as usize;

    let total = opts.loops as u64 * length as u64;
    let mut out = Vec::new();
    let mut next = origin;
    let mut hits = 0;
    while coordinator.ticks() < total {
        render_until(&mut mixer, &mut out, frame_at(next));
        match coordinator.poll(next) {
            Poll::Fired { hits: n, next_deadline, .. } => {
                hits += n;
                next = next_deadline;
            }
            Poll::Waiting(at) => next = at,
            Poll::Stopped => break,
        }
    }
    lock(&sequencer).stop();
    render_until(&mut mixer, &mut out, frame_at(next) + tail);

    let ticks = coordinator.ticks();
    debug!("bounced {ticks} ticks, {hits} hits, {} frames", out.len());
    Ok(Bounce { buffer: SampleBuffer::new(out, opts.sample_rate), ticks, hits })
}

fn render_until(mixer: &mut Mixer, out: &mut Vec<f32>, frame: usize) {
    let start = out.len();
    if frame > start {
        out.resize(frame, 0.0);
        mixer.render(&mut out[start..]);
    }
}

/// Write a mono 16-bit PCM WAV file.
pub fn write_wav(path: &Path, buffer: &SampleBuffer) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels:        1,
        sample_rate:     buffer.sample_rate,
        bits_per_sample: 16,
        sample_format:   hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for &s in &buffer.data {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize().with_context(|| format!("finishing {}", path.display()))?;
    info!("wrote {} ({:.2}s)", path.display(), buffer.duration().as_secs_f32());
    Ok(())
}
