use std::f32::consts::PI;

use crate::pad::PadCategory;
use crate::sample::SampleBuffer;

/// Fade applied to the first few milliseconds so no buffer starts with a click.
const FADE_IN_S: f32 = 0.002;
/// Fade applied to the tail so every buffer ends exactly at zero.
const FADE_OUT_S: f32 = 0.012;

impl PadCategory {
    /// Length (seconds) of the placeholder buffer for this category.
    fn duration(self) -> f32 {
        match self {
            Self::Kick       => 0.50,
            Self::Snare      => 0.32,
            Self::HiHat      => 0.30,
            Self::OpenHat    => 0.45,
            Self::Clap       => 0.34,
            Self::Tom        => 0.48,
            Self::Crash      => 0.50,
            Self::Percussion => 0.30,
            Self::Effect     => 0.40,
        }
    }

    /// Fixed noise seed so each category always renders the same waveform.
    fn seed(self) -> u32 {
        match self {
            Self::Kick       => 0xBEEF_CAFE,
            Self::Snare      => 0x5EED_0001,
            Self::HiHat      => 0x5EED_0002,
            Self::OpenHat    => 0x5EED_0003,
            Self::Clap       => 0x5EED_0004,
            Self::Tom        => 0x5EED_0005,
            Self::Crash      => 0x5EED_0006,
            Self::Percussion => 0x5EED_0007,
            Self::Effect     => 0x5EED_0008,
        }
    }
}

// ── Noise ─────────────────────────────────────────────────────────────────────

/// Fast XOR-shift PRNG.  Returns values uniformly in [-1, 1].
#[inline(always)]
fn xorshift(state: &mut u32) -> f32 {
    *state ^= *state << 13;
    *state ^= *state >> 17;
    *state ^= *state << 5;
    (*state as i32 as f32) * (1.0 / i32::MAX as f32)
}

// ── Generator ─────────────────────────────────────────────────────────────────

/// Crash cymbal partial ratios (inharmonic, bell-like).
const CRASH_PARTIALS: [f32; 6] = [1.0, 1.483, 1.932, 2.546, 2.630, 3.897];

/// Renders one placeholder hit sample by sample.
struct DrumVoice {
    category: PadCategory,
    sample_rate: f32,
    /// Phase accumulators (0..1 normalised); the crash uses all of them.
    phases: [f32; 6],
    noise: u32,
    /// Last noise value, for the hi-hat's first-difference high-pass.
    prev_noise: f32,
}

impl DrumVoice {
    fn new(category: PadCategory, sample_rate: f32) -> Self {
        Self {
            category,
            sample_rate,
            phases: [0.0; 6],
            noise: category.seed() | 1, // xorshift must never be 0
            prev_noise: 0.0,
        }
    }

    fn next_sample(&mut self, t: f32) -> f32 {
        match self.category {
            PadCategory::Kick       => self.kick(t),
            PadCategory::Snare      => self.snare(t),
            PadCategory::HiHat      => self.hat(t, 60.0),
            PadCategory::OpenHat    => self.hat(t, 9.0),
            PadCategory::Clap       => self.clap(t),
            PadCategory::Tom        => self.tom(t, 195.0, 90.0, 0.12),
            PadCategory::Crash      => self.crash(t),
            PadCategory::Percussion => self.percussion(t),
            PadCategory::Effect     => self.sweep(t),
        }
    }

    // ── Synthesis helpers ─────────────────────────────────────────────────

    #[inline]
    fn noise(&mut self) -> f32 {
        xorshift(&mut self.noise)
    }

    /// Advance phase accumulator `slot` and return a sine value.
    #[inline]
    fn sine(&mut self, slot: usize, freq: f32) -> f32 {
        let phase = &mut self.phases[slot];
        *phase += freq / self.sample_rate;
        if *phase >= 1.0 {
            *phase -= 1.0;
        }
        (*phase * 2.0 * PI).sin()
    }

    // ── Individual recipes ────────────────────────────────────────────────

    fn kick(&mut self, t: f32) -> f32 {
        // Exponential pitch sweep 150 → 50 Hz, fast transient click
        let freq  = 50.0 + 100.0 * (-t * 32.0_f32).exp();
        let tone  = self.sine(0, freq);
        let amp   = (-t * 11.0_f32).exp();
        let click = if t < 0.004 { self.noise() * 0.38 } else { 0.0 };
        (tone * 0.88 + click) * amp
    }

    fn snare(&mut self, t: f32) -> f32 {
        let noise = self.noise();
        let tone  = self.sine(0, 195.0);
        let amp   = (-t * 18.0_f32).exp();
        (noise * 0.72 + tone * 0.28) * amp
    }

    fn hat(&mut self, t: f32, decay: f32) -> f32 {
        // First difference of white noise tilts the spectrum towards the top end
        let n = self.noise();
        let hp = (n - self.prev_noise) * 0.5;
        self.prev_noise = n;
        hp * (-t * decay).exp()
    }

    fn clap(&mut self, t: f32) -> f32 {
        let noise = self.noise();
        let t_ms  = t * 1000.0;
        // Three staggered transient bursts that mimic a physical hand clap
        let burst = if      t_ms <  4.0 { 1.00 }
                    else if t_ms <  9.0 { 0.00 }
                    else if t_ms < 13.0 { 0.82 }
                    else if t_ms < 17.0 { 0.00 }
                    else if t_ms < 21.0 { 0.62 }
                    else                { 0.00 };
        let body = if t > 0.024 { (-(t - 0.024) * 22.0_f32).exp() * 0.42 } else { 0.0 };
        noise * (burst + body)
    }

    fn tom(&mut self, t: f32, start_hz: f32, end_hz: f32, decay_s: f32) -> f32 {
        let freq  = end_hz + (start_hz - end_hz) * (-t * 22.0_f32).exp();
        let tone  = self.sine(0, freq);
        let noise = self.noise();
        let amp   = (-t / decay_s).exp();
        (tone * 0.80 + noise * 0.20) * amp
    }

    fn crash(&mut self, t: f32) -> f32 {
        let mut partials = 0.0;
        for (slot, ratio) in CRASH_PARTIALS.iter().enumerate() {
            partials += self.sine(slot, 420.0 * ratio);
        }
        let noise = self.noise();
        let amp = (-t * 5.0_f32).exp();
        (partials / CRASH_PARTIALS.len() as f32 * 0.55 + noise * 0.45) * amp
    }

    fn percussion(&mut self, t: f32) -> f32 {
        // Woodblock-ish: two close partials with a very fast decay
        let a = self.sine(0, 820.0);
        let b = self.sine(1, 1230.0);
        (a * 0.7 + b * 0.3) * (-t * 28.0_f32).exp()
    }

    fn sweep(&mut self, t: f32) -> f32 {
        // Downward exponential sweep 1.6 kHz → 120 Hz
        let freq = 120.0 + 1480.0 * (-t * 9.0_f32).exp();
        let tone = self.sine(0, freq);
        tone * (-t * 6.0_f32).exp() * 0.9
    }
}

// ── Public entry point ────────────────────────────────────────────────────────

/// Render the placeholder waveform for `category`.
///
/// Output is deterministic per category, finite, denormal-free and starts
/// and ends at exactly zero.
pub fn synthesize(category: PadCategory, sample_rate: u32) -> SampleBuffer {
    let sr = sample_rate.max(1) as f32;
    let len = (category.duration() * sr).ceil() as usize;
    let mut voice = DrumVoice::new(category, sr);

    let mut data: Vec<f32> = (0..len)
        .map(|i| voice.next_sample(i as f32 / sr).clamp(-1.0, 1.0))
        .collect();

    shape_edges(&mut data, sr);
    SampleBuffer::new(data, sample_rate)
}

/// Linear fade-in / fade-out so the buffer never clicks on start or end.
fn shape_edges(data: &mut [f32], sr: f32) {
    let len = data.len();
    if len == 0 {
        return;
    }
    let fade_in  = ((FADE_IN_S * sr) as usize).clamp(1, len);
    let fade_out = ((FADE_OUT_S * sr) as usize).clamp(1, len);

    for (i, s) in data.iter_mut().take(fade_in).enumerate() {
        *s *= i as f32 / fade_in as f32;
    }
    for (i, s) in data.iter_mut().rev().take(fade_out).enumerate() {
        *s *= i as f32 / fade_out as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_crossings(buf: &SampleBuffer) -> usize {
        buf.data.windows(2).filter(|w| (w[0] < 0.0) != (w[1] < 0.0)).count()
    }

    #[test]
    fn every_category_is_finite_audible_and_click_free() {
        for cat in PadCategory::ALL {
            let buf = synthesize(cat, 44100);
            let secs = buf.duration().as_secs_f32();
            assert!((0.29..=0.51).contains(&secs), "{:?} lasts {secs}s", cat);
            assert!(buf.data.iter().all(|s| s.is_finite()), "{:?} has non-finite samples", cat);
            assert!(buf.data.iter().all(|s| *s == 0.0 || s.abs() >= 1.0e-15), "{:?} has denormals", cat);
            assert_eq!(buf.data[0], 0.0, "{:?} must start at zero", cat);
            assert_eq!(*buf.data.last().unwrap(), 0.0, "{:?} must end at zero", cat);
            assert!(buf.peak() > 0.05, "{:?} is nearly silent (peak {})", cat, buf.peak());
        }
    }

    #[test]
    fn synthesis_is_deterministic() {
        assert_eq!(synthesize(PadCategory::Snare, 48000), synthesize(PadCategory::Snare, 48000));
    }

    #[test]
    fn categories_sound_different() {
        let kick = synthesize(PadCategory::Kick, 44100);
        let hat  = synthesize(PadCategory::HiHat, 44100);
        // A hi-hat is mostly high-frequency noise, a kick a low sine
        assert!(zero_crossings(&hat) > zero_crossings(&kick) * 10);

        let rendered: Vec<SampleBuffer> =
            PadCategory::ALL.iter().map(|&c| synthesize(c, 22050)).collect();
        for (i, a) in rendered.iter().enumerate() {
            for b in rendered.iter().skip(i + 1) {
                assert_ne!(a.data, b.data);
            }
        }
    }
}
