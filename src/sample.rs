use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};

/// Anything quieter than this is flushed to exact zero.
const DENORMAL_FLOOR: f32 = 1.0e-15;

// ── Sample buffer ─────────────────────────────────────────────────────────────

/// A decoded (or synthesised) mono sound, ready to be played by the mixer.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    pub data:        Vec<f32>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<f32>, sample_rate: u32) -> Self {
        let mut buf = Self { data, sample_rate };
        buf.sanitize();
        buf
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.data.len() as f64 / self.sample_rate as f64)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    /// Replace NaN/inf with silence, flush denormals, and keep everything in [-1, 1].
    pub fn sanitize(&mut self) {
        for s in &mut self.data {
            if !s.is_finite() || s.abs() < DENORMAL_FLOOR {
                *s = 0.0;
            } else {
                *s = s.clamp(-1.0, 1.0);
            }
        }
    }

    /// Decode a WAV file, mix it down to mono and resample to `target_rate`.
    pub fn load_wav(path: &Path, target_rate: u32) -> anyhow::Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let channels = spec.channels.max(1) as usize;
        let mono: Vec<f32> = if channels == 1 {
            samples
        } else {
            samples
                .chunks_exact(channels)
                .map(|c| c.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        if mono.is_empty() {
            bail!("{} contains no audio", path.display());
        }

        let data = resample_linear(&mono, spec.sample_rate, target_rate);
        Ok(Self::new(data, target_rate))
    }
}

fn resample_linear(frames: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        return frames.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (frames.len() as f64 * ratio).ceil() as usize;
    let last = frames.len().saturating_sub(1);
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        if idx >= last {
            out.push(frames.last().copied().unwrap_or(0.0));
        } else {
            let frac = (src_pos - idx as f64) as f32;
            out.push(frames[idx] * (1.0 - frac) + frames[idx + 1] * frac);
        }
    }
    out
}

// ── Fetching ──────────────────────────────────────────────────────────────────

/// Resolves a pad's `sourceRef` URL to decoded audio.
pub trait SampleFetcher: Send {
    fn fetch(&self, url: &str, target_rate: u32) -> anyhow::Result<SampleBuffer>;
}

/// Reads WAV files from the local filesystem.
///
/// Accepts plain paths and `file://` URLs; relative paths are resolved
/// against `root` (the kit file's directory).  Remote schemes are refused
/// so the provider falls back to synthesis.
#[derive(Clone, Debug, Default)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, url: &str) -> anyhow::Result<PathBuf> {
        if url.starts_with("http://") || url.starts_with("https://") {
            bail!("remote samples are not supported: {url}");
        }
        let raw = url.strip_prefix("file://").unwrap_or(url);
        if raw.is_empty() {
            bail!("empty sample path");
        }
        let path = Path::new(raw);
        Ok(if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) })
    }
}

impl SampleFetcher for FileFetcher {
    fn fetch(&self, url: &str, target_rate: u32) -> anyhow::Result<SampleBuffer> {
        let path = self.resolve(url)?;
        SampleBuffer::load_wav(&path, target_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            w.write_sample(s).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn sanitize_removes_non_finite_and_denormals() {
        let buf = SampleBuffer::new(vec![f32::NAN, 1.0e-30, 2.0, -0.5, f32::INFINITY], 44100);
        assert_eq!(buf.data, vec![0.0, 0.0, 1.0, -0.5, 0.0]);
    }

    #[test]
    fn stereo_wav_is_mixed_down_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("st.wav");
        write_wav(&path, 44100, 2, &[16384, 0, 16384, 0, -16384, -16384]);

        let buf = SampleBuffer::load_wav(&path, 44100).unwrap();
        assert_eq!(buf.len(), 3);
        assert_abs_diff_eq!(buf.data[0], 0.25, epsilon = 1e-4);
        assert_abs_diff_eq!(buf.data[2], -0.5, epsilon = 1e-4);
    }

    #[test]
    fn wav_is_resampled_to_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lo.wav");
        write_wav(&path, 22050, 1, &[0; 2205]);

        let buf = SampleBuffer::load_wav(&path, 44100).unwrap();
        assert_eq!(buf.sample_rate, 44100);
        assert_eq!(buf.len(), 4410);
    }

    #[test]
    fn file_fetcher_resolves_relative_and_file_urls() {
        let fetcher = FileFetcher::new("/kits/808");
        assert_eq!(fetcher.resolve("kick.wav").unwrap(), PathBuf::from("/kits/808/kick.wav"));
        assert_eq!(fetcher.resolve("file:///tmp/a.wav").unwrap(), PathBuf::from("/tmp/a.wav"));
        assert!(fetcher.resolve("https://example.com/kick.wav").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FileFetcher::new(dir.path());
        assert!(fetcher.fetch("nope.wav", 44100).is_err());
    }
}
