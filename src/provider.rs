use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::{AudioBackend, NullBackend};
use crate::coordinator::TriggerSink;
use crate::drums;
use crate::pad::{Pad, PadId, SourceRef};
use crate::sample::{FileFetcher, SampleBuffer, SampleFetcher};

/// Whether triggers can actually reach a speaker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioStatus {
    Ready,
    /// The device could not be opened; the session keeps running muted.
    Unavailable(String),
}

impl AudioStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, AudioStatus::Ready)
    }
}

impl fmt::Display for AudioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioStatus::Ready            => f.write_str("audio ready"),
            AudioStatus::Unavailable(why) => write!(f, "audio unavailable: {why}"),
        }
    }
}

/// What `SampleProvider::load` did for a pad.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Already loaded; nothing was done.
    Cached,
    /// The sample asset was fetched and decoded.
    Decoded,
    /// The pad asked for a synthesised placeholder.
    Synthesized,
    /// Fetching the asset failed and a placeholder was synthesised instead.
    FellBack(String),
}

/// Owns decoded audio per pad and plays it on request.
pub struct SampleProvider {
    backend:     Box<dyn AudioBackend>,
    fetcher:     Box<dyn SampleFetcher>,
    buffers:     HashMap<PadId, Arc<SampleBuffer>>,
    master_gain: f32,
    status:      AudioStatus,
}

impl SampleProvider {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            fetcher: Box::new(FileFetcher::default()),
            buffers: HashMap::new(),
            master_gain: 1.0,
            status: AudioStatus::Ready,
        }
    }

    /// A provider with no audio device behind it.  Reports the condition once
    /// and otherwise behaves normally (loads, accepts triggers).
    pub fn unavailable(reason: impl Into<String>, sample_rate: u32) -> Self {
        let reason = reason.into();
        warn!("audio unavailable, continuing muted: {reason}");
        Self {
            status: AudioStatus::Unavailable(reason),
            ..Self::new(Box::new(NullBackend::new(sample_rate)))
        }
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn SampleFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn status(&self) -> &AudioStatus {
        &self.status
    }

    pub fn sample_rate(&self) -> u32 {
        self.backend.sample_rate()
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn is_loaded(&self, pad: &PadId) -> bool {
        self.buffers.contains_key(pad)
    }

    pub fn buffer(&self, pad: &PadId) -> Option<&Arc<SampleBuffer>> {
        self.buffers.get(pad)
    }

    /// Make `pad` playable.  Idempotent and infallible: a missing or broken
    /// asset is replaced by the category's synthesised placeholder.
    pub fn load(&mut self, pad: &Pad) -> LoadOutcome {
        if self.buffers.contains_key(&pad.id) {
            return LoadOutcome::Cached;
        }
        let rate = self.sample_rate();

        let (buffer, outcome) = match &pad.source_ref {
            SourceRef::Synthesize => (drums::synthesize(pad.category, rate), LoadOutcome::Synthesized),
            SourceRef::Url(url) => match self.fetcher.fetch(url, rate) {
                Ok(buf) => {
                    debug!("pad {}: decoded {} ({} frames)", pad.id, url, buf.len());
                    (buf, LoadOutcome::Decoded)
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    warn!("pad {}: could not load {url} ({reason}); using synthesized {}",
                          pad.id, pad.category.name());
                    (drums::synthesize(pad.category, rate), LoadOutcome::FellBack(reason))
                }
            },
        };

        self.buffers.insert(pad.id.clone(), Arc::new(buffer));
        outcome
    }

    pub fn load_kit(&mut self, pads: &[Pad]) -> Vec<(PadId, LoadOutcome)> {
        let report: Vec<(PadId, LoadOutcome)> =
            pads.iter().map(|p| (p.id.clone(), self.load(p))).collect();
        let fallbacks = report.iter().filter(|(_, o)| matches!(o, LoadOutcome::FellBack(_))).count();
        info!("loaded {} pads ({} fell back to synthesis)", report.len(), fallbacks);
        report
    }

    /// Play `pad` now at linear `gain` (clamped to [0, 1]) times the master gain.
    ///
    /// An unloaded pad is a silent no-op.  Errors only surface from the
    /// backend (e.g. a full voice queue).
    pub fn trigger(&mut self, pad: &PadId, gain: f32) -> anyhow::Result<()> {
        let Some(buffer) = self.buffers.get(pad) else {
            debug!("trigger for unloaded pad {pad} ignored");
            return Ok(());
        };
        let gain = clamp_unit(gain) * self.master_gain;
        if gain == 0.0 {
            return Ok(());
        }
        self.backend.play(Arc::clone(buffer), gain)
    }

    /// Applies to the next trigger; already sounding voices keep their level.
    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = clamp_unit(gain);
    }

    /// Cut every hit still ringing out; loaded buffers stay loaded.
    pub fn silence(&mut self) {
        self.backend.silence();
    }
}

impl TriggerSink for SampleProvider {
    fn trigger(&mut self, pad: &PadId, gain: f32) -> anyhow::Result<()> {
        SampleProvider::trigger(self, pad, gain)
    }

    fn set_master_gain(&mut self, gain: f32) {
        SampleProvider::set_master_gain(self, gain);
    }

    fn silence(&mut self) {
        SampleProvider::silence(self);
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::voice_channel;
    use crate::pad::PadCategory;
    use std::sync::Mutex;

    /// Backend that remembers every hit it was asked to play.
    #[derive(Clone, Default)]
    struct Spy {
        hits: Arc<Mutex<Vec<(usize, f32)>>>,
    }

    impl AudioBackend for Spy {
        fn sample_rate(&self) -> u32 { 44100 }

        fn play(&mut self, buffer: Arc<SampleBuffer>, gain: f32) -> anyhow::Result<()> {
            self.hits.lock().unwrap().push((buffer.len(), gain));
            Ok(())
        }
    }

    #[test]
    fn unloaded_pad_trigger_is_a_silent_no_op() {
        let spy = Spy::default();
        let mut p = SampleProvider::new(Box::new(spy.clone()));
        p.load(&Pad::synthesized("kick", PadCategory::Kick));

        assert!(p.trigger(&PadId::from("ghost"), 1.0).is_ok());
        p.trigger(&PadId::from("kick"), 1.0).unwrap();
        assert_eq!(spy.hits.lock().unwrap().len(), 1, "only the loaded pad plays");
    }

    #[test]
    fn load_is_idempotent() {
        let mut p = SampleProvider::new(Box::new(NullBackend::default()));
        let pad = Pad::synthesized("sn", PadCategory::Snare);
        assert_eq!(p.load(&pad), LoadOutcome::Synthesized);
        let first = Arc::clone(p.buffer(&pad.id).unwrap());
        assert_eq!(p.load(&pad), LoadOutcome::Cached);
        assert!(Arc::ptr_eq(&first, p.buffer(&pad.id).unwrap()));
    }

    #[test]
    fn broken_url_falls_back_to_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = SampleProvider::new(Box::new(NullBackend::default()))
            .with_fetcher(Box::new(FileFetcher::new(dir.path())));
        let pad = Pad::from_url("sn", PadCategory::Snare, "missing/snare.wav");

        assert!(matches!(p.load(&pad), LoadOutcome::FellBack(_)));
        let expected = drums::synthesize(PadCategory::Snare, 44100);
        assert_eq!(**p.buffer(&pad.id).unwrap(), expected);
    }

    #[test]
    fn gains_are_clamped_and_scaled_by_master() {
        let spy = Spy::default();
        let mut p = SampleProvider::new(Box::new(spy.clone()));
        p.load(&Pad::synthesized("k", PadCategory::Kick));
        p.set_master_gain(0.5);

        p.trigger(&PadId::from("k"), 2.0).unwrap();
        p.trigger(&PadId::from("k"), 0.5).unwrap();
        p.trigger(&PadId::from("k"), -1.0).unwrap(); // silent, not sent

        let hits = spy.hits.lock().unwrap();
        let gains: Vec<f32> = hits.iter().map(|h| h.1).collect();
        assert_eq!(gains, vec![0.5, 0.25]);
    }

    #[test]
    fn master_gain_is_not_retroactive() {
        let (tx, mut mixer) = voice_channel(44100);
        let mut p = SampleProvider::new(Box::new(tx));
        p.load(&Pad::synthesized("k", PadCategory::Kick));

        p.trigger(&PadId::from("k"), 1.0).unwrap();
        let mut before = vec![0.0f32; 2048];
        mixer.render(&mut before);
        p.set_master_gain(0.0);
        let mut after = vec![0.0f32; 2048];
        mixer.render(&mut after);

        assert!(after.iter().any(|s| s.abs() > 0.01), "sounding voice keeps playing");
        p.trigger(&PadId::from("k"), 1.0).unwrap();
        mixer.render(&mut after);
        assert_eq!(mixer.active_voices(), 1, "muted trigger adds no voice");
    }

    #[test]
    fn silence_cuts_ringing_hits_but_keeps_pads_loaded() {
        let (tx, mut mixer) = voice_channel(44100);
        let mut p = SampleProvider::new(Box::new(tx));
        p.load(&Pad::synthesized("k", PadCategory::Kick));

        p.trigger(&PadId::from("k"), 1.0).unwrap();
        let mut out = vec![0.0f32; 512];
        mixer.render(&mut out);
        assert_eq!(mixer.active_voices(), 1, "kick is still ringing");

        TriggerSink::silence(&mut p);
        mixer.render(&mut out);
        assert_eq!(mixer.active_voices(), 0);
        assert!(out.iter().all(|s| *s == 0.0));

        assert!(p.is_loaded(&PadId::from("k")));
        p.trigger(&PadId::from("k"), 1.0).unwrap();
        mixer.render(&mut out);
        assert!(out.iter().any(|s| s.abs() > 0.01), "playable again after silence");
    }

    #[test]
    fn unavailable_provider_still_loads_and_triggers() {
        let mut p = SampleProvider::unavailable("no device", 22050);
        assert!(!p.status().is_ready());
        assert_eq!(p.sample_rate(), 22050);
        p.load(&Pad::synthesized("k", PadCategory::Kick));
        assert!(p.trigger(&PadId::from("k"), 1.0).is_ok());
    }
}
