use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, trace, warn};

use crate::clock::{swing_delay, TickClock, TickTiming};
use crate::pad::PadId;
use crate::sequencer::{StepHits, StepSequencer};

/// Per-subscriber buffer of trigger notifications.
const EVENT_QUEUE: usize = 512;

/// Anything that can play a pad.  The sample provider is the real one;
/// tests use recorders.
pub trait TriggerSink {
    fn trigger(&mut self, pad: &PadId, gain: f32) -> anyhow::Result<()>;

    fn set_master_gain(&mut self, _gain: f32) {}

    /// Cut anything still ringing.
    fn silence(&mut self) {}
}

impl<S: TriggerSink + ?Sized> TriggerSink for Box<S> {
    fn trigger(&mut self, pad: &PadId, gain: f32) -> anyhow::Result<()> {
        (**self).trigger(pad, gain)
    }

    fn set_master_gain(&mut self, gain: f32) {
        (**self).set_master_gain(gain)
    }

    fn silence(&mut self) {
        (**self).silence()
    }
}

/// Emitted once per pad per fired step, for visualisers and meters.
#[derive(Clone, Debug, PartialEq)]
pub struct TriggerEvent {
    /// Running tick count since the coordinator was created (1-based).
    pub tick:     u64,
    pub step:     usize,
    pub pad:      PadId,
    pub velocity: f32,
}

/// Result of one `Coordinator::poll`.
#[derive(Clone, Debug, PartialEq)]
pub enum Poll {
    /// A step was fired; poll again at `next_deadline`.
    Fired { step: usize, hits: usize, next_deadline: Instant },
    /// Nothing due yet.
    Waiting(Instant),
    /// Transport is stopped; nothing will happen until it starts.
    Stopped,
}

impl Poll {
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Poll::Fired { next_deadline, .. } => Some(*next_deadline),
            Poll::Waiting(at) => Some(*at),
            Poll::Stopped => None,
        }
    }
}

/// Lock the sequencer, recovering from a poisoned mutex: a panic elsewhere
/// must not stop the transport.
pub fn lock(sequencer: &Mutex<StepSequencer>) -> MutexGuard<'_, StepSequencer> {
    sequencer.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Coordinator ───────────────────────────────────────────────────────────────

/// Drives the sequencer's clock and fans each step out to a `TriggerSink`.
///
/// Time is passed in, never read, so the same code runs under the session
/// thread (wall clock) and the offline renderer (virtual clock).
pub struct Coordinator<S> {
    sequencer:   Arc<Mutex<StepSequencer>>,
    sink:        S,
    clock:       Option<TickClock>,
    generation:  u64,
    ticks:       u64,
    subscribers: Vec<Sender<TriggerEvent>>,
}

impl<S: TriggerSink> Coordinator<S> {
    pub fn new(sequencer: Arc<Mutex<StepSequencer>>, sink: S) -> Self {
        Self {
            sequencer,
            sink,
            clock: None,
            generation: 0,
            ticks: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn sequencer(&self) -> &Arc<Mutex<StepSequencer>> {
        &self.sequencer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Steps fired so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Receive a `TriggerEvent` for every pad fired from now on.  Slow
    /// receivers lose events rather than delaying the clock.
    pub fn subscribe(&mut self) -> Receiver<TriggerEvent> {
        let (tx, rx) = crossbeam_channel::bounded(EVENT_QUEUE);
        self.subscribers.push(tx);
        rx
    }

    /// Fire the next step if it is due at `now`.
    ///
    /// At most one step fires per call.  If the caller was stalled for a whole
    /// step or more, that one step fires and the grid restarts from `now`
    /// (missed steps are dropped, never stacked).
    pub fn poll(&mut self, now: Instant) -> Poll {
        let mut seq = lock(&self.sequencer);
        if !seq.is_playing() {
            self.clock = None;
            return Poll::Stopped;
        }

        if seq.generation() != self.generation {
            // started (or stopped and restarted) since the last poll
            self.generation = seq.generation();
            self.clock = None;
        }
        let interval = seq.tick_interval();
        let clock = self.clock.get_or_insert_with(|| TickClock::start(now, interval));
        clock.set_interval(interval);

        let due = clock.deadline(swing_delay(seq.next_step(), seq.swing(), interval));
        if now < due {
            return Poll::Waiting(due);
        }

        if let TickTiming::Resynced { behind } = clock.tick(now) {
            debug!("coordinator was {:?} behind; resynced without replaying missed steps", behind);
        }
        let hits = seq.advance_step();
        self.ticks += 1;

        // Issued under the sequencer lock: a stop() that got the lock first
        // has already suppressed this tick above.
        for (pad, velocity) in &hits.hits {
            if let Err(e) = self.sink.trigger(pad, *velocity) {
                warn!("trigger for pad {pad} failed: {e:#}");
            }
        }
        trace!("step {} fired {} pads", hits.step, hits.hits.len());

        let next_deadline = clock.deadline(swing_delay(seq.next_step(), seq.swing(), interval));
        drop(seq);

        self.publish(&hits);
        Poll::Fired { step: hits.step, hits: hits.hits.len(), next_deadline }
    }

    /// Play a pad immediately, outside the pattern.
    pub fn audition(&mut self, pad: &PadId, velocity: f32) -> anyhow::Result<()> {
        self.sink.trigger(pad, velocity)
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.sink.set_master_gain(gain);
    }

    /// Cut every sounding voice.
    pub fn silence(&mut self) {
        self.sink.silence();
    }

    fn publish(&mut self, hits: &StepHits) {
        if self.subscribers.is_empty() || hits.hits.is_empty() {
            return;
        }
        let tick = self.ticks;
        self.subscribers.retain(|tx| {
            hits.hits.iter().all(|(pad, velocity)| {
                let event = TriggerEvent { tick, step: hits.step, pad: pad.clone(), velocity: *velocity };
                !matches!(tx.try_send(event), Err(TrySendError::Disconnected(_)))
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::pattern::DEFAULT_VELOCITY;

    const MS: Duration = Duration::from_millis(1);

    #[derive(Default)]
    struct Recorder {
        hits: Vec<(PadId, f32)>,
    }

    impl TriggerSink for Recorder {
        fn trigger(&mut self, pad: &PadId, gain: f32) -> anyhow::Result<()> {
            self.hits.push((pad.clone(), gain));
            Ok(())
        }
    }

    /// Fails for one pad, records the rest.
    struct Flaky {
        bad: PadId,
        ok:  Vec<PadId>,
    }

    impl TriggerSink for Flaky {
        fn trigger(&mut self, pad: &PadId, _gain: f32) -> anyhow::Result<()> {
            if *pad == self.bad {
                anyhow::bail!("device hiccup");
            }
            self.ok.push(pad.clone());
            Ok(())
        }
    }

    fn pads() -> Vec<PadId> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    fn shared(bpm: f32) -> Arc<Mutex<StepSequencer>> {
        Arc::new(Mutex::new(StepSequencer::new(pads(), 16, bpm).unwrap()))
    }

    #[test]
    fn stopped_transport_does_nothing() {
        let seq = shared(120.0);
        let mut c = Coordinator::new(Arc::clone(&seq), Recorder::default());
        assert_eq!(c.poll(Instant::now()), Poll::Stopped);
        assert_eq!(c.ticks(), 0);
    }

    #[test]
    fn first_tick_is_one_interval_after_start() {
        let seq = shared(120.0);
        let mut c = Coordinator::new(Arc::clone(&seq), Recorder::default());
        lock(&seq).start();

        let t0 = Instant::now();
        assert_eq!(c.poll(t0), Poll::Waiting(t0 + 125 * MS));
        assert_eq!(c.poll(t0 + 100 * MS), Poll::Waiting(t0 + 125 * MS));
        match c.poll(t0 + 125 * MS) {
            Poll::Fired { step, next_deadline, .. } => {
                assert_eq!(step, 0, "the first tick is the downbeat");
                assert_eq!(next_deadline, t0 + 250 * MS);
            }
            other => panic!("expected a fired tick, got {other:?}"),
        }
    }

    #[test]
    fn velocities_are_passed_as_gain() {
        let seq = shared(120.0);
        {
            let mut s = lock(&seq);
            s.toggle_step(&"a".into(), 0).unwrap();
            s.toggle_step(&"b".into(), 0).unwrap();
            s.set_velocity(&"b".into(), 0, 0.25).unwrap();
            s.start();
        }
        let mut c = Coordinator::new(Arc::clone(&seq), Recorder::default());
        let t0 = Instant::now();
        c.poll(t0);
        c.poll(t0 + 125 * MS);
        assert_eq!(c.sink().hits, vec![("a".into(), DEFAULT_VELOCITY), ("b".into(), 0.25)]);
    }

    #[test]
    fn a_failing_pad_does_not_block_the_others_or_the_transport() {
        let seq = shared(120.0);
        {
            let mut s = lock(&seq);
            for pad in pads() {
                s.toggle_step(&pad, 0).unwrap();
                s.toggle_step(&pad, 1).unwrap();
            }
            s.start();
        }
        let mut c = Coordinator::new(Arc::clone(&seq), Flaky { bad: "b".into(), ok: vec![] });
        let t0 = Instant::now();
        c.poll(t0);
        assert!(matches!(c.poll(t0 + 125 * MS), Poll::Fired { step: 0, .. }));
        assert!(matches!(c.poll(t0 + 250 * MS), Poll::Fired { step: 1, .. }));
        assert_eq!(c.sink().ok, vec!["a".into(), "c".into(), "a".into(), "c".into()]);
    }

    #[test]
    fn stop_before_a_due_tick_suppresses_it() {
        let seq = shared(120.0);
        {
            let mut s = lock(&seq);
            s.toggle_step(&"a".into(), 0).unwrap();
            s.start();
        }
        let mut c = Coordinator::new(Arc::clone(&seq), Recorder::default());
        let t0 = Instant::now();
        c.poll(t0);
        lock(&seq).stop();
        assert_eq!(c.poll(t0 + 125 * MS), Poll::Stopped);
        assert!(c.sink().hits.is_empty());
        assert_eq!(lock(&seq).current_step(), 0);
    }

    #[test]
    fn a_long_stall_fires_once_then_resyncs() {
        let seq = shared(120.0);
        {
            let mut s = lock(&seq);
            for step in 0..16 {
                s.toggle_step(&"a".into(), step).unwrap();
            }
            s.start();
        }
        let mut c = Coordinator::new(Arc::clone(&seq), Recorder::default());
        let t0 = Instant::now();
        c.poll(t0);

        let late = t0 + 1000 * MS; // eight steps late
        assert!(matches!(c.poll(late), Poll::Fired { step: 0, .. }));
        assert_eq!(c.poll(late), Poll::Waiting(late + 125 * MS));
        assert_eq!(c.sink().hits.len(), 1, "missed steps must not machine-gun");
    }

    #[test]
    fn tempo_change_applies_to_the_next_tick() {
        let seq = shared(60.0);
        lock(&seq).start();
        let mut c = Coordinator::new(Arc::clone(&seq), Recorder::default());
        let t0 = Instant::now();
        c.poll(t0);
        let t1 = t0 + 250 * MS;
        assert!(matches!(c.poll(t1), Poll::Fired { next_deadline, .. } if next_deadline == t1 + 250 * MS));

        lock(&seq).set_tempo(240.0).unwrap();
        assert_eq!(c.poll(t1 + MS), Poll::Waiting(t1 + Duration::from_micros(62_500)));
    }

    #[test]
    fn swing_delays_odd_steps_only() {
        let seq = shared(120.0);
        {
            let mut s = lock(&seq);
            s.set_swing(1.0).unwrap();
            s.start();
        }
        let mut c = Coordinator::new(Arc::clone(&seq), Recorder::default());
        let t0 = Instant::now();
        // the downbeat (even) stays on the grid
        assert_eq!(c.poll(t0), Poll::Waiting(t0 + 125 * MS));
        // step 1 (odd): half a step late
        let swung = t0 + 250 * MS + Duration::from_micros(62_500);
        assert!(matches!(c.poll(t0 + 125 * MS), Poll::Fired { step: 0, next_deadline, .. } if next_deadline == swung));
        assert!(matches!(c.poll(swung), Poll::Fired { step: 1, next_deadline, .. } if next_deadline == t0 + 375 * MS));
    }

    #[test]
    fn restarting_reanchors_the_clock() {
        let seq = shared(120.0);
        lock(&seq).start();
        let mut c = Coordinator::new(Arc::clone(&seq), Recorder::default());
        let t0 = Instant::now();
        c.poll(t0);
        {
            let mut s = lock(&seq);
            s.stop();
            s.start();
        }
        let t1 = t0 + 40 * MS;
        assert_eq!(c.poll(t1), Poll::Waiting(t1 + 125 * MS));
    }

    #[test]
    fn subscribers_see_every_fired_pad() {
        let seq = shared(120.0);
        {
            let mut s = lock(&seq);
            s.toggle_step(&"a".into(), 0).unwrap();
            s.toggle_step(&"c".into(), 0).unwrap();
            s.start();
        }
        let mut c = Coordinator::new(Arc::clone(&seq), Recorder::default());
        let rx = c.subscribe();
        let dropped = c.subscribe();
        drop(dropped);

        let t0 = Instant::now();
        c.poll(t0);
        c.poll(t0 + 125 * MS);

        let events: Vec<TriggerEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], TriggerEvent { tick: 1, step: 0, pad: "a".into(), velocity: DEFAULT_VELOCITY });
        assert_eq!(events[1].pad, PadId::from("c"));
        assert_eq!(c.subscribers.len(), 1, "disconnected subscriber is pruned");
    }
}
