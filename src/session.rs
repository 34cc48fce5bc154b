use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::coordinator::{lock, Coordinator, Poll, TriggerEvent, TriggerSink};
use crate::pad::PadId;
use crate::sequencer::{EditError, Snapshot, StepSequencer};

enum Control {
    /// Something changed (transport, tempo, swing): recompute the deadline.
    Wake,
    Audition(PadId, f32),
    MasterGain(f32),
    /// Cut ringing tails.
    Silence,
    Shutdown,
}

/// A running sequencer: one worker thread owns the coordinator and its
/// sink, the caller keeps a handle for editing and reading state.
///
/// Every mutation goes through the sequencer mutex, and every call that can
/// move the next deadline wakes the worker so the change is heard at once.
pub struct Session {
    sequencer: Arc<Mutex<StepSequencer>>,
    control:   Sender<Control>,
    events:    Receiver<TriggerEvent>,
    worker:    Option<JoinHandle<()>>,
}

impl Session {
    pub fn spawn<S>(sequencer: StepSequencer, sink: S) -> anyhow::Result<Self>
    where
        S: TriggerSink + Send + 'static,
    {
        let sequencer = Arc::new(Mutex::new(sequencer));
        let mut coordinator = Coordinator::new(Arc::clone(&sequencer), sink);
        let events = coordinator.subscribe();
        let (control, rx) = crossbeam_channel::unbounded();

        let worker = thread::Builder::new()
            .name("beatpad-clock".into())
            .spawn(move || run_clock(coordinator, rx))?;

        Ok(Self { sequencer, control, events, worker: Some(worker) })
    }

    /// Trigger notifications from the clock thread.
    pub fn events(&self) -> &Receiver<TriggerEvent> {
        &self.events
    }

    pub fn snapshot(&self) -> Snapshot {
        lock(&self.sequencer).snapshot()
    }

    /// Run `f` against the sequencer and wake the clock afterwards.
    pub fn edit<R>(&self, f: impl FnOnce(&mut StepSequencer) -> R) -> R {
        let mut seq = lock(&self.sequencer);
        let out = f(&mut *seq);
        drop(seq);
        self.wake();
        out
    }

    pub fn start(&self) -> bool {
        self.edit(|s| s.start())
    }

    /// Stop, rewind and cut whatever is still ringing.
    pub fn stop(&self) {
        self.edit(|s| s.stop());
        self.silence();
    }

    pub fn toggle_play(&self) -> bool {
        let playing = self.edit(|s| {
            if s.is_playing() {
                s.stop();
                false
            } else {
                s.start();
                true
            }
        });
        if !playing {
            self.silence();
        }
        playing
    }

    pub fn set_tempo(&self, bpm: f32) -> Result<f32, EditError> {
        self.edit(|s| s.set_tempo(bpm))
    }

    pub fn set_swing(&self, amount: f32) -> Result<f32, EditError> {
        self.edit(|s| s.set_swing(amount))
    }

    pub fn set_length(&self, length: usize) -> Result<(), EditError> {
        self.edit(|s| s.set_length(length))
    }

    pub fn toggle_step(&self, pad: &PadId, step: usize) -> Result<bool, EditError> {
        self.edit(|s| s.toggle_step(pad, step))
    }

    pub fn set_velocity(&self, pad: &PadId, step: usize, value: f32) -> Result<f32, EditError> {
        self.edit(|s| s.set_velocity(pad, step, value))
    }

    /// Play a pad right now through the session's sink.
    pub fn audition(&self, pad: &PadId, velocity: f32) {
        let _ = self.control.send(Control::Audition(pad.clone(), velocity));
    }

    pub fn set_master_gain(&self, gain: f32) {
        let _ = self.control.send(Control::MasterGain(gain));
    }

    fn silence(&self) {
        let _ = self.control.send(Control::Silence);
    }

    fn wake(&self) {
        let _ = self.control.send(Control::Wake);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("clock thread panicked");
            }
        }
    }
}

/// Worker loop: poll, then sleep until the next deadline or a control message.
fn run_clock<S: TriggerSink>(mut coordinator: Coordinator<S>, rx: Receiver<Control>) {
    debug!("clock thread started");
    loop {
        let next = coordinator.poll(Instant::now()).deadline();
        let msg = match next {
            Some(at) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            },
        };
        match msg {
            Control::Wake => {}
            Control::Audition(pad, velocity) => {
                if let Err(e) = coordinator.audition(&pad, velocity) {
                    warn!("audition of pad {pad} failed: {e:#}");
                }
            }
            Control::MasterGain(gain) => coordinator.set_master_gain(gain),
            Control::Silence => coordinator.silence(),
            Control::Shutdown => break,
        }
    }
    debug!("clock thread stopped after {} ticks", coordinator.ticks());
}
