use std::fmt;
use std::time::Duration;

use crate::pad::PadId;
use crate::pattern::{
    step_interval, Pattern, PlayState, TransportState, DEFAULT_VELOCITY, MAX_BPM, MAX_LENGTH,
    MIN_BPM,
};

// ── Errors ────────────────────────────────────────────────────────────────────

/// A rejected edit.  Numeric ranges are clamped rather than rejected; these
/// cover input that cannot be sensibly clamped.
#[derive(Clone, Debug, PartialEq)]
pub enum EditError {
    UnknownPad(PadId),
    StepOutOfRange { step: usize, length: usize },
    /// Pattern length must be in 1..=MAX_LENGTH.
    InvalidLength(usize),
    /// Tempo must be a positive, finite number.
    InvalidTempo(f32),
    /// Velocity / swing must not be NaN.
    InvalidValue(f32),
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::UnknownPad(pad) => write!(f, "unknown pad '{pad}'"),
            EditError::StepOutOfRange { step, length } =>
                write!(f, "step {step} is outside the pattern (length {length})"),
            EditError::InvalidLength(n) =>
                write!(f, "pattern length must be between 1 and {MAX_LENGTH}, got {n}"),
            EditError::InvalidTempo(bpm) => write!(f, "tempo must be a positive number, got {bpm}"),
            EditError::InvalidValue(v) => write!(f, "invalid value {v}"),
        }
    }
}

impl std::error::Error for EditError {}

// ── Step output ───────────────────────────────────────────────────────────────

/// The pads that fire on one step, with their velocities.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepHits {
    pub step: usize,
    pub hits: Vec<(PadId, f32)>,
}

/// Read-only copy of the sequencer state for rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub pattern:   Pattern,
    pub transport: TransportState,
}

// ── Sequencer ─────────────────────────────────────────────────────────────────

/// Pattern + transport for one studio session.
///
/// Owns no timer: the coordinator calls `advance_step()` once per tick, so
/// everything here is testable without wall-clock time.
#[derive(Clone, Debug)]
pub struct StepSequencer {
    pattern:    Pattern,
    transport:  TransportState,
    /// Bumped on every start/stop so a clock driver can notice a restart it
    /// did not observe directly.
    generation: u64,
}

impl StepSequencer {
    pub fn new(
        pads: impl IntoIterator<Item = PadId>,
        length: usize,
        bpm: f32,
    ) -> Result<Self, EditError> {
        validate_length(length)?;
        let bpm = clamp_tempo(bpm)?;
        let seq = Self {
            pattern: Pattern::new(pads, length, bpm),
            transport: TransportState::default(),
            generation: 0,
        };
        seq.pattern.assert_consistent();
        Ok(seq)
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn pattern(&self) -> &Pattern { &self.pattern }
    pub fn transport(&self) -> &TransportState { &self.transport }
    pub fn is_playing(&self) -> bool { self.transport.is_playing() }
    pub fn current_step(&self) -> usize { self.transport.current_step }
    pub fn length(&self) -> usize { self.pattern.length_in_steps }
    pub fn tempo(&self) -> f32 { self.pattern.tempo_bpm }
    pub fn swing(&self) -> f32 { self.pattern.swing_amount }
    pub fn generation(&self) -> u64 { self.generation }

    /// Step the next `advance_step()` will land on.
    pub fn next_step(&self) -> usize {
        if self.transport.armed {
            self.transport.current_step
        } else {
            (self.transport.current_step + 1) % self.pattern.length_in_steps
        }
    }

    /// Duration of one step at the current tempo.
    pub fn tick_interval(&self) -> Duration {
        step_interval(self.pattern.tempo_bpm)
    }

    /// Copy-on-read view; nothing in it aliases sequencer internals.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot { pattern: self.pattern.clone(), transport: self.transport }
    }

    // ── Transport ─────────────────────────────────────────────────────────

    /// `Stopped → Playing`.  The first tick plays the step the play-head
    /// sits on.  Returns false if already playing.
    pub fn start(&mut self) -> bool {
        if self.is_playing() {
            return false;
        }
        self.transport.state = PlayState::Playing;
        self.transport.armed = true;
        self.generation += 1;
        true
    }

    /// `Playing → Stopped`; always rewinds to step 0.
    pub fn stop(&mut self) {
        if self.is_playing() {
            self.generation += 1;
        }
        self.transport.state = PlayState::Stopped;
        self.transport.current_step = 0;
        self.transport.armed = true;
    }

    /// Move the play-head without changing the play state.  The next tick
    /// plays `step`.
    pub fn locate(&mut self, step: usize) -> Result<(), EditError> {
        self.check_step(step)?;
        self.transport.current_step = step;
        self.transport.armed = true;
        Ok(())
    }

    /// The per-tick operation: move to the next step (wrapping to 0 after the
    /// last one) and report which unmuted pads fire there.  Right after
    /// start, stop or locate the play-head stays put for this one tick.
    pub fn advance_step(&mut self) -> StepHits {
        let step = self.next_step();
        self.transport.current_step = step;
        self.transport.armed = false;

        let hits = self.pattern.steps_by_pad
            .iter()
            .filter(|(pad, steps)| steps[step] && !self.pattern.muted.contains(*pad))
            .map(|(pad, _)| (pad.clone(), self.pattern.velocity_by_pad[pad][step]))
            .collect();

        StepHits { step, hits }
    }

    // ── Pattern edits ─────────────────────────────────────────────────────

    /// Flip one step.  Returns the new state.  The slot's velocity (default
    /// or pre-staged) is left as is.
    pub fn toggle_step(&mut self, pad: &PadId, step: usize) -> Result<bool, EditError> {
        self.check_step(step)?;
        let steps = self.steps_mut(pad)?;
        steps[step] = !steps[step];
        Ok(steps[step])
    }

    pub fn set_step(&mut self, pad: &PadId, step: usize, on: bool) -> Result<(), EditError> {
        self.check_step(step)?;
        self.steps_mut(pad)?[step] = on;
        Ok(())
    }

    /// Set a slot's velocity, clamped into [0, 1].  Does not enable the step.
    pub fn set_velocity(&mut self, pad: &PadId, step: usize, value: f32) -> Result<f32, EditError> {
        self.check_step(step)?;
        if value.is_nan() {
            return Err(EditError::InvalidValue(value));
        }
        let value = value.clamp(0.0, 1.0);
        let vels = self.pattern.velocity_by_pad
            .get_mut(pad)
            .ok_or_else(|| EditError::UnknownPad(pad.clone()))?;
        vels[step] = value;
        Ok(value)
    }

    /// Set the tempo, clamped to `MIN_BPM..=MAX_BPM`.  The play-head is untouched.
    pub fn set_tempo(&mut self, bpm: f32) -> Result<f32, EditError> {
        let bpm = clamp_tempo(bpm)?;
        self.pattern.tempo_bpm = bpm;
        Ok(bpm)
    }

    /// Swing amount in [0, 1]; see `clock::swing_delay` for how it is applied.
    pub fn set_swing(&mut self, amount: f32) -> Result<f32, EditError> {
        if amount.is_nan() {
            return Err(EditError::InvalidValue(amount));
        }
        self.pattern.swing_amount = amount.clamp(0.0, 1.0);
        Ok(self.pattern.swing_amount)
    }

    /// Resize the pattern and rewind the play-head to step 0.
    pub fn set_length(&mut self, length: usize) -> Result<(), EditError> {
        validate_length(length)?;
        self.pattern.resize(length);
        self.transport.current_step = 0;
        self.transport.armed = true;
        self.pattern.assert_consistent();
        Ok(())
    }

    pub fn set_muted(&mut self, pad: &PadId, muted: bool) -> Result<(), EditError> {
        if !self.pattern.has_pad(pad) {
            return Err(EditError::UnknownPad(pad.clone()));
        }
        if muted {
            self.pattern.muted.insert(pad.clone());
        } else {
            self.pattern.muted.remove(pad);
        }
        Ok(())
    }

    /// Turn every step of `pad` off and restore default velocities.
    pub fn clear_pad(&mut self, pad: &PadId) -> Result<(), EditError> {
        self.steps_mut(pad)?.fill(false);
        if let Some(vels) = self.pattern.velocity_by_pad.get_mut(pad) {
            vels.fill(DEFAULT_VELOCITY);
        }
        Ok(())
    }

    /// Spread `hits` onsets as evenly as possible over the pattern, starting
    /// on step 0.  Replaces the pad's existing steps.
    pub fn euclidean_fill(&mut self, pad: &PadId, hits: usize) -> Result<(), EditError> {
        let n = self.pattern.length_in_steps;
        let k = hits.min(n);
        let steps = self.steps_mut(pad)?;
        // Bresenham: step i is a hit when floor(i*k/n) moves on from step i-1
        for (i, slot) in steps.iter_mut().enumerate() {
            *slot = k > 0 && (i * k) % n < k;
        }
        Ok(())
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn steps_mut(&mut self, pad: &PadId) -> Result<&mut Vec<bool>, EditError> {
        self.pattern.steps_by_pad
            .get_mut(pad)
            .ok_or_else(|| EditError::UnknownPad(pad.clone()))
    }

    fn check_step(&self, step: usize) -> Result<(), EditError> {
        let length = self.pattern.length_in_steps;
        if step >= length {
            return Err(EditError::StepOutOfRange { step, length });
        }
        Ok(())
    }
}

fn validate_length(length: usize) -> Result<(), EditError> {
    if length == 0 || length > MAX_LENGTH {
        return Err(EditError::InvalidLength(length));
    }
    Ok(())
}

fn clamp_tempo(bpm: f32) -> Result<f32, EditError> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(EditError::InvalidTempo(bpm));
    }
    Ok(bpm.clamp(MIN_BPM, MAX_BPM))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kick() -> PadId { PadId::from("kick") }
    fn snare() -> PadId { PadId::from("snare") }

    fn seq(length: usize) -> StepSequencer {
        StepSequencer::new([kick(), snare()], length, 120.0).unwrap()
    }

    #[test]
    fn advancing_length_times_wraps_back_to_zero() {
        for length in [1, 3, 4, 16, 32, 64, MAX_LENGTH] {
            let mut s = seq(length);
            s.start();
            assert_eq!(s.advance_step().step, 0);
            for _ in 0..length {
                s.advance_step();
            }
            assert_eq!(s.current_step(), 0, "length {length}");
        }
    }

    #[test]
    fn last_step_is_followed_by_step_zero() {
        let mut s = seq(4);
        let visited: Vec<usize> = (0..9).map(|_| s.advance_step().step).collect();
        assert_eq!(visited, vec![0, 1, 2, 3, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn toggling_twice_restores_the_step() {
        let mut s = seq(16);
        for step in [0, 5, 15] {
            let before = s.pattern().is_active(&kick(), step);
            assert_eq!(s.toggle_step(&kick(), step).unwrap(), !before);
            assert_eq!(s.toggle_step(&kick(), step).unwrap(), before);
        }
    }

    #[test]
    fn toggle_validates_pad_and_step() {
        let mut s = seq(16);
        assert_eq!(
            s.toggle_step(&PadId::from("cowbell"), 0),
            Err(EditError::UnknownPad(PadId::from("cowbell")))
        );
        assert_eq!(
            s.toggle_step(&kick(), 16),
            Err(EditError::StepOutOfRange { step: 16, length: 16 })
        );
    }

    #[test]
    fn enabled_step_uses_default_or_prestaged_velocity() {
        let mut s = seq(16);
        s.toggle_step(&kick(), 1).unwrap();
        assert_eq!(s.pattern().velocity(&kick(), 1), Some(DEFAULT_VELOCITY));

        // pre-stage a level on an inactive step, then enable it
        assert_eq!(s.set_velocity(&kick(), 2, 0.3).unwrap(), 0.3);
        assert!(!s.pattern().is_active(&kick(), 2), "velocity must not enable the step");
        s.toggle_step(&kick(), 2).unwrap();
        assert_eq!(s.pattern().velocity(&kick(), 2), Some(0.3));
    }

    #[test]
    fn velocity_is_clamped_and_nan_rejected() {
        let mut s = seq(16);
        assert_eq!(s.set_velocity(&kick(), 0, 1.7).unwrap(), 1.0);
        assert_eq!(s.set_velocity(&kick(), 0, -0.2).unwrap(), 0.0);
        assert!(matches!(s.set_velocity(&kick(), 0, f32::NAN), Err(EditError::InvalidValue(_))));
    }

    #[test]
    fn tempo_clamps_in_range_and_rejects_nonsense() {
        let mut s = seq(16);
        s.start();
        for _ in 0..5 { s.advance_step(); }
        assert_eq!(s.set_tempo(500.0).unwrap(), MAX_BPM);
        assert_eq!(s.set_tempo(5.0).unwrap(), MIN_BPM);
        assert_eq!(s.set_tempo(97.5).unwrap(), 97.5);
        assert_eq!(s.current_step(), 4, "tempo change keeps the play-head");
        assert!(matches!(s.set_tempo(0.0), Err(EditError::InvalidTempo(_))));
        assert!(matches!(s.set_tempo(-60.0), Err(EditError::InvalidTempo(_))));
        assert!(matches!(s.set_tempo(f32::NAN), Err(EditError::InvalidTempo(_))));
    }

    #[test]
    fn every_valid_tempo_then_advance_is_fine() {
        let mut s = seq(16);
        s.start();
        let mut bpm = MIN_BPM;
        while bpm <= MAX_BPM {
            s.set_tempo(bpm).unwrap();
            s.advance_step();
            assert!(s.tick_interval() > Duration::ZERO);
            bpm += 7.5;
        }
    }

    #[test]
    fn shrinking_then_growing_leaves_no_stale_data() {
        let mut s = seq(16);
        for step in 0..16 {
            s.toggle_step(&kick(), step).unwrap();
            s.set_velocity(&kick(), step, 0.1).unwrap();
        }
        s.set_length(4).unwrap();
        s.set_length(16).unwrap();

        for step in 0..4 {
            assert!(s.pattern().is_active(&kick(), step));
            assert_eq!(s.pattern().velocity(&kick(), step), Some(0.1));
        }
        for step in 4..16 {
            assert!(!s.pattern().is_active(&kick(), step), "step {step} should be reset");
            assert_eq!(s.pattern().velocity(&kick(), step), Some(DEFAULT_VELOCITY));
        }
    }

    #[test]
    fn set_length_rewinds_and_validates() {
        let mut s = seq(16);
        s.start();
        for _ in 0..9 { s.advance_step(); }
        s.set_length(32).unwrap();
        assert_eq!(s.current_step(), 0);
        assert_eq!(s.set_length(0), Err(EditError::InvalidLength(0)));
        assert_eq!(s.set_length(MAX_LENGTH + 1), Err(EditError::InvalidLength(MAX_LENGTH + 1)));
        assert_eq!(s.length(), 32);
    }

    #[test]
    fn start_resumes_and_stop_rewinds() {
        let mut s = seq(16);
        assert!(s.start());
        assert!(!s.start(), "second start is a no-op");
        for _ in 0..5 { s.advance_step(); }

        s.stop();
        assert!(!s.is_playing());
        assert_eq!(s.current_step(), 0);

        s.locate(7).unwrap();
        s.start();
        assert_eq!(s.current_step(), 7, "start does not rewind");
        assert_eq!(s.advance_step().step, 7);
        assert_eq!(s.advance_step().step, 8);
    }

    #[test]
    fn first_tick_of_a_fresh_pass_plays_the_downbeat() {
        let mut s = seq(16);
        s.toggle_step(&kick(), 0).unwrap();
        assert_eq!(s.next_step(), 0);

        s.start();
        let first = s.advance_step();
        assert_eq!(first.step, 0);
        assert_eq!(first.hits, vec![(kick(), DEFAULT_VELOCITY)]);
        assert_eq!(s.next_step(), 1);

        for _ in 0..5 { s.advance_step(); }
        s.stop();
        s.start();
        assert_eq!(s.advance_step().step, 0, "restart opens on the downbeat");

        for _ in 0..3 { s.advance_step(); }
        s.set_length(8).unwrap();
        assert_eq!(s.advance_step().step, 0, "length change opens on the downbeat");
        assert_eq!(s.advance_step().step, 1);
    }

    #[test]
    fn generation_counts_transport_changes() {
        let mut s = seq(16);
        let g0 = s.generation();
        s.start();
        s.start();
        s.stop();
        s.stop();
        assert_eq!(s.generation(), g0 + 2);
    }

    #[test]
    fn advance_reports_velocities_and_skips_muted_pads() {
        let mut s = seq(8);
        s.toggle_step(&kick(), 1).unwrap();
        s.set_velocity(&kick(), 1, 0.6).unwrap();
        s.toggle_step(&snare(), 1).unwrap();

        s.locate(1).unwrap();
        let hits = s.advance_step();
        assert_eq!(hits.step, 1);
        assert_eq!(hits.hits, vec![(kick(), 0.6), (snare(), DEFAULT_VELOCITY)]);

        s.set_muted(&snare(), true).unwrap();
        s.locate(1).unwrap();
        assert_eq!(s.advance_step().hits, vec![(kick(), 0.6)]);
    }

    #[test]
    fn snapshot_does_not_alias_internals() {
        let mut s = seq(16);
        let mut snap = s.snapshot();
        snap.pattern.steps_by_pad.get_mut(&kick()).unwrap()[0] = true;
        snap.transport.current_step = 9;
        assert!(!s.pattern().is_active(&kick(), 0));
        assert_eq!(s.current_step(), 0);

        s.toggle_step(&kick(), 3).unwrap();
        assert!(!snap.pattern.is_active(&kick(), 3));
    }

    #[test]
    fn euclidean_fill_distributes_hits() {
        let mut s = seq(16);
        s.euclidean_fill(&kick(), 4).unwrap();
        let on: Vec<usize> = (0..16).filter(|&i| s.pattern().is_active(&kick(), i)).collect();
        assert_eq!(on, vec![0, 4, 8, 12]);

        s.euclidean_fill(&snare(), 3).unwrap();
        let count = (0..16).filter(|&i| s.pattern().is_active(&snare(), i)).count();
        assert_eq!(count, 3);

        s.euclidean_fill(&kick(), 0).unwrap();
        assert!((0..16).all(|i| !s.pattern().is_active(&kick(), i)));
    }

    #[test]
    fn clear_pad_resets_steps_and_velocities() {
        let mut s = seq(8);
        s.set_step(&kick(), 2, true).unwrap();
        s.set_velocity(&kick(), 2, 0.2).unwrap();
        s.clear_pad(&kick()).unwrap();
        assert!(!s.pattern().is_active(&kick(), 2));
        assert_eq!(s.pattern().velocity(&kick(), 2), Some(DEFAULT_VELOCITY));
    }
}
