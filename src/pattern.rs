use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pad::PadId;

/// Sixteenth notes: four steps per beat.
pub const STEPS_PER_BEAT: u32 = 4;
pub const MIN_BPM: f32 = 20.0;
pub const MAX_BPM: f32 = 300.0;
pub const DEFAULT_BPM: f32 = 120.0;
pub const DEFAULT_LENGTH: usize = 16;
pub const MAX_LENGTH: usize = 256;
/// Velocity given to every slot that has never been edited.
pub const DEFAULT_VELOCITY: f32 = 0.8;

/// Duration of one step at `bpm`.
pub fn step_interval(bpm: f32) -> Duration {
    Duration::from_secs_f64(60.0 / bpm as f64 / STEPS_PER_BEAT as f64)
}

// ── Pattern ───────────────────────────────────────────────────────────────────

/// Sequencing data for one loop.
///
/// Every pad present in `steps_by_pad` is present in `velocity_by_pad` and
/// both arrays are exactly `length_in_steps` long.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub length_in_steps: usize,
    pub tempo_bpm:       f32,
    pub swing_amount:    f32,
    pub steps_by_pad:    BTreeMap<PadId, Vec<bool>>,
    pub velocity_by_pad: BTreeMap<PadId, Vec<f32>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub muted:           BTreeSet<PadId>,
}

impl Pattern {
    /// An empty pattern for `pads`.  `length` and `bpm` must already be valid.
    pub(crate) fn new(pads: impl IntoIterator<Item = PadId>, length: usize, bpm: f32) -> Self {
        let mut steps_by_pad = BTreeMap::new();
        let mut velocity_by_pad = BTreeMap::new();
        for pad in pads {
            steps_by_pad.insert(pad.clone(), vec![false; length]);
            velocity_by_pad.insert(pad, vec![DEFAULT_VELOCITY; length]);
        }
        Self {
            length_in_steps: length,
            tempo_bpm: bpm,
            swing_amount: 0.0,
            steps_by_pad,
            velocity_by_pad,
            muted: BTreeSet::new(),
        }
    }

    pub fn has_pad(&self, pad: &PadId) -> bool {
        self.steps_by_pad.contains_key(pad)
    }

    pub fn is_active(&self, pad: &PadId, step: usize) -> bool {
        self.steps_by_pad
            .get(pad)
            .and_then(|s| s.get(step))
            .copied()
            .unwrap_or(false)
    }

    pub fn velocity(&self, pad: &PadId, step: usize) -> Option<f32> {
        self.velocity_by_pad.get(pad).and_then(|v| v.get(step)).copied()
    }

    pub fn is_muted(&self, pad: &PadId) -> bool {
        self.muted.contains(pad)
    }

    /// Resize every pad's arrays.  Growth appends inactive steps at the
    /// default velocity; shrinking discards the tail.
    pub(crate) fn resize(&mut self, length: usize) {
        for steps in self.steps_by_pad.values_mut() {
            steps.truncate(length);
            steps.resize(length, false);
        }
        for vels in self.velocity_by_pad.values_mut() {
            vels.truncate(length);
            vels.resize(length, DEFAULT_VELOCITY);
        }
        self.length_in_steps = length;
    }

    /// Panics if the step and velocity tables disagree.  A mismatch can only
    /// come from a bug in the sequencer itself.
    pub fn assert_consistent(&self) {
        assert!(
            self.steps_by_pad.keys().eq(self.velocity_by_pad.keys()),
            "pattern invariant violated: step and velocity tables cover different pads"
        );
        for (pad, steps) in &self.steps_by_pad {
            let vels = &self.velocity_by_pad[pad];
            assert!(
                steps.len() == self.length_in_steps && vels.len() == self.length_in_steps,
                "pattern invariant violated: pad {pad} has {} steps / {} velocities, length is {}",
                steps.len(), vels.len(), self.length_in_steps
            );
        }
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayState {
    Stopped,
    Playing,
}

/// The play-head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportState {
    pub state:        PlayState,
    pub current_step: usize,
    /// The next tick plays `current_step` itself instead of moving on.
    /// Set by start, stop, locate and length changes so a fresh pass opens
    /// on the step the play-head sits on.
    pub armed:        bool,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }
}

impl Default for TransportState {
    fn default() -> Self {
        Self { state: PlayState::Stopped, current_step: 0, armed: true }
    }
}
