use std::collections::HashMap;
use std::time::{Duration, Instant};

use beatpad::pad::{Pad, PadId};
use beatpad::pattern::{Pattern, TransportState};
use beatpad::provider::AudioStatus;
use beatpad::sequencer::EditError;
use beatpad::Session;

/// How long a pad row stays lit after it fires.
const FLASH: Duration = Duration::from_millis(120);

/// Lengths the `]` key cycles through.
const LENGTHS: [usize; 4] = [8, 16, 32, 64];

const BPM_STEP:      f32 = 5.0;
const VELOCITY_STEP: f32 = 0.1;
const SWING_STEP:    f32 = 0.1;
const GAIN_STEP:     f32 = 0.05;

// ── App state ─────────────────────────────────────────────────────────────────

pub struct App {
    pub session:     Session,
    pub kit_name:    String,
    pub pads:        Vec<Pad>,
    pub audio:       AudioStatus,
    /// Copy of the pattern and transport taken at the top of each frame.
    pub pattern:     Pattern,
    pub transport:   TransportState,
    pub master_gain: f32,
    pub should_quit: bool,
    pub status_msg:  String,

    // Grid cursor
    pub pad_row: usize,
    pub step:    usize,

    flashes: HashMap<PadId, Instant>,
}

impl App {
    pub fn new(session: Session, kit_name: String, pads: Vec<Pad>, audio: AudioStatus, master_gain: f32) -> Self {
        let snap = session.snapshot();
        session.set_master_gain(master_gain);
        let status_msg = if audio.is_ready() { String::new() } else { audio.to_string() };
        Self {
            session,
            kit_name,
            pads,
            audio,
            pattern: snap.pattern,
            transport: snap.transport,
            master_gain,
            should_quit: false,
            status_msg,
            pad_row: 0,
            step: 0,
            flashes: HashMap::new(),
        }
    }

    /// Pull fresh state from the session and collect trigger notifications.
    pub fn refresh(&mut self) {
        let snap = self.session.snapshot();
        self.pattern = snap.pattern;
        self.transport = snap.transport;
        if self.step >= self.pattern.length_in_steps {
            self.step = 0;
        }

        let now = Instant::now();
        for event in self.session.events().try_iter() {
            self.flashes.insert(event.pad, now);
        }
        self.flashes.retain(|_, at| now.duration_since(*at) < FLASH);
    }

    pub fn is_flashing(&self, pad: &PadId) -> bool {
        self.flashes.contains_key(pad)
    }

    pub fn selected_pad(&self) -> Option<&Pad> {
        self.pads.get(self.pad_row)
    }

    fn with_selected<T>(&mut self, f: impl FnOnce(&Session, &PadId, usize) -> Result<T, EditError>) -> Option<T> {
        let pad = self.selected_pad()?.id.clone();
        match f(&self.session, &pad, self.step) {
            Ok(v) => Some(v),
            Err(e) => {
                self.status_msg = e.to_string();
                None
            }
        }
    }

    // ── Cursor ────────────────────────────────────────────────────────────

    pub fn pad_up(&mut self) {
        let n = self.pads.len().max(1);
        self.pad_row = if self.pad_row == 0 { n - 1 } else { self.pad_row - 1 };
    }

    pub fn pad_down(&mut self) {
        self.pad_row = (self.pad_row + 1) % self.pads.len().max(1);
    }

    pub fn step_left(&mut self) {
        let n = self.pattern.length_in_steps;
        self.step = if self.step == 0 { n - 1 } else { self.step - 1 };
    }

    pub fn step_right(&mut self) {
        self.step = (self.step + 1) % self.pattern.length_in_steps;
    }

    // ── Pattern edits ─────────────────────────────────────────────────────

    pub fn toggle_step(&mut self) {
        self.with_selected(|s, pad, step| s.toggle_step(pad, step));
    }

    pub fn velocity_up(&mut self) {
        self.nudge_velocity(VELOCITY_STEP);
    }

    pub fn velocity_down(&mut self) {
        self.nudge_velocity(-VELOCITY_STEP);
    }

    fn nudge_velocity(&mut self, delta: f32) {
        let Some(pad) = self.selected_pad().map(|p| p.id.clone()) else { return };
        let current = self.pattern.velocity(&pad, self.step).unwrap_or(0.0);
        if let Some(v) = self.with_selected(|s, pad, step| s.set_velocity(pad, step, current + delta)) {
            self.status_msg = format!("{pad} step {} velocity: {:.0}%", self.step + 1, v * 100.0);
        }
    }

    pub fn toggle_mute(&mut self) {
        let Some(pad) = self.selected_pad().map(|p| p.id.clone()) else { return };
        let muted = !self.pattern.is_muted(&pad);
        if self.with_selected(|s, pad, _| s.edit(|seq| seq.set_muted(pad, muted))).is_some() {
            self.status_msg = format!("{pad} {}", if muted { "muted" } else { "unmuted" });
        }
    }

    pub fn clear_pad(&mut self) {
        if self.with_selected(|s, pad, _| s.edit(|seq| seq.clear_pad(pad))).is_some() {
            self.status_msg = "Row cleared".to_string();
        }
    }

    /// Re-spread the row with one more hit than it has now, wrapping to empty.
    pub fn euclidean(&mut self) {
        let Some(pad) = self.selected_pad().map(|p| p.id.clone()) else { return };
        let len = self.pattern.length_in_steps;
        let active = (0..len).filter(|&i| self.pattern.is_active(&pad, i)).count();
        let hits = if active >= len { 0 } else { active + 1 };
        if self.with_selected(|s, pad, _| s.edit(|seq| seq.euclidean_fill(pad, hits))).is_some() {
            self.status_msg = format!("{pad}: {hits} of {len} euclidean");
        }
    }

    pub fn cycle_length(&mut self) {
        let len = self.pattern.length_in_steps;
        let next = LENGTHS.iter().copied().find(|&l| l > len).unwrap_or(LENGTHS[0]);
        match self.session.set_length(next) {
            Ok(()) => {
                if self.step >= next {
                    self.step = 0;
                }
                self.status_msg = format!("Steps: {next}");
            }
            Err(e) => self.status_msg = e.to_string(),
        }
    }

    // ── Transport and tempo ───────────────────────────────────────────────

    pub fn toggle_play(&mut self) {
        let playing = self.session.toggle_play();
        self.status_msg = if playing { "Playing".to_string() } else { "Stopped".to_string() };
    }

    pub fn bpm_up(&mut self) {
        self.nudge_tempo(BPM_STEP);
    }

    pub fn bpm_down(&mut self) {
        self.nudge_tempo(-BPM_STEP);
    }

    fn nudge_tempo(&mut self, delta: f32) {
        match self.session.set_tempo(self.pattern.tempo_bpm + delta) {
            Ok(bpm) => self.status_msg = format!("BPM: {bpm:.0}"),
            Err(e) => self.status_msg = e.to_string(),
        }
    }

    pub fn swing_up(&mut self) {
        self.nudge_swing(SWING_STEP);
    }

    pub fn swing_down(&mut self) {
        self.nudge_swing(-SWING_STEP);
    }

    fn nudge_swing(&mut self, delta: f32) {
        match self.session.set_swing(self.pattern.swing_amount + delta) {
            Ok(swing) => self.status_msg = format!("Swing: {:.0}%", swing * 100.0),
            Err(e) => self.status_msg = e.to_string(),
        }
    }

    pub fn gain_up(&mut self) {
        self.set_gain(self.master_gain + GAIN_STEP);
    }

    pub fn gain_down(&mut self) {
        self.set_gain(self.master_gain - GAIN_STEP);
    }

    fn set_gain(&mut self, gain: f32) {
        self.master_gain = gain.clamp(0.0, 1.0);
        self.session.set_master_gain(self.master_gain);
        self.status_msg = format!("Master: {:.0}%", self.master_gain * 100.0);
    }

    // ── Audition ──────────────────────────────────────────────────────────

    /// Number keys 1-9 play the matching pad row.
    pub fn audition_key(&mut self, key: char) {
        let Some(row) = key.to_digit(10).and_then(|d| (d as usize).checked_sub(1)) else { return };
        if let Some(pad) = self.pads.get(row) {
            self.session.audition(&pad.id, 1.0);
            self.pad_row = row;
        }
    }

    pub fn audition_selected(&mut self) {
        if let Some(pad) = self.selected_pad() {
            let velocity = self.pattern.velocity(&pad.id, self.step).unwrap_or(1.0);
            self.session.audition(&pad.id, velocity);
        }
    }
}
