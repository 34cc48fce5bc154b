//! Tick deadlines for the coordinator.
//!
//! Deadlines are always computed as `anchor + interval * n` rather than by
//! re-arming a fixed sleep, so scheduling error never accumulates.  The
//! anchor only moves when the tempo changes, or when the driver falls a
//! whole step behind and has to resync.

use std::time::{Duration, Instant};

/// Extra delay for `step` under `swing`: odd steps land up to half a step late.
pub fn swing_delay(step: usize, swing: f32, interval: Duration) -> Duration {
    if step % 2 == 1 && swing > 0.0 {
        interval.mul_f64(swing.clamp(0.0, 1.0) as f64 * 0.5)
    } else {
        Duration::ZERO
    }
}

/// How a fired tick related to its deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickTiming {
    OnTime,
    /// The tick was at least one whole interval late; the grid was
    /// re-anchored at the firing time and missed steps were not replayed.
    Resynced { behind: Duration },
}

#[derive(Clone, Debug)]
pub struct TickClock {
    /// Grid time of the last re-anchor.
    anchor:   Instant,
    /// Ticks fired since `anchor`.
    ticks:    u32,
    interval: Duration,
}

impl TickClock {
    /// Start a grid at `now`; the first tick is due one interval later.
    pub fn start(now: Instant, interval: Duration) -> Self {
        Self { anchor: now, ticks: 0, interval }
    }

    /// Grid time of the most recently fired tick (the anchor before any).
    pub fn last_grid_time(&self) -> Instant {
        self.anchor + self.interval * self.ticks
    }

    /// Unswung deadline of the next tick.
    pub fn grid_deadline(&self) -> Instant {
        self.anchor + self.interval * (self.ticks + 1)
    }

    /// Deadline of the next tick including its swing offset.
    pub fn deadline(&self, swing: Duration) -> Instant {
        self.grid_deadline() + swing
    }

    /// Change tempo without losing place: the next tick becomes due one new
    /// interval after the last one.
    pub fn set_interval(&mut self, interval: Duration) {
        if interval == self.interval {
            return;
        }
        self.anchor = self.last_grid_time();
        self.ticks = 0;
        self.interval = interval;
    }

    /// Account for a tick fired at `now`.
    pub fn tick(&mut self, now: Instant) -> TickTiming {
        let due = self.grid_deadline();
        let behind = now.saturating_duration_since(due);
        if behind >= self.interval {
            self.anchor = now;
            self.ticks = 0;
            return TickTiming::Resynced { behind };
        }
        if self.ticks == u32::MAX {
            // re-anchor before the multiplier overflows
            self.anchor = due;
            self.ticks = 0;
        } else {
            self.ticks += 1;
        }
        TickTiming::OnTime
    }
}
