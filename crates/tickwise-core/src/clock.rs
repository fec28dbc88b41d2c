//! Fixed-interval tick scheduler
//!
//! `TickClock` turns variable wall-clock frame deltas into a strictly ordered
//! stream of tick events. Every tick emits `PreTick`, `Tick` and `PostTick`
//! in that order, and a single call never runs more than
//! `max_catch_up_ticks` ticks.

use crate::{Error, NetConfig, PreciseTick, Result, Rounding, Tick};

/// Distance from an integer (in ticks) under which a converted value is
/// treated as that integer, absorbing `f64` error in `n * interval`.
const TICK_SNAP_EPSILON: f64 = 1e-9;

/// Events emitted for every simulated tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    /// Before simulation; inbound network data is drained here
    PreTick(Tick),
    /// Simulation step
    Tick(Tick),
    /// After simulation; history is recorded here
    PostTick(Tick),
}

impl TickEvent {
    /// The tick this event belongs to
    pub fn tick(&self) -> Tick {
        match self {
            TickEvent::PreTick(t) | TickEvent::Tick(t) | TickEvent::PostTick(t) => *t,
        }
    }
}

/// Summary of one `TickClock::advance` call
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdvanceReport {
    /// Number of ticks run
    pub ticks: u32,
    /// Backlog thrown away because the catch-up cap was reached
    pub discarded_seconds: f64,
}

impl AdvanceReport {
    /// Whether the catch-up cap discarded time during this call
    pub fn was_clamped(&self) -> bool {
        self.discarded_seconds > 0.0
    }
}

/// Fixed-interval simulation clock
#[derive(Debug, Clone)]
pub struct TickClock {
    /// Last tick that was run (0 before the first tick)
    tick: Tick,
    /// Ticks per second
    tick_rate: u16,
    /// Seconds per tick
    interval: f64,
    /// Unconsumed time, always below `interval` between calls
    accumulator: f64,
    /// Upper bound on ticks run by a single `advance`
    max_catch_up_ticks: u32,
}

impl TickClock {
    /// Default catch-up cap
    pub const DEFAULT_MAX_CATCH_UP_TICKS: u32 = 5;

    /// Create a clock running at `tick_rate` ticks per second
    pub fn new(tick_rate: u16) -> Result<Self> {
        if tick_rate == 0 {
            return Err(Error::InvalidTickRate(tick_rate));
        }
        Ok(Self {
            tick: 0,
            tick_rate,
            interval: 1.0 / tick_rate as f64,
            accumulator: 0.0,
            max_catch_up_ticks: Self::DEFAULT_MAX_CATCH_UP_TICKS,
        })
    }

    /// Create a clock from the shared configuration
    pub fn from_config(config: &NetConfig) -> Result<Self> {
        Ok(Self::new(config.tick_rate)?.with_max_catch_up_ticks(config.max_catch_up_ticks))
    }

    /// Set the catch-up cap (at least one tick)
    pub fn with_max_catch_up_ticks(mut self, ticks: u32) -> Self {
        self.max_catch_up_ticks = ticks.max(1);
        self
    }

    /// Last tick that was run
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Ticks per second
    pub fn tick_rate(&self) -> u16 {
        self.tick_rate
    }

    /// Seconds per tick
    pub fn tick_interval(&self) -> f64 {
        self.interval
    }

    /// Catch-up cap
    pub fn max_catch_up_ticks(&self) -> u32 {
        self.max_catch_up_ticks
    }

    /// Jump forward to `tick`, e.g. to adopt the authority's tick on join
    ///
    /// Ticks never decrease: returns `false` and leaves the clock untouched
    /// when `tick` is not ahead of the current one.
    pub fn sync_to(&mut self, tick: Tick) -> bool {
        if tick <= self.tick {
            log::debug!("ignoring clock sync to {} (already at {})", tick, self.tick);
            return false;
        }
        self.tick = tick;
        true
    }

    /// Accumulate `delta_seconds` and run every whole tick it covers
    ///
    /// `on_event` receives `PreTick`, `Tick` and `PostTick` for each tick run.
    /// When more than `max_catch_up_ticks` intervals are pending, the excess
    /// whole intervals are discarded (the sub-interval remainder is kept) and
    /// a warning is logged.
    pub fn advance<F>(&mut self, delta_seconds: f64, mut on_event: F) -> AdvanceReport
    where
        F: FnMut(TickEvent),
    {
        if !delta_seconds.is_finite() || delta_seconds < 0.0 {
            log::warn!("ignoring invalid frame delta {}", delta_seconds);
            return AdvanceReport::default();
        }

        self.accumulator += delta_seconds;
        let mut report = AdvanceReport::default();

        while self.accumulator >= self.interval {
            if report.ticks == self.max_catch_up_ticks {
                let whole = (self.accumulator / self.interval).floor();
                let mut remainder = self.accumulator - whole * self.interval;
                if remainder < 0.0 || self.interval - remainder < TICK_SNAP_EPSILON * self.interval
                {
                    remainder = 0.0;
                }
                report.discarded_seconds = self.accumulator - remainder;
                self.accumulator = remainder;
                log::warn!(
                    "tick clock fell behind: ran {} ticks, discarded {:.3}s of backlog",
                    report.ticks,
                    report.discarded_seconds
                );
                break;
            }

            self.accumulator -= self.interval;
            self.tick = self.tick.wrapping_add(1);
            report.ticks += 1;

            let tick = self.tick;
            on_event(TickEvent::PreTick(tick));
            on_event(TickEvent::Tick(tick));
            on_event(TickEvent::PostTick(tick));
        }

        report
    }

    /// Current position including the fraction of the interval accumulated
    /// toward the next tick
    pub fn precise_tick(&self) -> PreciseTick {
        PreciseTick::new(self.tick, (self.accumulator / self.interval) as f32)
    }

    /// Convert a duration into ticks
    ///
    /// Values within `1e-9` ticks of an integer are treated as that integer
    /// before rounding, so `time_to_ticks(ticks_to_time(n), mode) == n` for
    /// every mode. Negative and non-finite durations give zero.
    pub fn time_to_ticks(&self, seconds: f64, rounding: Rounding) -> Tick {
        let raw = seconds * self.tick_rate as f64;
        if !raw.is_finite() || raw <= 0.0 {
            return 0;
        }

        let nearest = raw.round();
        let raw = if (raw - nearest).abs() < TICK_SNAP_EPSILON {
            nearest
        } else {
            raw
        };

        let ticks = match rounding {
            Rounding::Nearest => raw.round(),
            Rounding::Up => raw.ceil(),
            Rounding::Down => raw.floor(),
        };
        ticks.min(Tick::MAX as f64) as Tick
    }

    /// Convert a tick count into seconds
    pub fn ticks_to_time(&self, ticks: Tick) -> f64 {
        ticks as f64 * self.interval
    }

    /// Convert a precise tick into seconds since tick zero
    pub fn precise_tick_to_time(&self, precise: PreciseTick) -> f64 {
        precise.as_f64() * self.interval
    }

    /// Convert seconds since tick zero into a precise tick
    pub fn time_to_precise_tick(&self, seconds: f64) -> PreciseTick {
        let raw = seconds * self.tick_rate as f64;
        if !raw.is_finite() || raw <= 0.0 {
            return PreciseTick::default();
        }
        let whole = raw.floor();
        PreciseTick::new(whole.min(Tick::MAX as f64) as Tick, (raw - whole) as f32)
    }

    /// Seconds elapsed between `since` and the current tick
    ///
    /// Zero when `since` is in the future.
    pub fn time_passed(&self, since: Tick) -> f64 {
        self.ticks_to_time(self.tick.saturating_sub(since))
    }

    /// Signed tick distance from `from` to `to`
    pub fn ticks_between(from: Tick, to: Tick) -> i64 {
        to as i64 - from as i64
    }
}
