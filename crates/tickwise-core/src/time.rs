//! Tick types for fixed-step simulation
//!
//! - `Tick` - Discrete simulation step, the unit of time for prediction
//! - `PreciseTick` - A tick plus a sub-tick fraction
//! - `Rounding` - How fractional tick counts become whole ticks

use serde::{Deserialize, Serialize};
use std::fmt;

/// A discrete tick identifier (logical time unit)
///
/// Matches the `u32` tick field carried on the wire.
pub type Tick = u32;

/// Rounding applied when converting a duration into a whole number of ticks
///
/// Timers depend on these being exact: a boost lasting `0.5s` at 30 ticks per
/// second is 15 ticks under every mode, while `0.51s` is 15 ticks with
/// `Nearest`/`Down` and 16 with `Up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Rounding {
    /// Round half away from zero
    #[default]
    Nearest,
    /// Round toward positive infinity (never ends a timer early)
    Up,
    /// Round toward zero (never ends a timer late)
    Down,
}

/// A tick plus a fractional position toward the following tick
///
/// `fraction` is always within `[0.0, 1.0)`. A value of `0.25` on tick `10`
/// refers to a quarter of the way from tick `10` to tick `11`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct PreciseTick {
    /// Whole tick
    pub tick: Tick,
    /// Sub-tick position in `[0.0, 1.0)`
    pub fraction: f32,
}

impl PreciseTick {
    /// Create a precise tick, normalizing the fraction
    ///
    /// Whole units in `fraction` carry into `tick`; negative or non-finite
    /// fractions become zero.
    pub fn new(tick: Tick, fraction: f32) -> Self {
        if !fraction.is_finite() || fraction <= 0.0 {
            return Self::exact(tick);
        }
        let whole = fraction.floor();
        let mut fraction = fraction - whole;
        // Rounding can leave exactly 1.0 for values just below an integer
        if fraction >= 1.0 {
            fraction = 0.0;
        }
        Self {
            tick: tick.saturating_add(whole as Tick),
            fraction,
        }
    }

    /// A precise tick aligned exactly on `tick`
    pub fn exact(tick: Tick) -> Self {
        Self {
            tick,
            fraction: 0.0,
        }
    }

    /// Whether this refers to a whole tick with no sub-tick offset
    pub fn is_exact(&self) -> bool {
        self.fraction == 0.0
    }

    /// The position as a floating point tick count
    pub fn as_f64(&self) -> f64 {
        self.tick as f64 + self.fraction as f64
    }

    /// Move back by a whole number of ticks, stopping at tick zero
    pub fn saturating_sub_ticks(self, ticks: Tick) -> Self {
        Self {
            tick: self.tick.saturating_sub(ticks),
            fraction: self.fraction,
        }
    }
}

impl From<Tick> for PreciseTick {
    fn from(tick: Tick) -> Self {
        Self::exact(tick)
    }
}

impl fmt::Display for PreciseTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:.3}", self.tick, self.fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precise_tick_normalizes() {
        let pt = PreciseTick::new(10, 1.25);
        assert_eq!(pt.tick, 11);
        assert_eq!(pt.fraction, 0.25);

        let pt = PreciseTick::new(10, -0.5);
        assert_eq!(pt, PreciseTick::exact(10));

        let pt = PreciseTick::new(10, f32::NAN);
        assert!(pt.is_exact());
    }

    #[test]
    fn test_precise_tick_ordering() {
        assert!(PreciseTick::new(10, 0.5) > PreciseTick::exact(10));
        assert!(PreciseTick::new(10, 0.9) < PreciseTick::exact(11));
    }

    #[test]
    fn test_saturating_sub_ticks() {
        let pt = PreciseTick::new(3, 0.5).saturating_sub_ticks(5);
        assert_eq!(pt.tick, 0);
        assert_eq!(pt.fraction, 0.5);
    }

    #[test]
    fn test_display() {
        assert_eq!(PreciseTick::new(7, 0.5).to_string(), "7+0.500");
    }
}
