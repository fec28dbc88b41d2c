//! State history trait for storing and retrieving per-tick values
//!
//! This trait is used by:
//! - `tickwise-rollback` for collider pose history (bounded ring buffer)
//! - `tickwise-netcode` for the owner's predicted states awaiting confirmation
//!
//! # Example
//!
//! ```rust,ignore
//! use tickwise_core::{StateHistory, Tick};
//!
//! struct MyHistory {
//!     states: Vec<(Tick, f32)>,
//! }
//!
//! impl StateHistory<f32> for MyHistory {
//!     fn save_state(&mut self, tick: Tick, state: f32) {
//!         self.states.push((tick, state));
//!     }
//!
//!     fn get_state(&self, tick: Tick) -> Option<&f32> {
//!         self.states.iter().find(|(t, _)| *t == tick).map(|(_, s)| s)
//!     }
//!
//!     // ... other methods
//! }
//! ```

use crate::{Interpolate, PreciseTick, Tick};

/// Trait for storing and retrieving historical values keyed by tick.
pub trait StateHistory<T> {
    /// Save a value at the given tick, replacing any value already there.
    fn save_state(&mut self, tick: Tick, state: T);

    /// Get the value at exactly the given tick, if it exists.
    fn get_state(&self, tick: Tick) -> Option<&T>;

    /// Get the value at or before the given tick.
    ///
    /// Returns `(actual_tick, state)` where `actual_tick <= tick`.
    fn get_nearest_before(&self, tick: Tick) -> Option<(Tick, &T)>;

    /// Get the value at or after the given tick.
    ///
    /// Returns `(actual_tick, state)` where `actual_tick >= tick`.
    fn get_nearest_after(&self, tick: Tick) -> Option<(Tick, &T)>;

    /// Clear all values before the given tick.
    fn clear_before(&mut self, tick: Tick);

    /// Clear all stored values.
    fn clear(&mut self);

    /// Get the capacity of this history.
    ///
    /// Returns `None` for unbounded histories.
    fn capacity(&self) -> Option<usize>;

    /// Get the number of values currently stored.
    fn len(&self) -> usize;

    /// Check if the history is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the tick range of stored values.
    ///
    /// Returns `Some((oldest_tick, newest_tick))`, or `None` when empty.
    fn tick_range(&self) -> Option<(Tick, Tick)>;
}

/// Extension trait for sampling a history between recorded ticks
pub trait StateInterpolation<T: Interpolate + Clone>: StateHistory<T> {
    /// Sample the history at a precise tick.
    ///
    /// An exact hit returns the stored value unchanged. Otherwise the nearest
    /// values on each side are blended; when nothing is recorded after the
    /// target the nearest earlier value is held. Returns `None` when nothing
    /// is recorded at or before the target.
    fn sample(&self, at: PreciseTick) -> Option<T> {
        let (before_tick, before) = self.get_nearest_before(at.tick)?;
        if before_tick == at.tick && at.is_exact() {
            return Some(before.clone());
        }

        let Some((after_tick, after)) = self.get_nearest_after(at.tick.saturating_add(1)) else {
            return Some(before.clone());
        };

        let factor = interpolation_factor(before_tick, after_tick, at);
        Some(before.interpolate(after, factor))
    }
}

/// Calculate the interpolation factor of `target` between two ticks.
///
/// Returns a value in [0.0, 1.0] where 0.0 means the "before" value.
pub fn interpolation_factor(before_tick: Tick, after_tick: Tick, target: PreciseTick) -> f32 {
    if before_tick >= after_tick {
        return 0.0;
    }
    let range = (after_tick - before_tick) as f32;
    let offset = target.tick.saturating_sub(before_tick) as f32 + target.fraction;
    (offset / range).clamp(0.0, 1.0)
}

// Blanket implementation: any history of interpolatable values can be sampled
impl<T: Interpolate + Clone, H: StateHistory<T>> StateInterpolation<T> for H {}

#[cfg(test)]
mod tests {
    use super::*;

    // Simple in-memory implementation for testing
    struct SimpleHistory {
        states: Vec<(Tick, f32)>,
    }

    impl SimpleHistory {
        fn new() -> Self {
            Self { states: Vec::new() }
        }
    }

    impl StateHistory<f32> for SimpleHistory {
        fn save_state(&mut self, tick: Tick, state: f32) {
            self.states.retain(|(t, _)| *t != tick);
            self.states.push((tick, state));
            self.states.sort_by_key(|(t, _)| *t);
        }

        fn get_state(&self, tick: Tick) -> Option<&f32> {
            self.states.iter().find(|(t, _)| *t == tick).map(|(_, s)| s)
        }

        fn get_nearest_before(&self, tick: Tick) -> Option<(Tick, &f32)> {
            self.states
                .iter()
                .filter(|(t, _)| *t <= tick)
                .max_by_key(|(t, _)| *t)
                .map(|(t, s)| (*t, s))
        }

        fn get_nearest_after(&self, tick: Tick) -> Option<(Tick, &f32)> {
            self.states
                .iter()
                .filter(|(t, _)| *t >= tick)
                .min_by_key(|(t, _)| *t)
                .map(|(t, s)| (*t, s))
        }

        fn clear_before(&mut self, tick: Tick) {
            self.states.retain(|(t, _)| *t >= tick);
        }

        fn clear(&mut self) {
            self.states.clear();
        }

        fn capacity(&self) -> Option<usize> {
            None
        }

        fn len(&self) -> usize {
            self.states.len()
        }

        fn tick_range(&self) -> Option<(Tick, Tick)> {
            Some((self.states.first()?.0, self.states.last()?.0))
        }
    }

    fn filled() -> SimpleHistory {
        let mut history = SimpleHistory::new();
        history.save_state(10, 0.0);
        history.save_state(11, 10.0);
        history.save_state(13, 30.0);
        history
    }

    #[test]
    fn test_sample_exact() {
        let history = filled();
        assert_eq!(history.sample(PreciseTick::exact(11)), Some(10.0));
    }

    #[test]
    fn test_sample_fraction() {
        let history = filled();
        assert_eq!(history.sample(PreciseTick::new(10, 0.5)), Some(5.0));
    }

    #[test]
    fn test_sample_across_gap() {
        let history = filled();
        // Tick 12 is missing: 12.0 is halfway between 11 and 13
        assert_eq!(history.sample(PreciseTick::exact(12)), Some(20.0));
    }

    #[test]
    fn test_sample_outside_range() {
        let history = filled();
        assert_eq!(history.sample(PreciseTick::exact(9)), None);
        assert_eq!(history.sample(PreciseTick::new(13, 0.5)), Some(30.0));
    }

    #[test]
    fn test_interpolation_factor() {
        assert_eq!(interpolation_factor(0, 10, PreciseTick::exact(0)), 0.0);
        assert_eq!(interpolation_factor(0, 10, PreciseTick::exact(10)), 1.0);
        assert_eq!(interpolation_factor(0, 10, PreciseTick::exact(5)), 0.5);
        assert_eq!(interpolation_factor(0, 10, PreciseTick::new(5, 0.5)), 0.55);
        assert_eq!(interpolation_factor(10, 10, PreciseTick::exact(10)), 0.0);
    }

    #[test]
    fn test_clear_before_and_range() {
        let mut history = filled();
        assert_eq!(history.tick_range(), Some((10, 13)));
        history.clear_before(11);
        assert_eq!(history.tick_range(), Some((11, 13)));
        assert_eq!(history.len(), 2);
    }
}
