//! Transform smoothing for rendering
//!
//! Simulation produces one transform per tick; rendering runs at its own
//! rate. `TransformSmoother` blends from the previous goal to the current
//! one over a tick interval so the rendered pose moves continuously.

use tickwise_core::{Interpolate, NetConfig, Tick, Transform};

/// Smoother between per-tick transform goals
///
/// Stores the previous and current goals and blends between them based on
/// time elapsed since the current goal arrived.
#[derive(Debug, Clone)]
pub struct TransformSmoother {
    /// Goal being blended away from
    previous: Option<Transform>,
    /// Goal being blended toward
    current: Option<(Tick, Transform)>,
    /// Seconds since the current goal arrived
    elapsed: f64,
    /// Seconds to travel from one goal to the next
    tick_interval: f64,
    /// Goal distance above which the pose snaps
    teleport_threshold: Option<f32>,
}

impl TransformSmoother {
    /// Create a new smoother
    pub fn new(tick_interval: f64, teleport_threshold: Option<f32>) -> Self {
        Self {
            previous: None,
            current: None,
            elapsed: 0.0,
            tick_interval: if tick_interval.is_finite() && tick_interval > 0.0 {
                tick_interval
            } else {
                0.0
            },
            teleport_threshold,
        }
    }

    pub fn from_config(config: &NetConfig) -> Self {
        Self::new(config.tick_interval(), config.teleport_threshold)
    }

    /// Update with a new goal for `tick`
    ///
    /// Goals older than the current one are ignored; a goal for the same
    /// tick replaces it. A goal farther than the teleport threshold from the
    /// current one snaps, whatever its tick. Returns whether the goal was
    /// taken.
    pub fn update_goal(&mut self, transform: Transform, tick: Tick) -> bool {
        let Some((current_tick, current)) = self.current else {
            self.previous = Some(transform);
            self.current = Some((tick, transform));
            self.elapsed = self.tick_interval;
            return true;
        };

        if tick < current_tick {
            log::trace!("ignoring goal for tick {} behind {}", tick, current_tick);
            return false;
        }

        if self.is_teleport(&current, &transform) {
            log::debug!("goal for tick {} jumped past the teleport threshold, snapping", tick);
            self.previous = Some(transform);
            self.elapsed = self.tick_interval;
        } else if tick > current_tick {
            self.previous = Some(current);
            self.elapsed = 0.0;
        }
        self.current = Some((tick, transform));
        true
    }

    fn is_teleport(&self, from: &Transform, to: &Transform) -> bool {
        self.teleport_threshold
            .is_some_and(|limit| from.translation.distance(to.translation) > limit)
    }

    /// Advance render time and get the blended transform
    pub fn update(&mut self, delta_seconds: f64) -> Option<Transform> {
        if delta_seconds.is_finite() && delta_seconds > 0.0 {
            self.elapsed += delta_seconds;
        }
        self.current()
    }

    /// Blended transform at the current render time
    pub fn current(&self) -> Option<Transform> {
        let (_, goal) = self.current?;
        let Some(previous) = self.previous else {
            return Some(goal);
        };
        Some(previous.interpolate(&goal, self.alpha()))
    }

    /// Blend factor from the previous goal (0.0) to the current one (1.0)
    pub fn alpha(&self) -> f32 {
        if self.tick_interval <= 0.0 {
            return 1.0;
        }
        (self.elapsed / self.tick_interval).clamp(0.0, 1.0) as f32
    }

    /// Get the tick of the current goal
    pub fn goal_tick(&self) -> Option<Tick> {
        self.current.map(|(t, _)| t)
    }

    /// Get the current goal
    pub fn goal(&self) -> Option<Transform> {
        self.current.map(|(_, g)| g)
    }

    /// Check whether a blend is still in progress
    pub fn is_blending(&self) -> bool {
        self.current.is_some() && self.alpha() < 1.0
    }

    /// Reset the smoother
    pub fn reset(&mut self) {
        self.previous = None;
        self.current = None;
        self.elapsed = 0.0;
    }
}
