//! Lag-compensated collider rollback
//!
//! The authority records every tracked collider's transform once per tick.
//! To evaluate a hit the way a remote client saw it, the caller opens a
//! `RollbackScope`: live transforms are replaced with the historical pose for
//! the requested tick, the hit test runs against `scope.world()`, and the
//! live transforms are restored when the scope finishes or is dropped.
//!
//! ```text
//!   record(tick) ──▶ RollbackBuffer<Transform> per collider
//!                          │
//!   rollback(request) ─────┴──▶ RollbackScope ──▶ hit test ──▶ finish()/drop
//!                                    (live poses swapped)        (restored)
//! ```

use crate::{Error, RollbackBuffer, Result};
use indexmap::IndexMap;
use tickwise_core::{
    EntityId, NetConfig, PreciseTick, StateHistory, StateInterpolation, Tick, Transform,
};

/// Which physics world a collider lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dimension {
    /// 2D physics only
    Two,
    /// 3D physics only
    #[default]
    Three,
    /// Both worlds
    Both,
}

impl Dimension {
    /// Whether a request for `self` covers a collider registered as `collider`
    pub fn includes(self, collider: Dimension) -> bool {
        match (self, collider) {
            (Dimension::Both, _) | (_, Dimension::Both) => true,
            (request, collider) => request == collider,
        }
    }
}

/// Access to live collider transforms
///
/// Implemented by whatever owns the colliders (a physics world, an ECS
/// adapter, a test fixture).
pub trait ColliderWorld {
    /// Current transform of a collider, `None` if it no longer exists
    fn live_transform(&self, id: EntityId) -> Option<Transform>;

    /// Overwrite the transform of a collider
    fn set_live_transform(&mut self, id: EntityId, transform: Transform);
}

/// Parameters for a rollback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollbackRequest {
    /// Point in time the requesting peer was looking at
    pub target: PreciseTick,
    /// Colliders to rewind
    pub dimension: Dimension,
    /// The requester is the authority's own local client, which sees other
    /// entities at the present tick rather than through the observer
    /// interpolation delay
    pub locally_owned: bool,
}

impl RollbackRequest {
    /// Rewind 3D colliders to a whole tick for a remote requester
    pub fn new(tick: Tick) -> Self {
        Self::precise(PreciseTick::exact(tick))
    }

    /// Rewind 3D colliders to a point between ticks for a remote requester
    pub fn precise(target: PreciseTick) -> Self {
        Self {
            target,
            dimension: Dimension::default(),
            locally_owned: false,
        }
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn locally_owned(mut self, locally_owned: bool) -> Self {
        self.locally_owned = locally_owned;
        self
    }
}

/// Outcome of a rollback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollbackReport {
    /// Point requested, after the observer interpolation delay
    pub requested: PreciseTick,
    /// Point sampled, clamped into the combined retention window
    pub resolved: PreciseTick,
    /// At least one collider had no history that old and was clamped
    pub precision_loss: bool,
    /// Number of colliders moved
    pub rewound: usize,
    /// Colliders sampled at their own oldest frame instead of `resolved`
    pub clamped: usize,
}

#[derive(Debug)]
struct TrackedCollider {
    dimension: Dimension,
    history: RollbackBuffer<Transform>,
}

/// Bounded per-collider transform history with scoped rollback
#[derive(Debug)]
pub struct RollbackManager {
    colliders: IndexMap<EntityId, TrackedCollider>,
    capacity: usize,
    observer_interpolation_ticks: Tick,
}

impl RollbackManager {
    /// Create a manager retaining `capacity` ticks per collider
    pub fn new(capacity: usize) -> Self {
        Self {
            colliders: IndexMap::new(),
            capacity: capacity.max(1),
            observer_interpolation_ticks: 0,
        }
    }

    /// Create a manager sized for `max_rollback_seconds` at `tick_rate`
    pub fn from_config(config: &NetConfig) -> Self {
        Self::new(config.history_capacity())
            .with_observer_interpolation(config.observer_interpolation_ticks)
    }

    /// Ticks remote requesters render other entities behind their target
    pub fn with_observer_interpolation(mut self, ticks: Tick) -> Self {
        self.observer_interpolation_ticks = ticks;
        self
    }

    /// Ticks retained per collider
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start recording a collider; a collider already tracked keeps its history
    pub fn track(&mut self, id: EntityId, dimension: Dimension) {
        let capacity = self.capacity;
        self.colliders
            .entry(id)
            .and_modify(|c| c.dimension = dimension)
            .or_insert_with(|| TrackedCollider {
                dimension,
                history: RollbackBuffer::new(capacity),
            });
    }

    /// Stop recording a collider and drop its history
    pub fn untrack(&mut self, id: EntityId) -> bool {
        self.colliders.shift_remove(&id).is_some()
    }

    pub fn is_tracked(&self, id: EntityId) -> bool {
        self.colliders.contains_key(&id)
    }

    /// Recorded history of a collider
    pub fn history(&self, id: EntityId) -> Option<&RollbackBuffer<Transform>> {
        self.colliders.get(&id).map(|c| &c.history)
    }

    /// Record the live transform of every tracked collider at `tick`
    ///
    /// Colliders missing from the world are skipped.
    pub fn record<W: ColliderWorld>(&mut self, tick: Tick, world: &W) {
        for (id, collider) in &mut self.colliders {
            if let Some(transform) = world.live_transform(*id) {
                collider.history.save_state(tick, transform);
            }
        }
    }

    /// Record a single collider's transform at `tick`
    pub fn record_transform(&mut self, id: EntityId, tick: Tick, transform: Transform) -> Result<()> {
        let collider = self
            .colliders
            .get_mut(&id)
            .ok_or(Error::EntityNotTracked(id))?;
        collider.history.save_state(tick, transform);
        Ok(())
    }

    /// Oldest and newest tick recorded for any collider
    pub fn retention_window(&self) -> Option<(Tick, Tick)> {
        self.colliders
            .values()
            .filter_map(|c| c.history.tick_range())
            .reduce(|(lo, hi), (o, n)| (lo.min(o), hi.max(n)))
    }

    /// Rewind tracked colliders to the requested point in time
    ///
    /// The returned scope holds both the manager and the world mutably, so
    /// no other rollback can start and nothing else can move colliders until
    /// it ends. Each collider is clamped to its own recorded range; any
    /// collider sampled at its oldest frame instead of the target sets
    /// `precision_loss`.
    pub fn rollback<'a, W: ColliderWorld>(
        &'a mut self,
        world: &'a mut W,
        request: RollbackRequest,
    ) -> RollbackScope<'a, W> {
        let requested = if request.locally_owned {
            request.target
        } else {
            request
                .target
                .saturating_sub_ticks(self.observer_interpolation_ticks)
        };

        let mut report = RollbackReport {
            requested,
            resolved: requested,
            precision_loss: false,
            rewound: 0,
            clamped: 0,
        };

        let Some((oldest, newest)) = self.retention_window() else {
            log::warn!("rollback to {} requested with no recorded history", requested);
            report.precision_loss = true;
            return RollbackScope::new(world, Vec::new(), report);
        };

        if requested.tick < oldest {
            log::warn!(
                "rollback target {} is older than retained history, clamping to {}",
                requested,
                oldest
            );
            report.resolved = PreciseTick::exact(oldest);
            report.precision_loss = true;
        } else if requested > PreciseTick::exact(newest) {
            log::debug!("rollback target {} is ahead of history, using {}", requested, newest);
            report.resolved = PreciseTick::exact(newest);
        }

        let mut saved = Vec::new();
        for (id, collider) in &self.colliders {
            if !request.dimension.includes(collider.dimension) {
                continue;
            }
            let Some((first, last)) = collider.history.tick_range() else {
                continue;
            };
            let at = if report.resolved.tick < first {
                report.clamped += 1;
                PreciseTick::exact(first)
            } else if report.resolved > PreciseTick::exact(last) {
                PreciseTick::exact(last)
            } else {
                report.resolved
            };
            let Some(pose) = collider.history.sample(at) else {
                continue;
            };
            let Some(live) = world.live_transform(*id) else {
                continue;
            };
            world.set_live_transform(*id, pose);
            saved.push((*id, live));
        }
        report.rewound = saved.len();
        if report.clamped > 0 && !report.precision_loss {
            log::warn!(
                "rollback target {} predates the history of {} collider(s), clamped to their oldest frame",
                report.resolved,
                report.clamped
            );
            report.precision_loss = true;
        }

        RollbackScope::new(world, saved, report)
    }
}

/// An active rollback window
///
/// Live transforms are restored by `finish` or, on any other exit path
/// (early return, `?`, panic), by `Drop`.
pub struct RollbackScope<'a, W: ColliderWorld> {
    world: &'a mut W,
    saved: Vec<(EntityId, Transform)>,
    report: RollbackReport,
}

impl<'a, W: ColliderWorld> RollbackScope<'a, W> {
    fn new(world: &'a mut W, saved: Vec<(EntityId, Transform)>, report: RollbackReport) -> Self {
        Self {
            world,
            saved,
            report,
        }
    }

    /// Read-only view of the rewound world for hit tests
    pub fn world(&self) -> &W {
        &*self.world
    }

    pub fn report(&self) -> &RollbackReport {
        &self.report
    }

    /// End the rollback and restore live transforms
    pub fn finish(self) {}

    fn restore(&mut self) {
        for (id, live) in self.saved.drain(..).rev() {
            self.world.set_live_transform(id, live);
        }
    }
}

impl<W: ColliderWorld> Drop for RollbackScope<'_, W> {
    fn drop(&mut self) {
        self.restore();
    }
}
