//! Tickwise Rollback - Bounded tick history and lag-compensated rollback
//!
//! This crate provides:
//!
//! - **`RollbackBuffer`**: fixed-capacity ring buffer keyed by tick. Bounded
//!   memory, O(1) insertion, oldest ticks evicted automatically.
//! - **`RollbackManager`**: per-collider transform history sized to the
//!   longest tolerated round trip, with scoped rewind/restore for fair
//!   hit detection.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use tickwise_core::{EntityId, Transform, Vec3};
//! use tickwise_rollback::{ColliderWorld, Dimension, RollbackManager, RollbackRequest};
//!
//! #[derive(Default)]
//! struct World(HashMap<EntityId, Transform>);
//!
//! impl ColliderWorld for World {
//!     fn live_transform(&self, id: EntityId) -> Option<Transform> {
//!         self.0.get(&id).copied()
//!     }
//!     fn set_live_transform(&mut self, id: EntityId, transform: Transform) {
//!         self.0.insert(id, transform);
//!     }
//! }
//!
//! let target = EntityId(7);
//! let mut world = World::default();
//! let mut manager = RollbackManager::new(64);
//! manager.track(target, Dimension::Three);
//!
//! for tick in 1..=10 {
//!     let x = tick as f32;
//!     world.set_live_transform(target, Transform::from_translation(Vec3::new(x, 0.0, 0.0)));
//!     manager.record(tick, &world);
//! }
//!
//! {
//!     let scope = manager.rollback(&mut world, RollbackRequest::new(4).locally_owned(true));
//!     let seen = scope.world().live_transform(target).unwrap();
//!     assert_eq!(seen.translation.x, 4.0);
//! } // live transforms restored here
//!
//! assert_eq!(world.live_transform(target).unwrap().translation.x, 10.0);
//! ```

mod buffer;
mod error;
mod manager;

pub use buffer::{BufferStats, RollbackBuffer};
pub use error::{Error, Result};
pub use manager::{
    ColliderWorld, Dimension, RollbackManager, RollbackReport, RollbackRequest, RollbackScope,
};

// Re-export core traits for convenience
pub use tickwise_core::{StateHistory, StateInterpolation};
