//! Tickwise Core - Shared time, identity and math for tick-based netcode
//!
//! This crate provides the types every other tickwise crate builds on:
//! - Tick-based time (`Tick`, `PreciseTick`, `Rounding`)
//! - The fixed-interval scheduler (`TickClock`)
//! - Entity and connection identifiers
//! - Transform math with interpolation (`Vec3`, `Quat`, `Transform`)
//! - Shared configuration (`NetConfig`, loadable from RON)
//! - The `StateHistory` trait implemented by per-tick buffers
//!
//! Nothing here touches the network; `tickwise-netcode` and
//! `tickwise-rollback` layer prediction and lag compensation on top.

pub mod clock;
mod config;
mod error;
mod identity;
mod math;
mod state_history;
pub mod time;

pub use clock::{AdvanceReport, TickClock, TickEvent};
pub use config::NetConfig;
pub use error::{Error, Result};
pub use identity::{ConnectionId, EntityId};
pub use math::{Interpolate, Quat, Transform, Vec3};
pub use state_history::{interpolation_factor, StateHistory, StateInterpolation};
pub use time::{PreciseTick, Rounding, Tick};
