//! Tickwise Netcode - Tick-based prediction and reconciliation
//!
//! This crate provides the network side of a fixed-tick simulation:
//!
//! - **Commands**: per-tick input records, buffered until confirmed
//! - **Replication**: every packet repeats the newest commands; the authority
//!   reassembles them in tick order and fills holes left by lost packets
//! - **Reconciliation**: owners compare snapshots against their prediction
//!   and replay later commands when they diverge
//! - **Smoothing**: render-rate blending between per-tick transforms
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── Owner ─────────────────────────┐
//! │  ┌───────────────┐  ┌──────────────┐  ┌─────────────┐  │
//! │  │ CommandBuffer │─▶│  Predictor   │─▶│  Smoother   │  │
//! │  └───────────────┘  └──────────────┘  └─────────────┘  │
//! │          │                  ▲                          │
//! └──────────┼──────────────────┼──────────────────────────┘
//!            ▼ commands (xK)    │ snapshots
//! ┌──────────────────────── Authority ─────────────────────┐
//! │  ┌─────────────────┐   ┌──────────────────────────┐    │
//! │  │ CommandReceiver │──▶│  simulate + Snapshot     │    │
//! │  └─────────────────┘   └──────────────────────────┘    │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tickwise_netcode::{NetContext, ReconciliationEngine, Role};
//!
//! let mut context = NetContext::new(config.clone(), udp_transport)?;
//! let mut engine = ReconciliationEngine::new(config);
//! engine.register(player_id, player_body, Role::Owner { authority: server })?;
//!
//! loop {
//!     // Hand received bytes to the context; they are handled at PreTick
//!     while let Some((bytes, from)) = socket.try_recv() {
//!         context.deliver(bytes, Channel::Unreliable, from);
//!     }
//!
//!     // Run every tick covered by this frame
//!     let report = context.run_frame(frame_delta, &mut engine, &mut input_hooks);
//!
//!     // Render the smoothed pose
//!     smoother.update_goal(engine.body(player_id).unwrap().transform(), context.tick());
//!     render(smoother.update(frame_delta));
//! }
//! ```

mod command;
mod command_buffer;
mod context;
mod error;
mod interpolation;
mod prediction;
mod reconciliation;
mod replicate;
mod snapshot;
mod transport;
pub mod wire;

pub use command::{Command, CommandState};
pub use command_buffer::CommandBuffer;
pub use context::{FrameReport, NetContext, TickHooks};
pub use error::{Error, Result};
pub use interpolation::TransformSmoother;
pub use prediction::Predictor;
pub use reconciliation::{
    EngineStats, PacketOutcome, Phase, PredictedBody, ReconcileOutcome, ReconciliationEngine,
    Role, TickPass,
};
pub use replicate::{CommandReceiver, ReceiveReport};
pub use snapshot::{Snapshot, SnapshotGate};
pub use transport::{Channel, Delivery, MemoryTransport, Transport};
pub use wire::{CommandPacket, CommandRecord, SnapshotHeader};

// Re-export core types for convenience
pub use tickwise_core::{ConnectionId, EntityId, NetConfig, Tick};
