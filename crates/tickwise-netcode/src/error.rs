//! Error types for tickwise-netcode

use thiserror::Error;
use tickwise_core::{ConnectionId, EntityId};

/// Netcode error type
#[derive(Debug, Error)]
pub enum Error {
    /// No entity registered under this id
    #[error("Entity {0} is not registered")]
    EntityNotFound(EntityId),

    /// An entity with this id is already registered
    #[error("Entity {0} is already registered")]
    AlreadyRegistered(EntityId),

    /// The operation does not apply to the entity's role
    #[error("Entity {entity} is not {expected}")]
    RoleMismatch {
        entity: EntityId,
        expected: &'static str,
    },

    /// A reconciliation was requested while one is still running
    #[error("Entity {0} is already reconciling")]
    ReconcileInProgress(EntityId),

    /// A packet arrived from a peer that may not send for this entity
    #[error("Connection {connection} may not send data for {entity}")]
    UnexpectedSender {
        entity: EntityId,
        connection: ConnectionId,
    },

    /// The transport refused to send
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Wire encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// First byte of a packet names no known packet kind
    #[error("Unknown packet kind {0}")]
    UnknownPacketKind(u8),

    /// Packet is shorter than its fixed header
    #[error("Truncated packet: {len} bytes, need at least {needed}")]
    TruncatedPacket { len: usize, needed: usize },

    /// Configuration or clock error
    #[error(transparent)]
    Core(#[from] tickwise_core::Error),
}

impl Error {
    pub(crate) fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::TransportUnavailable(Box::new(err))
    }
}

/// Result type for netcode operations
pub type Result<T> = std::result::Result<T, Error>;
