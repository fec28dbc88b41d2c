//! Error types for tickwise-rollback

use thiserror::Error;
use tickwise_core::EntityId;

/// Rollback error type
#[derive(Debug, Error)]
pub enum Error {
    /// The entity has no recorded history
    #[error("{0} is not tracked for rollback")]
    EntityNotTracked(EntityId),
}

/// Result type for rollback operations
pub type Result<T> = std::result::Result<T, Error>;
