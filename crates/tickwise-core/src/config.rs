//! Network simulation configuration
//!
//! One `NetConfig` is shared by the clock, command pipeline, reconciliation
//! engine, rollback manager and smoother. It is plain serde data and can be
//! loaded from RON.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for prediction, reconciliation and rollback
///
/// Every field has a default, so a RON file only needs the values it changes.
///
/// # Example
///
/// ```
/// use tickwise_core::NetConfig;
///
/// let config = NetConfig::from_ron_str("(tick_rate: 60, redundancy: 4)").unwrap();
/// assert_eq!(config.tick_rate, 60);
/// assert_eq!(config.redundancy, 4);
/// assert_eq!(config.max_catch_up_ticks, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Ticks per second
    pub tick_rate: u16,
    /// Most ticks a single clock advance may run before discarding backlog
    pub max_catch_up_ticks: u32,
    /// Number of most recent commands repeated in every command packet
    pub redundancy: u8,
    /// Commands an owner keeps for resending and replay
    pub command_buffer_capacity: usize,
    /// Commands an authority buffers per entity before dropping the oldest
    pub max_command_backlog: usize,
    /// Oldest point in the past (seconds) a rollback can reach
    pub max_rollback_seconds: f64,
    /// Ticks remote clients render other entities behind the present
    pub observer_interpolation_ticks: u32,
    /// Divergence above which a snapshot triggers a replay
    pub reconcile_epsilon: f32,
    /// Replay even on matching snapshots and report non-deterministic results
    pub verify_determinism: bool,
    /// Consecutive ticks without a snapshot before a warning is logged (0 disables)
    pub missing_snapshot_warn_threshold: u32,
    /// Goal distance above which the smoother snaps instead of blending
    pub teleport_threshold: Option<f32>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            max_catch_up_ticks: 5,
            redundancy: 3,
            command_buffer_capacity: 128,
            max_command_backlog: 16,
            max_rollback_seconds: 1.0,
            observer_interpolation_ticks: 2,
            reconcile_epsilon: 0.0,
            verify_determinism: false,
            missing_snapshot_warn_threshold: 30,
            teleport_threshold: Some(5.0),
        }
    }
}

impl NetConfig {
    /// Parse and validate a RON document
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: NetConfig = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate == 0 {
            return Err(Error::InvalidTickRate(self.tick_rate));
        }
        if self.max_catch_up_ticks == 0 {
            return Err(invalid("max_catch_up_ticks must be at least 1"));
        }
        if self.redundancy == 0 {
            return Err(invalid("redundancy must be at least 1"));
        }
        if self.command_buffer_capacity < self.redundancy as usize {
            return Err(invalid("command_buffer_capacity must hold at least `redundancy` commands"));
        }
        if self.max_command_backlog == 0 {
            return Err(invalid("max_command_backlog must be at least 1"));
        }
        if !self.max_rollback_seconds.is_finite() || self.max_rollback_seconds <= 0.0 {
            return Err(invalid("max_rollback_seconds must be a positive number"));
        }
        if !self.reconcile_epsilon.is_finite() || self.reconcile_epsilon < 0.0 {
            return Err(invalid("reconcile_epsilon must be zero or positive"));
        }
        if let Some(threshold) = self.teleport_threshold {
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(invalid("teleport_threshold must be positive when set"));
            }
        }
        Ok(())
    }

    /// Seconds per tick
    pub fn tick_interval(&self) -> f64 {
        1.0 / self.tick_rate.max(1) as f64
    }

    /// Frames a rollback history must hold to reach `max_rollback_seconds`
    /// into the past, plus the present frame
    ///
    /// ```
    /// use tickwise_core::NetConfig;
    ///
    /// let config = NetConfig::default(); // 30 ticks/s, 1s window
    /// assert_eq!(config.history_capacity(), 31);
    /// ```
    pub fn history_capacity(&self) -> usize {
        let frames = (self.max_rollback_seconds * self.tick_rate as f64).ceil();
        (frames.max(1.0) as usize) + 1
    }
}

fn invalid(reason: &str) -> Error {
    Error::InvalidConfig(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(NetConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = NetConfig::from_ron_str(
            "(tick_rate: 64, reconcile_epsilon: 0.05, teleport_threshold: None)",
        )
        .unwrap();
        assert_eq!(config.tick_rate, 64);
        assert_eq!(config.reconcile_epsilon, 0.05);
        assert_eq!(config.teleport_threshold, None);
        assert_eq!(config.redundancy, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            NetConfig::from_ron_str("(tick_rate: 0)"),
            Err(Error::InvalidTickRate(0))
        ));
        assert!(matches!(
            NetConfig::from_ron_str("(redundancy: 0)"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            NetConfig::from_ron_str("(redundancy: 8, command_buffer_capacity: 4)"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            NetConfig::from_ron_str("(teleport_threshold: Some(-1.0))"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_malformed_ron() {
        assert!(matches!(
            NetConfig::from_ron_str("(tick_rate: \"fast\")"),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_history_capacity() {
        let config = NetConfig {
            tick_rate: 60,
            max_rollback_seconds: 0.25,
            ..NetConfig::default()
        };
        assert_eq!(config.history_capacity(), 16);
    }
}
