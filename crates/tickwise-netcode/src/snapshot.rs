//! Authoritative state and staleness tracking

use crate::wire::SnapshotHeader;
use serde::{Deserialize, Serialize};
use tickwise_core::{EntityId, Tick};

/// Authoritative state of one entity after a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    pub entity: EntityId,
    /// Tick of the command that produced this state
    pub tick: Tick,
    /// Per-entity counter, increasing with every snapshot the authority sends
    pub sequence: u32,
    pub state: S,
}

impl<S> Snapshot<S> {
    pub fn header(&self) -> SnapshotHeader {
        SnapshotHeader {
            entity: self.entity,
            tick: self.tick,
            sequence: self.sequence,
        }
    }

    pub fn from_header(header: SnapshotHeader, state: S) -> Self {
        Self {
            entity: header.entity,
            tick: header.tick,
            sequence: header.sequence,
            state,
        }
    }
}

/// Rejects snapshots that are not newer than the last one applied
///
/// A snapshot is stale when its sequence is not above the last accepted
/// sequence, or its tick is not above the last accepted tick.
#[derive(Debug, Clone, Default)]
pub struct SnapshotGate {
    last_sequence: Option<u32>,
    last_tick: Option<Tick>,
}

impl SnapshotGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stale(&self, header: &SnapshotHeader) -> bool {
        self.last_sequence.is_some_and(|seq| header.sequence <= seq)
            || self.last_tick.is_some_and(|tick| header.tick <= tick)
    }

    /// Accept the header if it is fresh; returns whether it was accepted
    pub fn admit(&mut self, header: &SnapshotHeader) -> bool {
        if self.is_stale(header) {
            return false;
        }
        self.last_sequence = Some(header.sequence);
        self.last_tick = Some(header.tick);
        true
    }

    /// Tick of the last accepted snapshot
    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    /// Sequence of the last accepted snapshot
    pub fn last_sequence(&self) -> Option<u32> {
        self.last_sequence
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(tick: Tick, sequence: u32) -> SnapshotHeader {
        SnapshotHeader {
            entity: EntityId(1),
            tick,
            sequence,
        }
    }

    #[test]
    fn test_older_tick_rejected() {
        let mut gate = SnapshotGate::new();
        assert!(gate.admit(&header(205, 10)));
        assert!(gate.is_stale(&header(200, 11)));
        assert!(!gate.admit(&header(200, 11)));
        assert_eq!(gate.last_tick(), Some(205));
    }

    #[test]
    fn test_replayed_sequence_rejected() {
        let mut gate = SnapshotGate::new();
        assert!(gate.admit(&header(10, 4)));
        assert!(gate.is_stale(&header(11, 4)));
        assert!(gate.is_stale(&header(10, 5)));
        assert!(gate.admit(&header(11, 5)));
    }

    #[test]
    fn test_reset() {
        let mut gate = SnapshotGate::new();
        gate.admit(&header(10, 4));
        gate.reset();
        assert!(gate.admit(&header(1, 0)));
    }
}
