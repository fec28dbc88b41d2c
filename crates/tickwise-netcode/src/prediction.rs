//! Owner-side prediction bookkeeping
//!
//! The owner simulates its own commands immediately. `Predictor` remembers
//! those commands and the state each one produced, so an authoritative
//! snapshot can later be compared against the prediction for the same tick
//! and the commands after it replayed.

use crate::wire::CommandPacket;
use crate::{Command, CommandBuffer};
use tickwise_core::{EntityId, NetConfig, StateHistory, Tick};
use tickwise_rollback::RollbackBuffer;

/// Predicted states and unconfirmed commands of one owned entity
#[derive(Debug, Clone)]
pub struct Predictor<I, S> {
    /// Commands not yet confirmed by a snapshot
    commands: CommandBuffer<I>,
    /// State produced by each predicted tick
    history: RollbackBuffer<S>,
    /// Commands repeated per packet
    redundancy: u8,
    /// Newest tick predicted
    predicted_tick: Option<Tick>,
    /// Ticks predicted since the last snapshot
    missed_snapshots: u32,
    /// Missed snapshots that trigger a warning (0 disables)
    warn_threshold: u32,
}

impl<I: Clone, S> Predictor<I, S> {
    pub fn new(config: &NetConfig) -> Self {
        Self {
            commands: CommandBuffer::new(config.command_buffer_capacity),
            history: RollbackBuffer::new(config.command_buffer_capacity.max(1)),
            redundancy: config.redundancy.max(1),
            predicted_tick: None,
            missed_snapshots: 0,
            warn_threshold: config.missing_snapshot_warn_threshold,
        }
    }

    /// Remember a simulated command and the state it produced
    pub fn record(&mut self, command: Command<I>, state: S) {
        let tick = command.tick;
        self.commands.push(command);
        self.history.save_state(tick, state);
        self.predicted_tick = Some(self.predicted_tick.map_or(tick, |t| t.max(tick)));
    }

    /// Overwrite the predicted state of a tick after a replay
    pub fn correct(&mut self, tick: Tick, state: S) {
        self.history.save_state(tick, state);
    }

    /// Packet repeating the newest unconfirmed commands
    pub fn redundant_packet(&self, entity: EntityId) -> CommandPacket<I> {
        self.commands.redundant_packet(entity, self.redundancy)
    }

    /// State predicted for `tick`, if still remembered
    pub fn predicted_state(&self, tick: Tick) -> Option<&S> {
        self.history.get_state(tick)
    }

    /// Drop commands confirmed by a snapshot for `tick`
    pub fn acknowledge(&mut self, tick: Tick) {
        self.commands.acknowledge(tick);
    }

    /// Unconfirmed commands after `tick`, tagged for replay
    pub fn replay_after(&self, tick: Tick) -> Vec<Command<I>> {
        self.commands.replay_after(tick)
    }

    /// Count a tick that passed without a snapshot
    ///
    /// Logs a warning once when the streak reaches the threshold.
    pub fn note_missed_snapshot(&mut self, entity: EntityId) -> u32 {
        self.missed_snapshots = self.missed_snapshots.saturating_add(1);
        if self.warn_threshold > 0 && self.missed_snapshots == self.warn_threshold {
            log::warn!(
                "{}: no snapshot for {} ticks, predicting without confirmation",
                entity,
                self.missed_snapshots
            );
        }
        self.missed_snapshots
    }

    /// A snapshot arrived; the streak ends
    pub fn note_snapshot(&mut self) {
        self.missed_snapshots = 0;
    }

    /// Ticks predicted since the last snapshot
    pub fn missed_snapshots(&self) -> u32 {
        self.missed_snapshots
    }

    /// Newest tick predicted
    pub fn predicted_tick(&self) -> Option<Tick> {
        self.predicted_tick
    }

    /// Number of unconfirmed commands
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Get access to the command buffer
    pub fn commands(&self) -> &CommandBuffer<I> {
        &self.commands
    }

    /// Get access to the predicted state history
    pub fn history(&self) -> &RollbackBuffer<S> {
        &self.history
    }

    /// Reset the predictor
    pub fn reset(&mut self) {
        self.commands.clear();
        self.history.clear();
        self.predicted_tick = None;
        self.missed_snapshots = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NetConfig {
        NetConfig {
            command_buffer_capacity: 8,
            missing_snapshot_warn_threshold: 3,
            ..NetConfig::default()
        }
    }

    #[test]
    fn test_record_and_lookup() {
        let mut predictor: Predictor<u8, f32> = Predictor::new(&config());
        for tick in 1..=4 {
            predictor.record(Command::new(tick, Some(tick as u8)), tick as f32);
        }
        assert_eq!(predictor.predicted_tick(), Some(4));
        assert_eq!(predictor.predicted_state(2), Some(&2.0));

        predictor.acknowledge(2);
        assert_eq!(predictor.pending_commands(), 2);
        let replay: Vec<_> = predictor.replay_after(2).iter().map(|c| c.tick).collect();
        assert_eq!(replay, vec![3, 4]);

        predictor.correct(3, 30.0);
        assert_eq!(predictor.predicted_state(3), Some(&30.0));
    }

    #[test]
    fn test_packet_uses_redundancy() {
        let mut predictor: Predictor<u8, f32> = Predictor::new(&config());
        for tick in 1..=5 {
            predictor.record(Command::new(tick, None), 0.0);
        }
        let packet = predictor.redundant_packet(EntityId(2));
        assert_eq!(packet.records.len(), 3);
        assert_eq!(packet.records[0].tick, 3);
    }

    #[test]
    fn test_missed_snapshot_streak() {
        let mut predictor: Predictor<u8, f32> = Predictor::new(&config());
        for expected in 1..=4 {
            assert_eq!(predictor.note_missed_snapshot(EntityId(1)), expected);
        }
        predictor.note_snapshot();
        assert_eq!(predictor.missed_snapshots(), 0);
    }
}
