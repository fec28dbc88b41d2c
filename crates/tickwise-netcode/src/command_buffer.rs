//! Command buffering for the owning peer
//!
//! Holds commands that have been sent to the authority but not yet confirmed
//! by a snapshot. The newest of them are resent in every packet, and all of
//! them are replayed when a snapshot disagrees with the prediction.

use crate::wire::{CommandPacket, CommandRecord};
use crate::{Command, CommandState};
use std::collections::VecDeque;
use tickwise_core::{EntityId, Tick};

/// Buffer for managing unconfirmed commands
///
/// Full buffers drop their oldest command instead of refusing new ones: the
/// owner must never stall on a slow authority.
#[derive(Debug, Clone)]
pub struct CommandBuffer<I> {
    /// Pending commands (oldest first, ticks strictly increasing)
    commands: VecDeque<Command<I>>,
    /// Maximum number of commands to buffer
    capacity: usize,
    /// Last tick confirmed by the authority
    last_acknowledged_tick: Option<Tick>,
    /// Commands dropped because the buffer was full
    dropped: u64,
}

impl<I> CommandBuffer<I> {
    /// Create a new command buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            commands: VecDeque::with_capacity(capacity),
            capacity,
            last_acknowledged_tick: None,
            dropped: 0,
        }
    }

    /// Add a command to the buffer
    ///
    /// A command for a tick that is already buffered replaces it; one older
    /// than the newest buffered command is ignored. Returns the command
    /// evicted to make room, if any.
    pub fn push(&mut self, command: Command<I>) -> Option<Command<I>> {
        if let Some(newest) = self.commands.back_mut() {
            if command.tick == newest.tick {
                *newest = command;
                return None;
            }
            if command.tick < newest.tick {
                log::debug!(
                    "ignoring command for tick {} behind newest {}",
                    command.tick,
                    newest.tick
                );
                return None;
            }
        }

        let evicted = if self.commands.len() >= self.capacity {
            self.dropped += 1;
            let evicted = self.commands.pop_front();
            if let Some(old) = &evicted {
                log::warn!(
                    "command buffer full ({}), dropping unconfirmed command for tick {}",
                    self.capacity,
                    old.tick
                );
            }
            evicted
        } else {
            None
        };

        self.commands.push_back(command);
        evicted
    }

    /// Acknowledge all commands up to and including the given tick
    ///
    /// Removes acknowledged commands from the buffer.
    pub fn acknowledge(&mut self, tick: Tick) {
        if self.last_acknowledged_tick.is_some_and(|last| tick <= last) {
            return;
        }
        self.last_acknowledged_tick = Some(tick);
        while let Some(front) = self.commands.front() {
            if front.tick <= tick {
                self.commands.pop_front();
            } else {
                break;
            }
        }
    }

    /// Get all commands after a certain tick (for replay during reconciliation)
    pub fn commands_after(&self, tick: Tick) -> impl Iterator<Item = &Command<I>> {
        self.commands.iter().filter(move |c| c.tick > tick)
    }

    /// Get the command buffered for exactly `tick`
    pub fn get(&self, tick: Tick) -> Option<&Command<I>> {
        self.commands.iter().find(|c| c.tick == tick)
    }

    /// The `count` newest commands, oldest first
    pub fn latest(&self, count: usize) -> impl Iterator<Item = &Command<I>> {
        self.commands.iter().skip(self.commands.len().saturating_sub(count))
    }

    /// Get the oldest unacknowledged tick
    pub fn oldest_tick(&self) -> Option<Tick> {
        self.commands.front().map(|c| c.tick)
    }

    /// Get the newest command tick
    pub fn newest_tick(&self) -> Option<Tick> {
        self.commands.back().map(|c| c.tick)
    }

    /// Get the last acknowledged tick
    pub fn last_acknowledged_tick(&self) -> Option<Tick> {
        self.last_acknowledged_tick
    }

    /// Commands dropped because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Get the number of pending commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Check if the buffer is full
    pub fn is_full(&self) -> bool {
        self.commands.len() >= self.capacity
    }

    /// Clear all commands
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Get the capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<I: Clone> CommandBuffer<I> {
    /// Packet carrying the `redundancy` newest commands
    pub fn redundant_packet(&self, entity: EntityId, redundancy: u8) -> CommandPacket<I> {
        CommandPacket {
            entity,
            redundancy,
            records: self
                .latest(redundancy as usize)
                .map(|c| CommandRecord {
                    tick: c.tick,
                    payload: c.input.clone(),
                })
                .collect(),
        }
    }

    /// Commands after `tick`, tagged for replay
    pub fn replay_after(&self, tick: Tick) -> Vec<Command<I>> {
        self.commands_after(tick)
            .map(|c| c.clone().with_state(CommandState::ReplayedUserCreated))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(ticks: std::ops::RangeInclusive<Tick>) -> CommandBuffer<u32> {
        let mut buffer = CommandBuffer::new(10);
        for tick in ticks {
            buffer.push(Command::new(tick, Some(tick * 10)));
        }
        buffer
    }

    #[test]
    fn test_push_and_len() {
        let buffer = filled(1..=3);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.oldest_tick(), Some(1));
        assert_eq!(buffer.newest_tick(), Some(3));
    }

    #[test]
    fn test_acknowledge() {
        let mut buffer = filled(1..=3);

        buffer.acknowledge(2);

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.oldest_tick(), Some(3));
        assert_eq!(buffer.last_acknowledged_tick(), Some(2));

        // Older acknowledgements change nothing
        buffer.acknowledge(1);
        assert_eq!(buffer.last_acknowledged_tick(), Some(2));
    }

    #[test]
    fn test_commands_after() {
        let buffer = filled(1..=4);

        let after_2: Vec<_> = buffer.commands_after(2).collect();
        assert_eq!(after_2.len(), 2);
        assert_eq!(after_2[0].tick, 3);
        assert_eq!(after_2[1].tick, 4);

        let replay = buffer.replay_after(2);
        assert!(replay.iter().all(|c| c.state == CommandState::ReplayedUserCreated));
    }

    #[test]
    fn test_full_buffer_drops_oldest() {
        let mut buffer = CommandBuffer::new(3);
        for tick in 1..=3 {
            assert!(buffer.push(Command::new(tick, Some(tick))).is_none());
        }
        assert!(buffer.is_full());

        let evicted = buffer.push(Command::new(4, Some(4)));
        assert_eq!(evicted.map(|c| c.tick), Some(1));
        assert_eq!(buffer.oldest_tick(), Some(2));
        assert_eq!(buffer.dropped(), 1);
    }

    #[test]
    fn test_same_tick_replaces_older_ignored() {
        let mut buffer = filled(1..=3);
        buffer.push(Command::new(3, Some(99)));
        buffer.push(Command::new(2, Some(77)));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.get(3).and_then(|c| c.input), Some(99));
        assert_eq!(buffer.get(2).and_then(|c| c.input), Some(20));
    }

    #[test]
    fn test_redundant_packet_takes_newest() {
        let buffer = filled(100..=104);
        let packet = buffer.redundant_packet(EntityId(1), 3);
        let ticks: Vec<_> = packet.records.iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![102, 103, 104]);
        assert_eq!(packet.redundancy, 3);

        // Fewer buffered than requested
        let short = filled(1..=2).redundant_packet(EntityId(1), 3);
        assert_eq!(short.records.len(), 2);
    }
}
