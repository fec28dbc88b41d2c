//! Authority side of command replication
//!
//! Commands arrive redundantly and out of order. `CommandReceiver` keeps
//! them keyed by tick and hands them out strictly in tick order, filling
//! holes left by lost packets with the last command actually received.

use crate::wire::CommandPacket;
use crate::{Command, CommandState};
use std::collections::BTreeMap;
use std::ops::AddAssign;
use tickwise_core::{NetConfig, Tick};

/// What happened to a batch of received commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Commands buffered for the first time
    pub accepted: usize,
    /// Commands replacing one already buffered for the same tick
    pub duplicates: usize,
    /// Commands for ticks already consumed
    pub stale: usize,
    /// Buffered commands evicted because the backlog was too long
    pub dropped: usize,
}

impl AddAssign for ReceiveReport {
    fn add_assign(&mut self, rhs: Self) {
        self.accepted += rhs.accepted;
        self.duplicates += rhs.duplicates;
        self.stale += rhs.stale;
        self.dropped += rhs.dropped;
    }
}

/// Per-entity reassembly of the owner's command stream
#[derive(Debug, Clone)]
pub struct CommandReceiver<I> {
    pending: BTreeMap<Tick, Command<I>>,
    last_consumed: Option<Tick>,
    /// Last command consumed that was really received
    last_received: Option<Command<I>>,
    max_backlog: usize,
    totals: ReceiveReport,
}

impl<I: Clone> CommandReceiver<I> {
    pub fn new(max_backlog: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            last_consumed: None,
            last_received: None,
            max_backlog: max_backlog.max(1),
            totals: ReceiveReport::default(),
        }
    }

    pub fn from_config(config: &NetConfig) -> Self {
        Self::new(config.max_command_backlog)
    }

    /// Buffer incoming commands
    pub fn receive<C>(&mut self, commands: C) -> ReceiveReport
    where
        C: IntoIterator<Item = Command<I>>,
    {
        let mut report = ReceiveReport::default();

        for command in commands {
            if self.last_consumed.is_some_and(|last| command.tick <= last) {
                report.stale += 1;
                continue;
            }
            if self.pending.insert(command.tick, command).is_some() {
                report.duplicates += 1;
            } else {
                report.accepted += 1;
            }
        }

        while self.pending.len() > self.max_backlog {
            let Some((tick, dropped)) = self.pending.pop_first() else {
                break;
            };
            report.dropped += 1;
            log::warn!(
                "command backlog above {}, dropping command for tick {}",
                self.max_backlog,
                tick
            );
            // Skip the dropped tick instead of filling it in later
            if self.last_consumed.is_some() {
                self.last_consumed = Some(tick);
                self.last_received = Some(dropped);
            }
        }

        self.totals += report;
        report
    }

    /// Buffer every record of a decoded packet
    pub fn receive_packet(&mut self, packet: CommandPacket<I>) -> ReceiveReport {
        self.receive(packet.into_commands())
    }

    /// Consume the command for the next tick
    ///
    /// Returns the buffered command for the tick after the last one consumed.
    /// When that tick never arrived but a later one did, the last received
    /// command is repeated for it and tagged `Predicted`. Returns `None` when
    /// nothing is buffered.
    pub fn next_command(&mut self) -> Option<Command<I>> {
        let next = match self.last_consumed {
            Some(last) => last.wrapping_add(1),
            None => *self.pending.keys().next()?,
        };

        if let Some(command) = self.pending.remove(&next) {
            self.last_consumed = Some(next);
            self.last_received = Some(command.clone());
            return Some(command);
        }

        if self.pending.is_empty() {
            return None;
        }

        self.last_consumed = Some(next);
        let filled = match &self.last_received {
            Some(previous) => previous.extrapolate(next, CommandState::Predicted),
            None => Command {
                tick: next,
                input: None,
                state: CommandState::Predicted,
            },
        };
        log::trace!(
            "tick {} missing, repeating input of tick {:?}",
            next,
            self.last_received.as_ref().map(|c| c.tick)
        );
        Some(filled)
    }

    /// Consume every tick up to the newest buffered one
    pub fn drain_ready(&mut self) -> Vec<Command<I>> {
        let mut ready = Vec::new();
        while !self.pending.is_empty() {
            match self.next_command() {
                Some(command) => ready.push(command),
                None => break,
            }
        }
        ready
    }

    /// Guess the command for a tick not reached yet, without consuming anything
    pub fn extrapolate_future(&self, tick: Tick) -> Option<Command<I>> {
        self.last_received
            .as_ref()
            .map(|previous| previous.extrapolate(tick, CommandState::CurrentFuture))
    }

    /// Last tick handed out by `next_command`
    pub fn last_consumed(&self) -> Option<Tick> {
        self.last_consumed
    }

    /// Number of buffered commands
    pub fn backlog(&self) -> usize {
        self.pending.len()
    }

    /// Newest buffered tick
    pub fn newest_tick(&self) -> Option<Tick> {
        self.pending.keys().next_back().copied()
    }

    /// Counters accumulated over the receiver's lifetime
    pub fn totals(&self) -> ReceiveReport {
        self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(ticks: &[Tick]) -> Vec<Command<u32>> {
        ticks.iter().map(|&t| Command::new(t, Some(t))).collect()
    }

    #[test]
    fn test_in_order_consumption() {
        let mut receiver = CommandReceiver::new(16);
        receiver.receive(commands(&[101, 100, 102]));

        let ticks: Vec<_> = receiver.drain_ready().iter().map(|c| c.tick).collect();
        assert_eq!(ticks, vec![100, 101, 102]);
        assert!(receiver.next_command().is_none());
    }

    #[test]
    fn test_gap_filled_from_previous() {
        let mut receiver = CommandReceiver::new(16);
        receiver.receive(commands(&[100, 101, 103, 104]));

        let applied = receiver.drain_ready();
        let ticks: Vec<_> = applied.iter().map(|c| c.tick).collect();
        assert_eq!(ticks, vec![100, 101, 102, 103, 104]);

        assert_eq!(applied[2].state, CommandState::Predicted);
        assert_eq!(applied[2].input, Some(101));
        assert_eq!(applied[3].state, CommandState::UserCreated);
    }

    #[test]
    fn test_consecutive_gaps_use_last_received() {
        let mut receiver = CommandReceiver::new(16);
        receiver.receive(commands(&[10, 13]));
        let applied = receiver.drain_ready();
        assert_eq!(applied[1].input, Some(10));
        assert_eq!(applied[2].input, Some(10));
        assert_eq!(applied[3].input, Some(13));
    }

    #[test]
    fn test_starved_returns_none() {
        let mut receiver: CommandReceiver<u32> = CommandReceiver::new(16);
        assert!(receiver.next_command().is_none());

        receiver.receive(commands(&[5]));
        assert_eq!(receiver.next_command().map(|c| c.tick), Some(5));
        assert!(receiver.next_command().is_none());
        assert_eq!(receiver.last_consumed(), Some(5));
    }

    #[test]
    fn test_stale_and_duplicates() {
        let mut receiver = CommandReceiver::new(16);
        receiver.receive(commands(&[1, 2]));
        receiver.next_command();

        let report = receiver.receive(vec![
            Command::new(1, Some(0)),
            Command::new(2, Some(222)),
            Command::new(3, Some(3)),
        ]);
        assert_eq!(
            report,
            ReceiveReport {
                accepted: 1,
                duplicates: 1,
                stale: 1,
                dropped: 0
            }
        );

        // The newest duplicate wins
        assert_eq!(receiver.next_command().and_then(|c| c.input), Some(222));
    }

    #[test]
    fn test_backlog_drops_oldest() {
        let mut receiver = CommandReceiver::new(3);
        let report = receiver.receive(commands(&[1, 2, 3, 4, 5]));
        assert_eq!(report.dropped, 2);
        assert_eq!(receiver.backlog(), 3);
        assert_eq!(receiver.next_command().map(|c| c.tick), Some(3));
        assert_eq!(receiver.totals().dropped, 2);
    }

    #[test]
    fn test_backlog_drop_after_consuming_skips_dropped_ticks() {
        let mut receiver = CommandReceiver::new(3);
        receiver.receive(commands(&[1]));
        assert_eq!(receiver.next_command().map(|c| c.tick), Some(1));

        let report = receiver.receive(commands(&[2, 3, 4, 5, 6, 7]));
        assert_eq!(report.dropped, 3);
        assert_eq!(receiver.last_consumed(), Some(4));

        let applied = receiver.drain_ready();
        let consumed: Vec<_> = applied.iter().map(|c| (c.tick, c.input, c.state)).collect();
        assert_eq!(
            consumed,
            vec![
                (5, Some(5), CommandState::UserCreated),
                (6, Some(6), CommandState::UserCreated),
                (7, Some(7), CommandState::UserCreated),
            ]
        );
        assert_eq!(receiver.backlog(), 0);
    }

    #[test]
    fn test_gap_after_backlog_drop_repeats_dropped_input() {
        let mut receiver = CommandReceiver::new(2);
        receiver.receive(commands(&[1]));
        receiver.next_command();

        // 2 is dropped, 3 never arrives
        receiver.receive(commands(&[2, 4, 5]));
        let applied = receiver.drain_ready();
        assert_eq!(applied[0].tick, 3);
        assert_eq!(applied[0].input, Some(2));
        assert_eq!(applied[0].state, CommandState::Predicted);
    }

    #[test]
    fn test_extrapolate_future_does_not_consume() {
        let mut receiver = CommandReceiver::new(16);
        assert!(receiver.extrapolate_future(9).is_none());

        receiver.receive(commands(&[7]));
        receiver.next_command();
        let future = receiver.extrapolate_future(9).unwrap();
        assert_eq!(future.tick, 9);
        assert_eq!(future.input, Some(7));
        assert_eq!(future.state, CommandState::CurrentFuture);
        assert_eq!(receiver.last_consumed(), Some(7));
    }
}
