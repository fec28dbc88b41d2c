//! Per-tick input records

use serde::{Deserialize, Serialize};
use tickwise_core::Tick;

/// Where a command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandState {
    /// Not produced yet
    #[default]
    Unset,
    /// Produced by the owning peer for this tick
    UserCreated,
    /// Filled in by the authority from the nearest earlier command
    Predicted,
    /// A user command being run again during a replay
    ReplayedUserCreated,
    /// Guess for a tick the authority has not reached yet
    CurrentFuture,
}

impl CommandState {
    /// The input was actually produced by the owner
    pub fn is_user_created(self) -> bool {
        matches!(self, CommandState::UserCreated | CommandState::ReplayedUserCreated)
    }

    /// The input is a guess rather than the owner's real input
    pub fn is_predicted(self) -> bool {
        matches!(self, CommandState::Predicted | CommandState::CurrentFuture)
    }

    /// The command is being re-simulated
    pub fn is_replayed(self) -> bool {
        self == CommandState::ReplayedUserCreated
    }
}

/// Input of one entity for one tick
///
/// `input` is `None` when the owner had nothing to send for the tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command<I> {
    /// Tick the input was produced for
    pub tick: Tick,
    /// Input payload
    pub input: Option<I>,
    /// Origin tag
    pub state: CommandState,
}

impl<I> Command<I> {
    /// A user-created command
    pub fn new(tick: Tick, input: Option<I>) -> Self {
        Self {
            tick,
            input,
            state: CommandState::UserCreated,
        }
    }

    /// A user-created command carrying no input
    pub fn empty(tick: Tick) -> Self {
        Self::new(tick, None)
    }

    /// Whether a payload is present
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    /// Same command with a different origin tag
    pub fn with_state(mut self, state: CommandState) -> Self {
        self.state = state;
        self
    }
}

impl<I: Clone> Command<I> {
    /// Copy this command's input onto another tick
    pub fn extrapolate(&self, tick: Tick, state: CommandState) -> Self {
        Self {
            tick,
            input: self.input.clone(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_helpers() {
        assert!(CommandState::UserCreated.is_user_created());
        assert!(CommandState::ReplayedUserCreated.is_user_created());
        assert!(CommandState::ReplayedUserCreated.is_replayed());
        assert!(CommandState::Predicted.is_predicted());
        assert!(CommandState::CurrentFuture.is_predicted());
        assert!(!CommandState::Unset.is_user_created());
        assert!(!CommandState::Unset.is_predicted());
    }

    #[test]
    fn test_extrapolate_keeps_input() {
        let command = Command::new(101, Some(7u8));
        let filled = command.extrapolate(102, CommandState::Predicted);
        assert_eq!(filled.tick, 102);
        assert_eq!(filled.input, Some(7));
        assert_eq!(filled.state, CommandState::Predicted);
    }

    #[test]
    fn test_empty_command() {
        let command: Command<u8> = Command::empty(5);
        assert!(!command.has_input());
        assert_eq!(command.state, CommandState::UserCreated);
    }
}
