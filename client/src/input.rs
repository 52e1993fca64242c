//! Buffer of inputs sent but not yet covered by an authoritative snapshot.

use std::collections::VecDeque;

use codec::{InputCommand, Tick};

/// Unacknowledged inputs in send order.
///
/// An input is acknowledged implicitly: once a snapshot at tick `T` is
/// applied, every input stamped `<= T` is already part of it.
#[derive(Debug, Clone)]
pub struct InputHistory {
    commands: VecDeque<InputCommand>,
    capacity: usize,
}

impl InputHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            commands: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Appends `command`; returns the oldest input if it had to be dropped.
    pub fn push(&mut self, command: InputCommand) -> Option<InputCommand> {
        self.commands.push_back(command);
        if self.commands.len() > self.capacity {
            self.commands.pop_front()
        } else {
            None
        }
    }

    /// Drops every input stamped at or before `tick`. Returns how many.
    pub fn acknowledge(&mut self, tick: Tick) -> usize {
        let before = self.commands.len();
        self.commands.retain(|command| command.tick > tick);
        before - self.commands.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputCommand> + '_ {
        self.commands.iter()
    }

    /// Sequence numbers still pending, oldest first.
    pub fn sequences(&self) -> impl Iterator<Item = u32> + '_ {
        self.commands.iter().map(|command| command.sequence)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(sequence: u32, tick: u32) -> InputCommand {
        InputCommand {
            sequence,
            tick: Tick::new(tick),
            action: vec![1],
        }
    }

    #[test]
    fn acknowledge_keeps_only_later_ticks() {
        let mut history = InputHistory::new(8);
        for (sequence, tick) in [(5, 10), (6, 11), (7, 12)] {
            assert!(history.push(command(sequence, tick)).is_none());
        }
        assert_eq!(history.acknowledge(Tick::new(11)), 2);
        assert_eq!(history.sequences().collect::<Vec<_>>(), vec![7]);
        assert_eq!(history.acknowledge(Tick::new(11)), 0);
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut history = InputHistory::new(2);
        history.push(command(1, 1));
        history.push(command(2, 2));
        let dropped = history.push(command(3, 3)).unwrap();
        assert_eq!(dropped.sequence, 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let mut history = InputHistory::new(0);
        assert!(history.push(command(1, 1)).is_none());
        assert_eq!(history.push(command(2, 2)).map(|c| c.sequence), Some(1));
    }
}
