//! Bounded command history

use crate::commands::Command;
use std::collections::VecDeque;

/// Commands kept when no capacity is configured
pub const DEFAULT_CAPACITY: usize = 50;

/// FIFO history; inserting past capacity evicts the oldest entry
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<Command>,
    capacity: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CommandHistory {
    /// A capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, command: Command) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(command);
    }

    /// The most recent `limit` commands, oldest first
    pub fn recent(&self, limit: usize) -> Vec<Command> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
