//! Submitted command history with arrow-key navigation

use std::collections::VecDeque;

/// Maximum number of commands remembered
pub const HISTORY_LIMIT: usize = 50;

/// Direction of a history step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    /// Towards earlier commands (arrow up)
    Older,
    /// Back towards the empty prompt (arrow down)
    Newer,
}

/// Most-recent-first command stack with a cursor
///
/// The cursor is `-1` when no entry is selected and otherwise an index into
/// the stack; it always stays within `[-1, len - 1]`.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    cursor: isize,
    limit: usize,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: -1,
            limit: limit.max(1),
        }
    }

    /// Remember a submitted command and reset the cursor
    pub fn push(&mut self, command: impl Into<String>) {
        self.entries.push_front(command.into());
        self.entries.truncate(self.limit);
        self.cursor = -1;
    }

    /// Move the cursor one step and return the selected command
    ///
    /// Returns an empty string when the cursor lands on "none".
    pub fn navigate(&mut self, direction: HistoryDirection) -> String {
        let last = self.entries.len() as isize - 1;
        self.cursor = match direction {
            HistoryDirection::Older => (self.cursor + 1).min(last),
            HistoryDirection::Newer => (self.cursor - 1).max(-1),
        };
        self.current().unwrap_or_default().to_string()
    }

    /// Command under the cursor, if any
    pub fn current(&self) -> Option<&str> {
        if self.cursor < 0 {
            None
        } else {
            self.entries.get(self.cursor as usize).map(String::as_str)
        }
    }

    pub fn cursor(&self) -> isize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries most recent first
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}
