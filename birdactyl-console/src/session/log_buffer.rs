//! Bounded console log
//!
//! Lines are kept in arrival order; once the buffer is full the oldest line
//! is evicted for every new one.

use std::collections::VecDeque;

/// Default number of lines kept in memory
pub const DEFAULT_CAPACITY: usize = 1000;

/// Display color for error lines
pub const ERROR_COLOR: &str = "#ef4444";

/// Prefix marking a locally echoed command
pub const ECHO_PREFIX: &str = "> ";

/// Where a console line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOrigin {
    /// Output of the server process
    Server,
    /// Generated by the panel daemon or by this client
    System,
    /// Local echo of a submitted command
    Echo,
}

/// One display line of the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Local clock label (HH:MM:SS)
    pub time: String,
    pub text: String,
    pub color: Option<String>,
    pub origin: LogOrigin,
}

impl LogLine {
    pub fn new(text: impl Into<String>, color: Option<String>, origin: LogOrigin) -> Self {
        Self {
            time: clock_label(),
            text: text.into(),
            color,
            origin,
        }
    }

    pub fn server(text: impl Into<String>, color: Option<String>) -> Self {
        Self::new(text, color, LogOrigin::Server)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(text, None, LogOrigin::System)
    }

    /// `[ERROR] <reason>` in the error color
    pub fn error(reason: impl AsRef<str>) -> Self {
        Self::new(
            format!("[ERROR] {}", reason.as_ref()),
            Some(ERROR_COLOR.to_string()),
            LogOrigin::System,
        )
    }

    pub fn echo(command: &str) -> Self {
        Self::new(format!("{}{}", ECHO_PREFIX, command), None, LogOrigin::Echo)
    }
}

fn clock_label() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Ring buffer of console lines
#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<LogLine>,
    capacity: usize,
    /// Lines ever appended, including evicted ones
    appended: u64,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` lines (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            appended: 0,
        }
    }

    /// Append a line, evicting the oldest one if the buffer is full
    pub fn append(&mut self, line: LogLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.appended += 1;
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.appended = 0;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lines oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LogLine> + ExactSizeIterator {
        self.lines.iter()
    }

    pub fn last(&self) -> Option<&LogLine> {
        self.lines.back()
    }

    /// Monotonic append count; survives eviction but not `clear`
    pub fn total_appended(&self) -> u64 {
        self.appended
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
