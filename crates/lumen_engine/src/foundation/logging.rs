//! Logging initialization and the in-memory console log
//!
//! All engine code logs through the `log` facade. [`init`] installs an
//! `env_logger` sink wrapped by [`ConsoleTee`], which also copies every accepted
//! record into a bounded [`ConsoleBuffer`] that the in-engine console displays.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use log::{debug, error, info, trace, warn};

/// Lines kept by a console buffer created with [`ConsoleBuffer::default`]
pub const DEFAULT_CONSOLE_CAPACITY: usize = 512;

/// One record captured for the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    /// Severity of the record
    pub level: log::Level,
    /// Module path or custom target of the record
    pub target: String,
    /// Formatted message
    pub message: String,
}

/// Shared ring of recent log lines
///
/// Clones share the same storage. The oldest line is dropped once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct ConsoleBuffer {
    lines: Arc<Mutex<VecDeque<ConsoleLine>>>,
    capacity: usize,
}

impl ConsoleBuffer {
    /// Create a buffer holding at most `capacity` lines
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Append a line, evicting the oldest one when full
    pub fn push(&self, line: ConsoleLine) {
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the buffered lines, oldest first
    pub fn snapshot(&self) -> Vec<ConsoleLine> {
        self.lock().iter().cloned().collect()
    }

    /// Number of buffered lines
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no line is buffered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every buffered line
    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panic while holding the lock cannot leave the deque in a broken state
    fn lock(&self) -> MutexGuard<'_, VecDeque<ConsoleLine>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}

/// `log` sink that forwards to `env_logger` and copies records to a [`ConsoleBuffer`]
pub struct ConsoleTee {
    inner: env_logger::Logger,
    console: ConsoleBuffer,
}

impl ConsoleTee {
    /// Wrap an `env_logger` instance
    pub const fn new(inner: env_logger::Logger, console: ConsoleBuffer) -> Self {
        Self { inner, console }
    }
}

impl log::Log for ConsoleTee {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.inner.matches(record) {
            return;
        }
        self.console.push(ConsoleLine {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize the logging system
///
/// The filter comes from `RUST_LOG` and defaults to `info`. `colored` selects whether
/// terminal output uses ANSI colors. Returns the console buffer receiving every
/// accepted record. Calling this again after a logger is installed only returns a
/// fresh, unattached buffer.
pub fn init(colored: bool) -> ConsoleBuffer {
    init_with_capacity(colored, DEFAULT_CONSOLE_CAPACITY)
}

/// [`init`] with an explicit console capacity
pub fn init_with_capacity(colored: bool, capacity: usize) -> ConsoleBuffer {
    let console = ConsoleBuffer::new(capacity);
    let style = if colored {
        env_logger::WriteStyle::Auto
    } else {
        env_logger::WriteStyle::Never
    };
    let inner = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(style)
        .build();
    let max_level = inner.filter();

    if log::set_boxed_logger(Box::new(ConsoleTee::new(inner, console.clone()))).is_ok() {
        log::set_max_level(max_level);
    }
    console
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(message: &str) -> ConsoleLine {
        ConsoleLine {
            level: log::Level::Info,
            target: "test".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_buffer_evicts_oldest() {
        let buffer = ConsoleBuffer::new(2);
        buffer.push(line("one"));
        buffer.push(line("two"));
        buffer.push(line("three"));
        let messages: Vec<_> = buffer.snapshot().into_iter().map(|l| l.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[test]
    fn test_clones_share_storage() {
        let buffer = ConsoleBuffer::new(8);
        let view = buffer.clone();
        buffer.push(line("shared"));
        assert_eq!(view.len(), 1);
        view.clear();
        assert!(buffer.is_empty());
    }
}
