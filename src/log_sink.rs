//! User-facing activity log shown in the log pane.
//!
//! Lines are timestamped with microsecond resolution and kept in call order.
//! Every line is mirrored to the `log` facade.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveTime};

/// Default number of lines retained before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 2000;

/// Format a log line body for `message` at `time`.
///
/// Empty messages (and a lone newline) become a bare line break.
pub fn format_line(time: NaiveTime, message: &str) -> String {
    if message.is_empty() || message == "\n" {
        "\n".to_string()
    } else {
        format!("[{}]: {}\n", time.format("%H:%M:%S%.6f"), message)
    }
}

#[derive(Debug)]
struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    /// Lines scrolled up from the newest; zero means following the tail.
    scroll_back: usize,
    /// Bumped on every append so renderers can detect changes.
    revision: u64,
}

/// Append-only, shareable log surface.
#[derive(Debug, Clone)]
pub struct LogSink {
    inner: Arc<Mutex<LogBuffer>>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogBuffer {
                lines: VecDeque::new(),
                capacity: capacity.max(1),
                scroll_back: 0,
                revision: 0,
            })),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, LogBuffer> {
        // A panic while holding the lock cannot leave the buffer half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `message` with the current local time.
    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        if !message.is_empty() && message != "\n" {
            log::info!("{}", message);
        }
        self.append(format_line(Local::now().time(), message));
    }

    /// Append an error line, distinguishable from progress output.
    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::error!("{}", message);
        self.append(format_line(
            Local::now().time(),
            &format!("ERROR: {}", message),
        ));
    }

    fn append(&self, line: String) {
        let mut buf = self.buffer();
        if buf.lines.len() == buf.capacity {
            buf.lines.pop_front();
        }
        buf.lines.push_back(line);
        buf.scroll_back = 0;
        buf.revision += 1;
    }

    /// Concatenated log text, as a text box would show it.
    pub fn text(&self) -> String {
        self.buffer().lines.iter().map(String::as_str).collect()
    }

    /// Snapshot of all retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.buffer().lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().lines.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.buffer().revision
    }

    /// Scroll towards older lines.
    pub fn scroll_up(&self, amount: usize) {
        let mut buf = self.buffer();
        let max = buf.lines.len().saturating_sub(1);
        buf.scroll_back = (buf.scroll_back + amount).min(max);
    }

    /// Scroll towards the newest line.
    pub fn scroll_down(&self, amount: usize) {
        let mut buf = self.buffer();
        buf.scroll_back = buf.scroll_back.saturating_sub(amount);
    }

    pub fn scroll_back(&self) -> usize {
        self.buffer().scroll_back
    }

    /// The `height` lines that should be visible given the scroll position.
    pub fn visible(&self, height: usize) -> Vec<String> {
        let buf = self.buffer();
        let end = buf.lines.len().saturating_sub(buf.scroll_back);
        let start = end.saturating_sub(height);
        buf.lines.range(start..end).cloned().collect()
    }
}
