//! Per-build log capture.
//!
//! The engine writes into a [`LogSink`] for the duration of one build. The
//! sink appends to a shared [`LogBuffer`], which the log bridge drains
//! incrementally.

use std::sync::{Arc, Mutex, PoisonError};

/// Append-only text buffer with a drain cursor.
#[derive(Debug, Default)]
pub struct LogBuffer {
    text: String,
    drained: usize,
}

impl LogBuffer {
    pub fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Text appended since the previous drain, or `None` if nothing is new.
    pub fn drain_new(&mut self) -> Option<String> {
        if self.drained >= self.text.len() {
            return None;
        }
        let delta = self.text[self.drained..].to_string();
        self.drained = self.text.len();
        Some(delta)
    }

    pub fn contents(&self) -> &str {
        &self.text
    }
}

/// Cloneable write handle to one build's log buffer.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    buffer: Arc<Mutex<LogBuffer>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line; a trailing newline is added if missing.
    pub fn line(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        let mut buffer = self.lock();
        buffer.append(line);
        if !line.ends_with('\n') {
            buffer.append("\n");
        }
    }

    /// Append raw text as-is.
    pub fn write(&self, text: impl AsRef<str>) {
        self.lock().append(text.as_ref());
    }

    pub fn drain_new(&self) -> Option<String> {
        self.lock().drain_new()
    }

    /// Everything written so far, drained or not.
    pub fn snapshot(&self) -> String {
        self.lock().contents().to_string()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
