//! Best-effort append-only debug log.
//!
//! One line per event: `<epoch-millis> <message>\n`. Each line is written
//! with a single `write_all` on a file opened in append mode, so concurrent
//! writers from different threads never interleave within a line. Failures
//! are reported through `tracing` and otherwise ignored.

use chrono::Utc;
use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugLog {
    path: Option<PathBuf>,
}

impl DebugLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A log that drops everything.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one line. Returns whether it was written.
    pub fn record(&self, message: impl Display) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        let line = format_line(Utc::now().timestamp_millis(), &message);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "debug log write failed");
                false
            }
        }
    }
}

/// Embedded newlines are flattened so every event stays on one line.
pub fn format_line(epoch_millis: i64, message: &dyn Display) -> String {
    let message = message.to_string().replace(['\n', '\r'], " ");
    format!("{epoch_millis} {message}\n")
}
