//! Error types for faultline.
//!
//! Module-level errors (class-file parsing, synthesis, attach, config) are
//! `thiserror` enums living next to their code. They converge on [`Error`]
//! when they cross a crate or process boundary, which gives every failure:
//! - A stable numeric code for machine parsing
//! - A category for grouping
//! - A recoverability hint and a remediation line for operators
//!
//! # Operator-Facing Output
//!
//! ```text
//! ✗ Process Not Found
//!   Reason: process 4242 not found
//!   Fix: Check the pid with 'jps -l' or 'pgrep java' and retry.
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Agent options and configuration.
    Config,
    /// Malformed or unsupported class files.
    ClassFormat,
    /// Exception synthesis at injected call sites.
    Runtime,
    /// Attaching to a target process.
    Attach,
    /// Agent lifecycle inside the target.
    Agent,
    /// File and socket I/O.
    Io,
    /// Platform compatibility.
    Platform,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::ClassFormat => write!(f, "class_format"),
            ErrorCategory::Runtime => write!(f, "runtime"),
            ErrorCategory::Attach => write!(f, "attach"),
            ErrorCategory::Agent => write!(f, "agent"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Platform => write!(f, "platform"),
        }
    }
}

/// Unified error type for faultline.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid agent options: {0}")]
    InvalidOptions(String),

    // Class format errors (20-29)
    #[error("cannot transform {class}: {message}")]
    ClassFormat { class: String, message: String },

    // Runtime errors (30-39)
    #[error("exception synthesis failed: {0}")]
    Synthesis(String),

    // Attach errors (40-49)
    #[error("attach failed: {0}")]
    Attach(String),

    #[error("process {pid} not found")]
    ProcessNotFound { pid: u32 },

    #[error("permission denied attaching to process {pid}")]
    PermissionDenied { pid: u32 },

    #[error("target did not answer within {seconds}s")]
    AttachTimeout { seconds: u64 },

    #[error("attach protocol mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    // Agent lifecycle errors (50-59)
    #[error("agent already active in this process")]
    AlreadyActive,

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Platform errors (70-79)
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Class format errors
    /// - 30-39: Runtime errors
    /// - 40-49: Attach errors
    /// - 50-59: Agent lifecycle errors
    /// - 60-69: I/O errors
    /// - 70-79: Platform errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidOptions(_) => 11,
            Error::ClassFormat { .. } => 20,
            Error::Synthesis(_) => 30,
            Error::Attach(_) => 40,
            Error::ProcessNotFound { .. } => 41,
            Error::PermissionDenied { .. } => 42,
            Error::AttachTimeout { .. } => 43,
            Error::VersionMismatch { .. } => 44,
            Error::AlreadyActive => 50,
            Error::Io(_) => 60,
            Error::UnsupportedPlatform(_) => 70,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidOptions(_) => ErrorCategory::Config,

            Error::ClassFormat { .. } => ErrorCategory::ClassFormat,

            Error::Synthesis(_) => ErrorCategory::Runtime,

            Error::Attach(_)
            | Error::ProcessNotFound { .. }
            | Error::PermissionDenied { .. }
            | Error::AttachTimeout { .. }
            | Error::VersionMismatch { .. } => ErrorCategory::Attach,

            Error::AlreadyActive => ErrorCategory::Agent,

            Error::Io(_) => ErrorCategory::Io,

            Error::UnsupportedPlatform(_) => ErrorCategory::Platform,
        }
    }

    /// Returns whether retrying (possibly after fixing input) can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) | Error::InvalidOptions(_) => true,

            // The same bytes will fail the same way on every load.
            Error::ClassFormat { .. } => false,

            Error::Synthesis(_) => false,

            Error::Attach(_) => true,
            Error::ProcessNotFound { .. } => false,
            Error::PermissionDenied { .. } => true,
            Error::AttachTimeout { .. } => true,
            Error::VersionMismatch { .. } => false,

            Error::AlreadyActive => false,

            Error::Io(_) => true,

            Error::UnsupportedPlatform(_) => false,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::InvalidOptions(_) => {
                "Check the option string: a bare probability like '0.75', or 'prob=0.75,ceiling=1,deny=com/acme/'."
            }
            Error::ClassFormat { .. } => {
                "The class was loaded unmodified. Add its package to the deny-list if this repeats."
            }
            Error::Synthesis(_) => {
                "A generic RuntimeException was thrown instead. Check that the exception type is public and concrete."
            }
            Error::Attach(_) => "Retry the attach. Check that the target is a HotSpot-based JVM.",
            Error::ProcessNotFound { .. } => {
                "Check the pid with 'jps -l' or 'pgrep java' and retry."
            }
            Error::PermissionDenied { .. } => {
                "Attach as the same user that owns the target process."
            }
            Error::AttachTimeout { .. } => {
                "The target did not start its attach listener. Check -XX:+DisableAttachMechanism and retry."
            }
            Error::VersionMismatch { .. } => {
                "The target speaks a different attach protocol version. Use a matching JDK."
            }
            Error::AlreadyActive => "The agent was already activated in this process; nothing to do.",
            Error::Io(_) => "Check permissions and free space, then retry.",
            Error::UnsupportedPlatform(_) => "Dynamic attach is only supported on Linux.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidOptions(_) => "Invalid Agent Options",
            Error::ClassFormat { .. } => "Class Format Error",
            Error::Synthesis(_) => "Exception Synthesis Failed",
            Error::Attach(_) => "Attach Failed",
            Error::ProcessNotFound { .. } => "Process Not Found",
            Error::PermissionDenied { .. } => "Permission Denied",
            Error::AttachTimeout { .. } => "Attach Timeout",
            Error::VersionMismatch { .. } => "Attach Protocol Mismatch",
            Error::AlreadyActive => "Agent Already Active",
            Error::Io(_) => "I/O Error",
            Error::UnsupportedPlatform(_) => "Unsupported Platform",
        }
    }

    /// Format the headline/reason/fix block shown to operators.
    pub fn to_human(&self) -> String {
        format!(
            "✗ {}\n  Reason: {}\n  Fix: {}",
            self.headline(),
            self,
            self.remediation()
        )
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., pid, class name).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::ProcessNotFound { pid } | Error::PermissionDenied { pid } => {
                context.insert("pid".to_string(), serde_json::json!(pid));
            }
            Error::ClassFormat { class, .. } => {
                context.insert("class".to_string(), serde_json::json!(class));
            }
            Error::AttachTimeout { seconds } => {
                context.insert("timeout_seconds".to_string(), serde_json::json!(seconds));
            }
            Error::VersionMismatch { expected, actual } => {
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("actual".to_string(), serde_json::json!(actual));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_fall_in_category_ranges() {
        let cases: Vec<(Error, ErrorCategory)> = vec![
            (Error::Config("x".into()), ErrorCategory::Config),
            (
                Error::ClassFormat {
                    class: "a/B".into(),
                    message: "bad magic".into(),
                },
                ErrorCategory::ClassFormat,
            ),
            (Error::Synthesis("x".into()), ErrorCategory::Runtime),
            (Error::ProcessNotFound { pid: 1 }, ErrorCategory::Attach),
            (Error::AlreadyActive, ErrorCategory::Agent),
            (
                Error::Io(std::io::Error::other("disk")),
                ErrorCategory::Io,
            ),
        ];
        for (err, category) in cases {
            assert_eq!(err.category(), category, "{err}");
            let base = match category {
                ErrorCategory::Config => 10,
                ErrorCategory::ClassFormat => 20,
                ErrorCategory::Runtime => 30,
                ErrorCategory::Attach => 40,
                ErrorCategory::Agent => 50,
                ErrorCategory::Io => 60,
                ErrorCategory::Platform => 70,
            };
            assert!((base..base + 10).contains(&err.code()), "{err}");
        }
    }

    #[test]
    fn every_variant_has_its_own_code() {
        let all = [
            Error::Config("x".into()),
            Error::InvalidOptions("x".into()),
            Error::ClassFormat {
                class: "a/B".into(),
                message: "x".into(),
            },
            Error::Synthesis("x".into()),
            Error::Attach("x".into()),
            Error::ProcessNotFound { pid: 1 },
            Error::PermissionDenied { pid: 1 },
            Error::AttachTimeout { seconds: 1 },
            Error::VersionMismatch {
                expected: "0".into(),
                actual: "x".into(),
            },
            Error::AlreadyActive,
            Error::Io(std::io::Error::other("x")),
            Error::UnsupportedPlatform("x".into()),
        ];
        let codes: std::collections::HashSet<u32> = all.iter().map(Error::code).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn structured_error_carries_pid_context() {
        let err = Error::ProcessNotFound { pid: 4242 };
        let structured = StructuredError::from(&err);
        assert_eq!(structured.code, 41);
        assert!(!structured.recoverable);
        assert_eq!(structured.context["pid"], serde_json::json!(4242));
        assert!(structured.to_json().contains("\"category\":\"attach\""));
    }

    #[test]
    fn human_output_has_reason_and_fix() {
        let text = Error::AttachTimeout { seconds: 10 }.to_human();
        assert!(text.starts_with("✗ Attach Timeout"));
        assert!(text.contains("Reason: target did not answer within 10s"));
        assert!(text.contains("Fix: "));
    }
}
