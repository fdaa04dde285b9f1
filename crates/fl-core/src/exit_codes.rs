//! Exit codes for the fl-attach controller.
//!
//! Exit code ranges:
//! - 0-6: Operational outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors

use crate::attach::AttachError;

/// Exit codes for fl-attach. Stable contract for scripts driving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean run
    Clean = 0,

    /// Attached, then stopped by SIGINT/SIGTERM
    Interrupted = 6,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments or agent options
    ArgsError = 10,

    /// Permission denied on the target
    PermissionError = 12,

    /// Target speaks a different attach protocol
    VersionError = 13,

    /// Target process does not exist
    ProcessNotFound = 17,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Agent load rejected by the target, or a bug
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// Target did not answer in time
    TimeoutError = 22,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes below 10 are outcomes, not failures.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Error code name (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::Interrupted => "OK_INTERRUPTED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::PermissionError => "ERR_PERMISSION",
            ExitCode::VersionError => "ERR_VERSION",
            ExitCode::ProcessNotFound => "ERR_NO_PROCESS",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
        }
    }
}

impl From<&AttachError> for ExitCode {
    fn from(err: &AttachError) -> Self {
        match err {
            AttachError::ProcessNotFound { .. } => ExitCode::ProcessNotFound,
            AttachError::PermissionDenied { .. } => ExitCode::PermissionError,
            AttachError::Timeout { .. } => ExitCode::TimeoutError,
            AttachError::VersionMismatch { .. } => ExitCode::VersionError,
            AttachError::AgentMissing(_) => ExitCode::ArgsError,
            AttachError::Io { .. } => ExitCode::IoError,
            AttachError::LoadFailed { .. } | AttachError::UnsupportedPlatform => {
                ExitCode::InternalError
            }
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fl_common::ProcessId;

    #[test]
    fn ranges() {
        assert!(ExitCode::Interrupted.is_operational());
        assert!(ExitCode::ArgsError.is_user_error());
        assert!(ExitCode::TimeoutError.is_internal_error());
        assert_eq!(ExitCode::ProcessNotFound.to_string(), "ERR_NO_PROCESS (17)");
    }

    #[test]
    fn attach_errors_map_to_codes() {
        let pid = ProcessId(42);
        assert_eq!(
            ExitCode::from(&AttachError::ProcessNotFound { pid }),
            ExitCode::ProcessNotFound
        );
        assert_eq!(
            ExitCode::from(&AttachError::PermissionDenied { pid }),
            ExitCode::PermissionError
        );
        assert_eq!(
            ExitCode::from(&AttachError::Timeout { pid, seconds: 10 }),
            ExitCode::TimeoutError
        );
    }
}
