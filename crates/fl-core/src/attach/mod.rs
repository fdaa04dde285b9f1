//! Loading the agent into a running process.
//!
//! The controller side of dynamic activation: find the target's attach
//! listener (starting it if necessary), ask it to load the agent payload with
//! the option string, and report what the target answered.

mod hotspot;
pub mod shutdown;

pub use hotspot::{encode_request, parse_ns_pid, parse_reply, HotSpotAttacher};

use fl_common::ProcessId;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("process {pid} not found")]
    ProcessNotFound { pid: ProcessId },

    #[error("permission denied attaching to process {pid}")]
    PermissionDenied { pid: ProcessId },

    #[error("process {pid} did not start its attach listener within {seconds}s")]
    Timeout { pid: ProcessId, seconds: u64 },

    #[error("unexpected attach reply {reply:?}")]
    VersionMismatch { reply: String },

    #[error("agent load failed with code {code}: {message}")]
    LoadFailed { code: i32, message: String },

    #[error("agent payload not found: {}", .0.display())]
    AgentMissing(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("dynamic attach is not supported on this platform")]
    UnsupportedPlatform,
}

impl AttachError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        AttachError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<AttachError> for fl_common::Error {
    fn from(err: AttachError) -> Self {
        match err {
            AttachError::ProcessNotFound { pid } => fl_common::Error::ProcessNotFound { pid: pid.0 },
            AttachError::PermissionDenied { pid } => {
                fl_common::Error::PermissionDenied { pid: pid.0 }
            }
            AttachError::Timeout { seconds, .. } => fl_common::Error::AttachTimeout { seconds },
            AttachError::VersionMismatch { reply } => fl_common::Error::VersionMismatch {
                expected: "numeric attach reply".to_string(),
                actual: reply,
            },
            AttachError::Io { source, .. } => fl_common::Error::Io(source),
            AttachError::UnsupportedPlatform => {
                fl_common::Error::UnsupportedPlatform(std::env::consts::OS.to_string())
            }
            other => fl_common::Error::Attach(other.to_string()),
        }
    }
}

/// What gets loaded into the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentPayload {
    /// A Java agent archive, loaded through the target's `instrument` library.
    JavaAgentJar(PathBuf),
    /// A native agent library, loaded by absolute path.
    NativeLibrary(PathBuf),
}

impl AgentPayload {
    /// Classify by extension: `.jar` is a Java agent, anything else native.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_jar = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"));
        if is_jar {
            AgentPayload::JavaAgentJar(path)
        } else {
            AgentPayload::NativeLibrary(path)
        }
    }

    /// Resolve to an absolute path, failing if the file does not exist.
    pub fn canonicalize(self) -> Result<Self, AttachError> {
        let resolve = |p: &Path| std::fs::canonicalize(p).map_err(|_| AttachError::AgentMissing(p.to_path_buf()));
        Ok(match &self {
            AgentPayload::JavaAgentJar(p) => AgentPayload::JavaAgentJar(resolve(p)?),
            AgentPayload::NativeLibrary(p) => AgentPayload::NativeLibrary(resolve(p)?),
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            AgentPayload::JavaAgentJar(p) | AgentPayload::NativeLibrary(p) => p,
        }
    }

    /// The three arguments of the listener's `load` command.
    pub fn load_args(&self, options: &str) -> [String; 3] {
        match self {
            AgentPayload::JavaAgentJar(jar) => {
                let mut arg = jar.display().to_string();
                if !options.is_empty() {
                    arg.push('=');
                    arg.push_str(options);
                }
                ["instrument".to_string(), "false".to_string(), arg]
            }
            AgentPayload::NativeLibrary(lib) => [
                lib.display().to_string(),
                "true".to_string(),
                options.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachOptions {
    /// How long to wait for the listener to appear and to answer.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Directory holding the listener socket. Defaults to the target's `/tmp`.
    pub tmp_dir: Option<PathBuf>,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            tmp_dir: None,
        }
    }
}

/// What the target said after a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachReply {
    pub code: i32,
    /// Everything after the status line, trimmed.
    pub output: String,
}

/// Something that can load an agent into a process.
pub trait AgentLoader {
    fn load(
        &self,
        pid: ProcessId,
        payload: &AgentPayload,
        options: &str,
    ) -> Result<AttachReply, AttachError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jar_payload_goes_through_instrument() {
        let payload = AgentPayload::from_path("/opt/fl/faultline-agent.JAR");
        assert!(matches!(payload, AgentPayload::JavaAgentJar(_)));
        assert_eq!(
            payload.load_args("0.5"),
            [
                "instrument".to_string(),
                "false".to_string(),
                "/opt/fl/faultline-agent.JAR=0.5".to_string()
            ]
        );
        assert_eq!(payload.load_args("")[2], "/opt/fl/faultline-agent.JAR");
    }

    #[test]
    fn native_payload_is_loaded_by_absolute_path() {
        let payload = AgentPayload::from_path("/opt/fl/libfaultline.so");
        assert_eq!(
            payload.load_args("prob=0.1"),
            [
                "/opt/fl/libfaultline.so".to_string(),
                "true".to_string(),
                "prob=0.1".to_string()
            ]
        );
    }

    #[test]
    fn missing_payload_is_reported() {
        let err = AgentPayload::from_path("/definitely/not/here.jar")
            .canonicalize()
            .unwrap_err();
        assert!(matches!(err, AttachError::AgentMissing(_)));
    }

    #[test]
    fn errors_convert_to_common_codes() {
        let err: fl_common::Error = AttachError::ProcessNotFound { pid: ProcessId(7) }.into();
        assert_eq!(err.code(), 41);
        let err: fl_common::Error = AttachError::LoadFailed {
            code: 102,
            message: "boom".into(),
        }
        .into();
        assert_eq!(err.code(), 40);
    }
}
