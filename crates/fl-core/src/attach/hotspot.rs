//! The HotSpot attach protocol over a Unix domain socket.
//!
//! A HotSpot VM opens its attach listener lazily. The client drops an
//! `.attach_pid<pid>` file where the VM will look for it and sends `SIGQUIT`;
//! the VM then creates `<tmp>/.java_pid<pid>`. Requests are NUL-separated:
//! protocol version `1`, the command, and exactly three arguments. The reply
//! is a status line followed by command output.

use super::{AgentLoader, AgentPayload, AttachError, AttachOptions, AttachReply};
use fl_common::ProcessId;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

const PROTOCOL_VERSION: &str = "1";
const ARG_COUNT: usize = 3;

/// Encode one attach request.
pub fn encode_request(command: &str, args: &[String]) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    for part in [PROTOCOL_VERSION, command] {
        out.extend_from_slice(part.as_bytes());
        out.push(0);
    }
    for i in 0..ARG_COUNT {
        if let Some(arg) = args.get(i) {
            out.extend_from_slice(arg.as_bytes());
        }
        out.push(0);
    }
    out
}

/// Parse a `load` reply.
///
/// The first line is the listener's status. For `load` the target then
/// reports the agent's own result, as `return code: N` on current VMs or a
/// bare `N` on older ones.
pub fn parse_reply(reply: &str) -> Result<AttachReply, AttachError> {
    let mut lines = reply.lines();
    let status_line = lines.next().unwrap_or("").trim();
    let status: i32 = status_line
        .parse()
        .map_err(|_| AttachError::VersionMismatch {
            reply: status_line.to_string(),
        })?;
    let rest: Vec<&str> = lines.collect();
    let output = rest.join("\n").trim().to_string();
    if status != 0 {
        return Err(AttachError::LoadFailed {
            code: status,
            message: output,
        });
    }

    let agent_code = rest.first().and_then(|line| {
        let line = line.trim();
        line.strip_prefix("return code:")
            .unwrap_or(line)
            .trim()
            .parse::<i32>()
            .ok()
    });
    match agent_code {
        Some(code) if code != 0 => Err(AttachError::LoadFailed {
            code,
            message: rest[1..].join("\n").trim().to_string(),
        }),
        _ => Ok(AttachReply { code: 0, output }),
    }
}

/// Innermost namespace pid from `/proc/<pid>/status` content.
pub fn parse_ns_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("NSpid:"))
        .and_then(|pids| pids.split_whitespace().last())
        .and_then(|pid| pid.parse().ok())
}

#[derive(Debug, Clone, Default)]
pub struct HotSpotAttacher {
    options: AttachOptions,
}

impl HotSpotAttacher {
    pub fn new(options: AttachOptions) -> Self {
        Self { options }
    }

    fn tmp_dir(&self, pid: ProcessId) -> PathBuf {
        if let Some(dir) = &self.options.tmp_dir {
            return dir.clone();
        }
        // The target may live in another mount namespace (containers).
        let root_tmp = PathBuf::from(format!("/proc/{pid}/root/tmp"));
        if root_tmp.is_dir() {
            root_tmp
        } else {
            PathBuf::from("/tmp")
        }
    }
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::fs::{self, File};
    use std::io::{Read, Write};
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::net::UnixStream;

    pub(super) fn namespace_pid(pid: ProcessId) -> u32 {
        fs::read_to_string(format!("/proc/{pid}/status"))
            .ok()
            .and_then(|s| parse_ns_pid(&s))
            .unwrap_or(pid.0)
    }

    pub(super) fn signal(pid: ProcessId, signal: i32) -> Result<(), AttachError> {
        // SAFETY: kill has no memory-safety preconditions.
        let result = unsafe { libc::kill(pid.0 as libc::pid_t, signal) };
        if result == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Err(AttachError::ProcessNotFound { pid }),
            Some(libc::EPERM) => Err(AttachError::PermissionDenied { pid }),
            _ => Err(AttachError::io(format!("signal {signal} to {pid}"), err)),
        }
    }

    pub(super) fn is_socket(path: &Path) -> bool {
        fs::metadata(path).is_ok_and(|m| m.file_type().is_socket())
    }

    impl HotSpotAttacher {
        /// Create the trigger file, wake the VM, and wait for the socket.
        pub(super) fn start_listener(
            &self,
            pid: ProcessId,
            ns_pid: u32,
            socket: &Path,
        ) -> Result<(), AttachError> {
            let trigger_name = format!(".attach_pid{ns_pid}");
            let candidates = [
                PathBuf::from(format!("/proc/{pid}/cwd")).join(&trigger_name),
                self.tmp_dir(pid).join(&trigger_name),
            ];
            let mut last_err = None;
            let trigger = candidates.into_iter().find(|path| match File::create(path) {
                Ok(_) => true,
                Err(e) => {
                    last_err = Some(e);
                    false
                }
            });
            let Some(trigger) = trigger else {
                let err = last_err.unwrap_or_else(|| std::io::Error::other("no location"));
                return Err(match err.kind() {
                    std::io::ErrorKind::PermissionDenied => AttachError::PermissionDenied { pid },
                    _ => AttachError::io("create attach trigger file", err),
                });
            };
            debug!(trigger = %trigger.display(), "created attach trigger");

            let result = signal(pid, libc::SIGQUIT).and_then(|()| self.wait_for_socket(pid, socket));
            let _ = fs::remove_file(&trigger);
            result
        }

        fn wait_for_socket(&self, pid: ProcessId, socket: &Path) -> Result<(), AttachError> {
            let deadline = Instant::now() + self.options.timeout;
            while Instant::now() < deadline {
                if is_socket(socket) {
                    return Ok(());
                }
                std::thread::sleep(self.options.poll_interval);
            }
            Err(AttachError::Timeout {
                pid,
                seconds: self.options.timeout.as_secs(),
            })
        }

        pub(super) fn send(
            &self,
            pid: ProcessId,
            socket: &Path,
            request: &[u8],
        ) -> Result<String, AttachError> {
            let mut stream = UnixStream::connect(socket).map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => AttachError::PermissionDenied { pid },
                _ => AttachError::io(format!("connect {}", socket.display()), e),
            })?;
            stream
                .set_read_timeout(Some(self.options.timeout))
                .map_err(|e| AttachError::io("set socket timeout", e))?;
            stream
                .write_all(request)
                .map_err(|e| AttachError::io("send attach request", e))?;

            let mut reply = String::new();
            stream.read_to_string(&mut reply).map_err(|e| match e.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                    AttachError::Timeout {
                        pid,
                        seconds: self.options.timeout.as_secs(),
                    }
                }
                _ => AttachError::io("read attach reply", e),
            })?;
            Ok(reply)
        }
    }
}

#[cfg(unix)]
impl AgentLoader for HotSpotAttacher {
    fn load(
        &self,
        pid: ProcessId,
        payload: &AgentPayload,
        options: &str,
    ) -> Result<AttachReply, AttachError> {
        unix::signal(pid, 0)?;
        let ns_pid = unix::namespace_pid(pid);
        let socket = self.tmp_dir(pid).join(format!(".java_pid{ns_pid}"));

        if !unix::is_socket(&socket) {
            info!(pid = %pid, "starting attach listener");
            self.start_listener(pid, ns_pid, &socket)?;
        }

        let request = encode_request("load", &payload.load_args(options));
        debug!(socket = %socket.display(), payload = %payload.path().display(), "sending load");
        let reply = self.send(pid, &socket, &request)?;
        parse_reply(&reply)
    }
}

#[cfg(not(unix))]
impl AgentLoader for HotSpotAttacher {
    fn load(&self, _: ProcessId, _: &AgentPayload, _: &str) -> Result<AttachReply, AttachError> {
        Err(AttachError::UnsupportedPlatform)
    }
}
