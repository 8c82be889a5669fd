//! Long-running daemon supervision
//!
//! Spawns a daemon, waits for it to become ready, and later terminates it
//! (SIGTERM, then SIGKILL after a grace period) and drains what it printed.

use std::process::Stdio;
use std::time::Duration;

use shared::DaemonRole;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::readiness::{wait_for_marker, LineSource, LogTail};
use super::{command_line, exit_code, OutputStream, OutputTail, Readiness};
use crate::env::Environment;
use crate::error::{RealmError, RealmResult};

pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Output lines kept per running daemon for the stop-time log
const OUTPUT_BACKLOG: usize = 1000;

/// Everything needed to start one daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonLaunch {
    pub argv: Vec<String>,
    pub readiness: Readiness,
}

impl DaemonLaunch {
    pub fn new<I, S>(argv: I, readiness: Readiness) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            readiness,
        }
    }

    pub fn command_line(&self) -> String {
        command_line(&self.argv)
    }
}

/// A running daemon, until [`DaemonSupervisor::stop`] confirms its exit
pub struct DaemonHandle {
    role: DaemonRole,
    command: String,
    child: Child,
    output: Option<OutputTail>,
}

impl std::fmt::Debug for DaemonHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonHandle")
            .field("role", &self.role)
            .field("command", &self.command)
            .field("pid", &self.child.id())
            .finish()
    }
}

impl DaemonHandle {
    pub fn role(&self) -> DaemonRole {
        self.role
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// OS process id, `None` once the process has been reaped
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Ask the daemon to terminate without waiting for it
    pub fn terminate(&mut self) -> RealmResult<()> {
        send_terminate(&mut self.child)
    }
}

#[derive(Debug, Clone)]
pub struct DaemonSupervisor {
    readiness_timeout: Duration,
    stop_grace: Duration,
}

impl Default for DaemonSupervisor {
    fn default() -> Self {
        Self {
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

impl DaemonSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readiness_timeout(mut self, readiness_timeout: Duration) -> Self {
        self.readiness_timeout = readiness_timeout;
        self
    }

    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    pub fn readiness_timeout(&self) -> Duration {
        self.readiness_timeout
    }

    /// Spawn the daemon and wait until it reports readiness
    ///
    /// On any failure the child is killed and no handle is returned.
    pub async fn start(
        &self,
        role: DaemonRole,
        launch: &DaemonLaunch,
        env: &Environment,
    ) -> RealmResult<DaemonHandle> {
        let command = launch.command_line();
        let Some((program, args)) = launch.argv.split_first() else {
            return Err(RealmError::invalid_option("argv", "empty command"));
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        env.apply(&mut cmd);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        if launch.readiness.needs_output() {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let log_tail = match &launch.readiness {
            Readiness::LogMarker { path, .. } => Some(LogTail::create(path).await?),
            _ => None,
        };

        debug!(role = %role, command = %command, "Spawning daemon");
        let mut child = cmd.spawn().map_err(|source| RealmError::SpawnFailed {
            command: command.clone(),
            source,
        })?;
        let mut output = OutputStream::attach(&mut child);

        let source = match (&launch.readiness, log_tail) {
            (Readiness::OutputMarker(marker), _) => output
                .as_mut()
                .map(|stream| (LineSource::Stream(stream), marker.as_str())),
            (Readiness::LogMarker { marker, .. }, Some(tail)) => {
                Some((LineSource::LogTail(tail), marker.as_str()))
            }
            _ => None,
        };

        if let Some((source, marker)) = source {
            let waited = timeout(
                self.readiness_timeout,
                wait_for_marker(source, &mut child, marker, &command),
            )
            .await;

            let failure = match waited {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some(RealmError::ReadinessTimeout {
                    command: command.clone(),
                    timeout: self.readiness_timeout,
                }),
            };
            if let Some(e) = failure {
                warn!(role = %role, command = %command, error = %e, "Daemon failed to start");
                let _ = child.kill().await;
                return Err(e);
            }
        }

        info!(role = %role, pid = ?child.id(), "Daemon started: {}", command);
        Ok(DaemonHandle {
            role,
            command,
            child,
            output: output.map(|stream| stream.into_tail(OUTPUT_BACKLOG)),
        })
    }

    /// Terminate the daemon, wait for it and log its remaining output
    ///
    /// Returns the daemon's exit code. On error the handle still refers to
    /// the daemon and `stop` may be called again.
    pub async fn stop(&self, handle: &mut DaemonHandle) -> RealmResult<i32> {
        send_terminate(&mut handle.child)?;

        let status = match timeout(self.stop_grace, handle.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    role = %handle.role,
                    grace = ?self.stop_grace,
                    "Daemon ignored SIGTERM, using SIGKILL"
                );
                handle.child.kill().await?;
                handle.child.wait().await?
            }
        };
        let code = exit_code(status);

        if let Some(output) = handle.output.take() {
            // A grandchild holding the pipe open must not stall teardown
            let rest = timeout(self.stop_grace, output.collect()).await.unwrap_or_default();
            if !rest.is_empty() {
                debug!(
                    role = %handle.role,
                    "[OUTPUT FROM `{}`]\n{}",
                    handle.command,
                    String::from_utf8_lossy(&rest)
                );
            }
        }

        info!(role = %handle.role, code = code, "Daemon stopped");
        Ok(code)
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> RealmResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> RealmResult<()> {
    child.start_kill().map_err(RealmError::from)
}
