//! Daemon readiness detection
//!
//! A daemon is ready once a marker string shows up either on its combined
//! output or in a log file it writes. Both sources feed the same detector;
//! the caller bounds the whole wait with a timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Child;
use tracing::debug;

use super::{exit_code, OutputStream};
use crate::error::{RealmError, RealmResult};

const LOG_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How to tell that a freshly spawned daemon is ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Ready as soon as it is spawned; output is discarded
    None,
    /// Ready once a line of combined stdout/stderr contains the marker
    OutputMarker(String),
    /// Ready once the log file contains the marker; the file is truncated
    /// before the daemon is spawned and output is discarded
    LogMarker { path: PathBuf, marker: String },
}

impl Readiness {
    pub fn output<S: Into<String>>(marker: S) -> Self {
        Readiness::OutputMarker(marker.into())
    }

    pub fn log<P: Into<PathBuf>, S: Into<String>>(path: P, marker: S) -> Self {
        Readiness::LogMarker {
            path: path.into(),
            marker: marker.into(),
        }
    }

    /// Whether the daemon's stdout/stderr must be piped
    pub fn needs_output(&self) -> bool {
        matches!(self, Readiness::OutputMarker(_))
    }
}

/// Follows a log file from its start, noticing when the writer has exited
pub(crate) struct LogTail {
    reader: BufReader<File>,
    pending: Vec<u8>,
    writer_exited: bool,
}

impl LogTail {
    /// Truncate (or create) the log and open it for reading from the start
    pub(crate) async fn create(path: &Path) -> RealmResult<Self> {
        File::create(path)
            .await
            .map_err(|e| RealmError::file_system("truncate log", path, e))?;
        let file = File::open(path)
            .await
            .map_err(|e| RealmError::file_system("open log", path, e))?;
        Ok(Self {
            reader: BufReader::new(file),
            pending: Vec::new(),
            writer_exited: false,
        })
    }

    async fn next_line(&mut self, child: &mut Child) -> RealmResult<Option<String>> {
        loop {
            if self.writer_exited {
                // Everything left was read in one go when the exit was seen
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(take_line(&mut self.pending)));
            }

            let read = self.reader.read_until(b'\n', &mut self.pending).await?;
            if read > 0 && self.pending.ends_with(b"\n") {
                return Ok(Some(take_line(&mut self.pending)));
            }
            if read == 0 {
                if child.try_wait()?.is_some() {
                    self.reader.read_to_end(&mut self.pending).await?;
                    self.writer_exited = true;
                    continue;
                }
                tokio::time::sleep(LOG_POLL_INTERVAL).await;
            }
        }
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    let raw = std::mem::take(buf);
    String::from_utf8_lossy(&raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

/// Where readiness lines come from
pub(crate) enum LineSource<'a> {
    Stream(&'a mut OutputStream),
    LogTail(LogTail),
}

impl LineSource<'_> {
    async fn next_line(&mut self, child: &mut Child) -> RealmResult<Option<String>> {
        match self {
            LineSource::Stream(stream) => Ok(stream.next_line().await),
            LineSource::LogTail(tail) => tail.next_line(child).await,
        }
    }
}

/// Read lines until one contains `marker`
///
/// When the source runs dry first, the daemon is waited for and its exit
/// code reported as `DaemonStartFailed`.
pub(crate) async fn wait_for_marker(
    mut source: LineSource<'_>,
    child: &mut Child,
    marker: &str,
    command: &str,
) -> RealmResult<()> {
    loop {
        match source.next_line(child).await? {
            Some(line) => {
                debug!(command = %command, "[OUTPUT FROM `{}`] {}", command, line);
                if line.contains(marker) {
                    return Ok(());
                }
            }
            None => {
                let status = child.wait().await?;
                return Err(RealmError::DaemonStartFailed {
                    command: command.to_string(),
                    code: Some(exit_code(status)),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn_sh(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_log_tail_sees_marker_written_later() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("kdc.log");
        let tail = LogTail::create(&log).await.unwrap();

        let script = format!("sleep 0.2; echo 'KDC started' >> {}; sleep 5", log.display());
        let mut child = spawn_sh(&script);

        wait_for_marker(LineSource::LogTail(tail), &mut child, "KDC started", "kdc")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_log_tail_reports_early_exit() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("kdc.log");
        let tail = LogTail::create(&log).await.unwrap();

        let script = format!("echo 'no database' >> {}; exit 4", log.display());
        let mut child = spawn_sh(&script);

        let err = wait_for_marker(LineSource::LogTail(tail), &mut child, "KDC started", "kdc")
            .await
            .unwrap_err();
        assert!(matches!(err, RealmError::DaemonStartFailed { code: Some(4), .. }));
    }

    #[tokio::test]
    async fn test_log_is_truncated_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("kdc.log");
        std::fs::write(&log, "KDC started\n").unwrap();

        let tail = LogTail::create(&log).await.unwrap();
        let mut child = spawn_sh("exit 0");

        let err = wait_for_marker(LineSource::LogTail(tail), &mut child, "KDC started", "kdc")
            .await
            .unwrap_err();
        assert!(matches!(err, RealmError::DaemonStartFailed { code: Some(0), .. }));
    }
}
