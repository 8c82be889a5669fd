//! Combined stdout/stderr of a child process as one line stream
//!
//! Each pipe gets its own forwarding task. Lines arrive in the order the
//! tasks read them, so stdout and stderr interleave roughly as the child
//! wrote them. The forwarders keep draining their pipe after the receiving
//! side is gone so a chatty daemon never blocks on a full pipe.
//!
//! Once nobody needs the lines as they arrive, [`OutputStream::into_tail`]
//! keeps only the most recent ones.

use std::collections::VecDeque;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct OutputStream {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl OutputStream {
    /// Take the child's piped stdout/stderr, if any, and start forwarding
    pub fn attach(child: &mut Child) -> Option<Self> {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        if stdout.is_none() && stderr.is_none() {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = stdout {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = stderr {
            tokio::spawn(forward_lines(stderr, tx));
        }
        Some(Self { rx })
    }

    /// Next line without its terminator; `None` once every pipe has closed
    pub async fn next_line(&mut self) -> Option<String> {
        let raw = self.rx.recv().await?;
        let line = String::from_utf8_lossy(&raw);
        Some(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Everything still to come, until every pipe has closed
    pub async fn drain(mut self) -> Vec<u8> {
        let mut collected = Vec::new();
        while let Some(chunk) = self.rx.recv().await {
            collected.extend_from_slice(&chunk);
        }
        collected
    }

    /// Keep consuming in the background, retaining only the last
    /// `capacity` lines
    pub fn into_tail(self, capacity: usize) -> OutputTail {
        let capacity = capacity.max(1);
        let mut rx = self.rx;
        let task = tokio::spawn(async move {
            let mut lines = VecDeque::with_capacity(capacity.min(256));
            while let Some(line) = rx.recv().await {
                if lines.len() == capacity {
                    lines.pop_front();
                }
                lines.push_back(line);
            }
            lines
        });
        OutputTail { task }
    }
}

/// Bounded backlog of a daemon's output, oldest lines dropped first
pub struct OutputTail {
    task: JoinHandle<VecDeque<Vec<u8>>>,
}

impl OutputTail {
    /// The retained lines, once every pipe has closed
    pub async fn collect(self) -> Vec<u8> {
        match self.task.await {
            Ok(lines) => lines.into_iter().flatten().collect(),
            Err(_) => Vec::new(),
        }
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut receiver_open = true;
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if receiver_open && tx.send(line).is_err() {
                    receiver_open = false;
                }
            }
        }
    }
}
