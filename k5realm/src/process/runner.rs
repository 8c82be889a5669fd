//! One-shot command execution

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{command_line, exit_code, OutputStream};
use crate::env::Environment;
use crate::error::{RealmError, RealmResult};
use crate::traits::CommandRunner;

/// A command to run once: argument vector, optional stdin and the exit code
/// that counts as success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub input: Option<String>,
    pub expected_code: i32,
}

impl Invocation {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            input: None,
            expected_code: 0,
        }
    }

    /// Text written to stdin before it is closed
    pub fn with_input<S: Into<String>>(mut self, input: S) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn expect_code(mut self, code: i32) -> Self {
        self.expected_code = code;
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn command_line(&self) -> String {
        command_line(&self.argv)
    }
}

/// Runs invocations as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation, env: &Environment) -> RealmResult<Vec<u8>> {
        let command = invocation.command_line();
        let Some((program, args)) = invocation.argv.split_first() else {
            return Err(RealmError::invalid_option("argv", "empty command"));
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        env.apply(&mut cmd);
        cmd.stdin(if invocation.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| RealmError::SpawnFailed {
            command: command.clone(),
            source,
        })?;
        let output = OutputStream::attach(&mut child);

        if let (Some(input), Some(mut stdin)) = (invocation.input.as_ref(), child.stdin.take()) {
            // A child that exits without reading stdin is judged by its exit code
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(command = %command, error = %e, "stdin was not consumed");
            }
            drop(stdin);
        }

        let collected = match output {
            Some(stream) => stream.drain().await,
            None => Vec::new(),
        };
        let status = child.wait().await?;
        let code = exit_code(status);

        debug!(
            command = %command,
            code = code,
            "[OUTPUT FROM `{}`]\n{}",
            command,
            String::from_utf8_lossy(&collected)
        );

        if code != invocation.expected_code {
            return Err(RealmError::CommandFailed {
                command,
                code,
                output: String::from_utf8_lossy(&collected).into_owned(),
            });
        }
        Ok(collected)
    }
}
