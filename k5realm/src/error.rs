//! Realm-specific error types

use std::path::PathBuf;
use std::time::Duration;

use shared::{DaemonRole, SharedError};
use thiserror::Error;

use crate::provider::ProviderKind;

#[derive(Error, Debug)]
pub enum RealmError {
    #[error("Configuration error: {0}")]
    Config(#[from] SharedError),

    #[error("Invalid option {field}: {message}")]
    InvalidOption { field: &'static str, message: String },

    #[error("Unexpected return code for command `{command}`: {code}")]
    CommandFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed to start with code {}", code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    DaemonStartFailed { command: String, code: Option<i32> },

    #[error("`{command}` did not report readiness within {timeout:?}")]
    ReadinessTimeout { command: String, timeout: Duration },

    #[error("{role} has already started")]
    AlreadyStarted { role: DaemonRole },

    #[error("{role} is not running")]
    NotRunning { role: DaemonRole },

    #[error("{operation} is not supported by the {provider} provider")]
    Unsupported {
        provider: ProviderKind,
        operation: &'static str,
    },

    #[error("File system operation failed: {operation} on {path}: {source}")]
    FileSystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(unix)]
    #[error("Signal delivery failed: {0}")]
    Signal(#[from] nix::errno::Errno),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RealmError {
    pub fn file_system(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RealmError::FileSystem {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn invalid_option(field: &'static str, message: impl Into<String>) -> Self {
        RealmError::InvalidOption {
            field,
            message: message.into(),
        }
    }
}

pub type RealmResult<T> = Result<T, RealmError>;
