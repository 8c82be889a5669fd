//! Shared error types for the realm fixture workspace

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("value at key '{key}' is {found}, expected {expected}")]
    ConfigType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown placeholder '${name}' in '{template}'")]
    UnknownPlaceholder { name: String, template: String },

    #[error("invalid placeholder at byte {position} in '{template}'")]
    InvalidPlaceholder { position: usize, template: String },

    #[error("profile parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
