//! Trait seams with mockall annotations for testing
//!
//! Realm bring-up talks to one-shot commands only through [`CommandRunner`],
//! so the order and shape of the admin commands can be checked without a
//! Kerberos installation.

use crate::env::Environment;
use crate::error::RealmResult;
use crate::process::Invocation;

/// One-shot command execution
#[mockall::automock]
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `invocation` to completion under `env`
    ///
    /// # Returns
    /// The combined stdout/stderr bytes, or `CommandFailed` when the exit
    /// code differs from the invocation's expected code
    async fn run(&self, invocation: &Invocation, env: &Environment) -> RealmResult<Vec<u8>>;
}
