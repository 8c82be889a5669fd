//! Ephemeral Kerberos realms for integration tests
//!
//! A [`Realm`] owns a throwaway directory with its own `krb5.conf`, KDC
//! database, principals, keytab and credential cache, plus the KDC and
//! kadmind processes serving it. Client code under test is pointed at it
//! through [`Realm::env`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), k5realm::RealmError> {
//! use k5realm::{Realm, RealmOptions};
//!
//! let options = RealmOptions::builder().realm("TEST.EXAMPLE").port_base(61500).build()?;
//! let realm = Realm::start(options).await.map_err(|e| e.into_parts().1)?;
//! let tickets = realm.klist(None).await?;
//! println!("{}", String::from_utf8_lossy(&tickets));
//! realm.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Both MIT krb5 and Heimdal toolchains are supported; which one is used is
//! decided once per [`ToolchainContext`] by probing `krb5-config`.

pub mod env;
pub mod error;
pub mod process;
pub mod provider;
pub mod realm;
pub mod traits;

pub use env::Environment;
pub use error::{RealmError, RealmResult};
pub use process::{DaemonHandle, DaemonLaunch, DaemonSupervisor, Invocation, ProcessRunner, Readiness};
pub use provider::{AdminQuery, PathOverrides, Provider, ProviderKind, Tool, ToolPaths, ToolchainContext};
pub use realm::{BringUpError, Realm, RealmLayout, RealmOptions, RealmOptionsBuilder};
pub use traits::CommandRunner;

pub use shared::{DaemonRole, PortBlock, ProfileValue, Section};
