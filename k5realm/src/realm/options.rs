//! Realm construction options and their builder

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shared::{PortBlock, Section};

use crate::error::{RealmError, RealmResult};
use crate::process::supervisor::{DEFAULT_READINESS_TIMEOUT, DEFAULT_STOP_GRACE};
use crate::provider::{PathOverrides, ProviderKind, ToolchainContext};

pub const DEFAULT_REALM: &str = "KRBTEST.COM";
pub const DEFAULT_PORT_BASE: u16 = 61000;

/// What a realm should look like and how much of it to bring up
#[derive(Debug, Clone)]
pub struct RealmOptions {
    pub realm: String,
    pub port_base: u16,
    /// Deep-merged over the provider's `krb5.conf` skeleton
    pub krb5_conf: Option<Section>,
    /// Deep-merged over the provider's `kdc.conf` skeleton, if any
    pub kdc_conf: Option<Section>,
    pub create_kdb: bool,
    pub krbtgt_keysalt: Option<String>,
    pub create_user: bool,
    pub create_host: bool,
    pub start_kdc: bool,
    pub start_kadmind: bool,
    pub get_creds: bool,
    /// Attach to this directory instead of provisioning a new one
    pub existing: Option<PathBuf>,
    pub tool_paths: PathOverrides,
    pub hostname: Option<String>,
    /// Skip the toolchain probe and use this dialect
    pub provider: Option<ProviderKind>,
    pub readiness_timeout: Duration,
    pub stop_grace: Duration,
    /// Shared probe results; a private context is used when unset
    pub toolchain: Option<Arc<ToolchainContext>>,
}

impl Default for RealmOptions {
    fn default() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
            port_base: DEFAULT_PORT_BASE,
            krb5_conf: None,
            kdc_conf: None,
            create_kdb: true,
            krbtgt_keysalt: None,
            create_user: true,
            create_host: true,
            start_kdc: true,
            start_kadmind: false,
            get_creds: true,
            existing: None,
            tool_paths: PathOverrides::new(),
            hostname: None,
            provider: None,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            toolchain: None,
        }
    }
}

impl RealmOptions {
    pub fn builder() -> RealmOptionsBuilder {
        RealmOptionsBuilder::new()
    }

    pub fn ports(&self) -> PortBlock {
        PortBlock::new(self.port_base)
    }

    pub fn validate(&self) -> RealmResult<()> {
        if self.realm.is_empty() || self.realm.chars().any(char::is_whitespace) {
            return Err(RealmError::invalid_option(
                "realm",
                format!("`{}` is not a usable realm name", self.realm),
            ));
        }
        let highest = u16::MAX - (PortBlock::SIZE - 1);
        if self.port_base == 0 || self.port_base > highest {
            return Err(RealmError::invalid_option(
                "port_base",
                format!("{} must be between 1 and {highest}", self.port_base),
            ));
        }
        if self.readiness_timeout.is_zero() {
            return Err(RealmError::invalid_option("readiness_timeout", "must be non-zero"));
        }
        if let Some(hostname) = &self.hostname {
            if hostname.is_empty() {
                return Err(RealmError::invalid_option("hostname", "must not be empty"));
            }
        }
        Ok(())
    }
}

/// Fluent construction of [`RealmOptions`]
pub struct RealmOptionsBuilder {
    options: RealmOptions,
}

impl RealmOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: RealmOptions::default(),
        }
    }

    pub fn realm<S: Into<String>>(mut self, realm: S) -> Self {
        self.options.realm = realm.into();
        self
    }

    pub fn port_base(mut self, port_base: u16) -> Self {
        self.options.port_base = port_base;
        self
    }

    pub fn krb5_conf(mut self, overrides: Section) -> Self {
        self.options.krb5_conf = Some(overrides);
        self
    }

    pub fn kdc_conf(mut self, overrides: Section) -> Self {
        self.options.kdc_conf = Some(overrides);
        self
    }

    pub fn create_kdb(mut self, enabled: bool) -> Self {
        self.options.create_kdb = enabled;
        self
    }

    /// Rekey the TGS principal with this keysalt list after creating the KDB
    pub fn krbtgt_keysalt<S: Into<String>>(mut self, keysalt: S) -> Self {
        self.options.krbtgt_keysalt = Some(keysalt.into());
        self
    }

    pub fn create_user(mut self, enabled: bool) -> Self {
        self.options.create_user = enabled;
        self
    }

    pub fn create_host(mut self, enabled: bool) -> Self {
        self.options.create_host = enabled;
        self
    }

    pub fn start_kdc(mut self, enabled: bool) -> Self {
        self.options.start_kdc = enabled;
        self
    }

    pub fn start_kadmind(mut self, enabled: bool) -> Self {
        self.options.start_kadmind = enabled;
        self
    }

    pub fn get_creds(mut self, enabled: bool) -> Self {
        self.options.get_creds = enabled;
        self
    }

    pub fn existing<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.options.existing = Some(dir.into());
        self
    }

    /// Override one executable, keyed by its name (`kadmin.local`, `krb5kdc`, ...)
    pub fn tool_path<N: Into<String>, P: Into<PathBuf>>(mut self, name: N, path: P) -> Self {
        self.options.tool_paths.insert(name, path);
        self
    }

    pub fn tool_paths(mut self, overrides: PathOverrides) -> Self {
        self.options.tool_paths.extend(overrides);
        self
    }

    pub fn hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.options.hostname = Some(hostname.into());
        self
    }

    pub fn provider(mut self, kind: ProviderKind) -> Self {
        self.options.provider = Some(kind);
        self
    }

    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.options.readiness_timeout = timeout;
        self
    }

    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.options.stop_grace = grace;
        self
    }

    pub fn toolchain(mut self, ctx: Arc<ToolchainContext>) -> Self {
        self.options.toolchain = Some(ctx);
        self
    }

    /// Validate and build the options
    pub fn build(self) -> RealmResult<RealmOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

impl Default for RealmOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
