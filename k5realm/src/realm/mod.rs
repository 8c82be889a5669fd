//! Realm lifecycle
//!
//! [`Realm::start`] provisions a working directory, writes the profiles,
//! creates the database and principals, starts the daemons and fetches
//! initial credentials, in that order. A failure part-way through hands the
//! partially built realm back inside [`BringUpError`] so it can still be
//! stopped. [`Realm::stop`] consumes the realm.

pub(crate) mod files;
pub mod layout;
pub mod options;

pub use layout::RealmLayout;
pub use options::{RealmOptions, RealmOptionsBuilder, DEFAULT_PORT_BASE, DEFAULT_REALM};

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shared::logging::{log_shutdown, log_startup};
use shared::{realm_debug, realm_error, realm_info, realm_warn, DaemonRole, PortBlock, Section};

use crate::env::Environment;
use crate::error::{RealmError, RealmResult};
use crate::process::{DaemonHandle, DaemonLaunch, DaemonSupervisor, Invocation, ProcessRunner};
use crate::provider::{AdminQuery, Provider, ProviderKind, ToolchainContext};
use crate::traits::CommandRunner;

const TMPDIR_PREFIX: &str = "tmp";
const TMPDIR_SUFFIX: &str = "-krbtest";

/// A construction failure, carrying the partially built realm when there
/// is one
#[derive(Debug, thiserror::Error)]
#[error("realm bring-up failed: {source}")]
pub struct BringUpError {
    realm: Option<Box<Realm>>,
    #[source]
    source: RealmError,
}

impl BringUpError {
    fn without_realm(source: RealmError) -> Self {
        Self { realm: None, source }
    }

    pub fn realm(&self) -> Option<&Realm> {
        self.realm.as_deref()
    }

    pub fn error(&self) -> &RealmError {
        &self.source
    }

    pub fn into_parts(self) -> (Option<Realm>, RealmError) {
        (self.realm.map(|r| *r), self.source)
    }

    /// Stop whatever was brought up and return the original error
    pub async fn cleanup(self) -> RealmError {
        let (realm, source) = self.into_parts();
        if let Some(realm) = realm {
            let name = realm.realm().to_string();
            if let Err(e) = realm.stop().await {
                realm_warn!(name, error = %e, "Teardown after failed bring-up was incomplete");
            }
        }
        source
    }
}

/// One ephemeral Kerberos realm
pub struct Realm {
    layout: RealmLayout,
    provider: Provider,
    env: Environment,
    is_existing: bool,
    runner: Arc<dyn CommandRunner>,
    supervisor: DaemonSupervisor,
    toolchain: Arc<ToolchainContext>,
    kdc: Option<DaemonHandle>,
    kadmind: Option<DaemonHandle>,
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("realm", &self.layout.realm())
            .field("tmpdir", &self.layout.tmpdir())
            .field("provider", &self.provider.kind())
            .field("is_existing", &self.is_existing)
            .field("kdc", &self.kdc)
            .field("kadmind", &self.kadmind)
            .finish()
    }
}

impl Realm {
    /// Build and bring up a realm with real child processes
    pub async fn start(options: RealmOptions) -> Result<Realm, BringUpError> {
        Self::start_with_runner(options, Arc::new(ProcessRunner::new())).await
    }

    /// Build and bring up a realm, running one-shot commands through `runner`
    pub async fn start_with_runner(
        options: RealmOptions,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Realm, BringUpError> {
        options.validate().map_err(BringUpError::without_realm)?;
        let mut realm = Self::provision(&options, runner)
            .await
            .map_err(BringUpError::without_realm)?;

        match realm.bring_up(&options).await {
            Ok(()) => {
                realm_info!(realm.layout.realm(), tmpdir = %realm.layout.tmpdir().display(), "Realm is up");
                Ok(realm)
            }
            Err(source) => {
                realm_error!(realm.layout.realm(), error = %source, "Realm bring-up failed");
                Err(BringUpError {
                    realm: Some(Box::new(realm)),
                    source,
                })
            }
        }
    }

    /// Select the provider and claim the working directory
    async fn provision(options: &RealmOptions, runner: Arc<dyn CommandRunner>) -> RealmResult<Self> {
        let toolchain = options
            .toolchain
            .clone()
            .unwrap_or_else(|| Arc::new(ToolchainContext::new()));
        let provider = Provider::select(&toolchain, &options.tool_paths, options.provider).await;

        let (tmpdir, is_existing) = match &options.existing {
            Some(dir) => (dir.clone(), true),
            None => (create_tmpdir()?, false),
        };
        let hostname = match &options.hostname {
            Some(hostname) => hostname.clone(),
            None => tokio::task::spawn_blocking(default_hostname)
                .await
                .unwrap_or_else(|_| "localhost".to_string()),
        };
        let layout = RealmLayout::new(options.realm.clone(), tmpdir, hostname, options.ports());

        let has_kdc_conf = if is_existing {
            layout.kdc_conf().exists()
        } else {
            provider.kdc_conf_skeleton().is_some() || options.kdc_conf.is_some()
        };
        let kdc_conf = layout.kdc_conf();
        let env = layout.environment(&layout.krb5_conf(), has_kdc_conf.then_some(kdc_conf.as_path()));

        log_startup(
            layout.realm(),
            &format!("{} realm in {}", provider.kind(), layout.tmpdir().display()),
        );

        Ok(Self {
            layout,
            provider,
            env,
            is_existing,
            runner,
            supervisor: DaemonSupervisor::new()
                .with_readiness_timeout(options.readiness_timeout)
                .with_stop_grace(options.stop_grace),
            toolchain,
            kdc: None,
            kadmind: None,
        })
    }

    async fn bring_up(&mut self, options: &RealmOptions) -> RealmResult<()> {
        let create_kdb = options.create_kdb;

        if !self.is_existing {
            self.write_configs(options).await?;

            if create_kdb {
                self.create_kdb().await?;
            }
            if let (Some(keysalt), true) = (options.krbtgt_keysalt.as_deref(), create_kdb) {
                let krbtgt = self.layout.krbtgt_princ();
                self.change_password(&krbtgt, None, Some(keysalt)).await?;
            }
            if options.create_user && create_kdb {
                let (user, admin) = (self.layout.user_princ(), self.layout.admin_princ());
                self.add_principal(&user, Some(&self.password("user"))).await?;
                self.add_principal(&admin, Some(&self.password("admin"))).await?;
            }
            if options.create_host && create_kdb {
                let host = self.layout.host_princ();
                self.add_principal(&host, None).await?;
                self.extract_keytab(&host, &self.layout.keytab()).await?;
            }
            if options.start_kdc && create_kdb {
                self.start_kdc(&[], None).await?;
            }
            if options.start_kadmind && create_kdb {
                self.start_kadmind(None).await?;
            }
        }

        let provisioned_user = create_kdb && options.create_user && options.start_kdc;
        if options.get_creds && (provisioned_user || self.is_existing) {
            let user = self.layout.user_princ();
            self.kinit(&user, Some(&self.password("user")), &[]).await?;
            self.klist(None).await?;
        }
        Ok(())
    }

    async fn write_configs(&self, options: &RealmOptions) -> RealmResult<()> {
        let krb5_skeleton = self.provider.krb5_conf_skeleton();
        files::write_profile(
            &self.layout.krb5_conf(),
            Some(&krb5_skeleton),
            options.krb5_conf.as_ref(),
            &self.layout,
        )
        .await?;

        let kdc_skeleton = self.provider.kdc_conf_skeleton();
        files::write_profile(
            &self.layout.kdc_conf(),
            kdc_skeleton.as_ref(),
            options.kdc_conf.as_ref(),
            &self.layout,
        )
        .await?;

        files::write_acl(&self.layout).await?;
        files::write_dictfile(&self.layout).await?;
        realm_debug!(self.layout.realm(), "Wrote configuration files");
        Ok(())
    }

    pub fn realm(&self) -> &str {
        self.layout.realm()
    }

    pub fn layout(&self) -> &RealmLayout {
        &self.layout
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn toolchain(&self) -> &Arc<ToolchainContext> {
        &self.toolchain
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn tmpdir(&self) -> &Path {
        self.layout.tmpdir()
    }

    pub fn hostname(&self) -> &str {
        self.layout.hostname()
    }

    pub fn ports(&self) -> PortBlock {
        self.layout.ports()
    }

    pub fn is_existing(&self) -> bool {
        self.is_existing
    }

    pub fn user_princ(&self) -> String {
        self.layout.user_princ()
    }

    pub fn admin_princ(&self) -> String {
        self.layout.admin_princ()
    }

    pub fn host_princ(&self) -> String {
        self.layout.host_princ()
    }

    pub fn nfs_princ(&self) -> String {
        self.layout.nfs_princ()
    }

    pub fn krbtgt_princ(&self) -> String {
        self.layout.krbtgt_princ()
    }

    pub fn keytab(&self) -> PathBuf {
        self.layout.keytab()
    }

    pub fn client_keytab(&self) -> PathBuf {
        self.layout.client_keytab()
    }

    pub fn ccache(&self) -> PathBuf {
        self.layout.ccache()
    }

    pub fn kadmin_ccache(&self) -> PathBuf {
        self.layout.kadmin_ccache()
    }

    pub fn kprop_port(&self) -> u16 {
        self.layout.kprop_port()
    }

    pub fn server_port(&self) -> u16 {
        self.layout.server_port()
    }

    /// Weak, per-realm password for `name`
    pub fn password(&self, name: &str) -> String {
        self.layout.password(name)
    }

    pub fn is_running(&self, role: DaemonRole) -> bool {
        self.slot(role).is_some()
    }

    /// Write `krb5.conf.<name>` (and `kdc.conf.<name>`) and return an
    /// environment that points at them
    ///
    /// The realm's own environment is left as it is.
    pub async fn special_env(
        &self,
        name: &str,
        include_kdc_conf: bool,
        krb5_overrides: Option<&Section>,
        kdc_overrides: Option<&Section>,
    ) -> RealmResult<Environment> {
        let krb5_conf = self.layout.path(&format!("krb5.conf.{name}"));
        let krb5_skeleton = self.provider.krb5_conf_skeleton();
        files::write_profile(&krb5_conf, Some(&krb5_skeleton), krb5_overrides, &self.layout).await?;

        let kdc_conf = match self.provider.kdc_conf_skeleton() {
            Some(skeleton) if include_kdc_conf => {
                let path = self.layout.path(&format!("kdc.conf.{name}"));
                files::write_profile(&path, Some(&skeleton), kdc_overrides, &self.layout).await?;
                Some(path)
            }
            _ => None,
        };
        Ok(self.layout.environment(&krb5_conf, kdc_conf.as_deref()))
    }

    /// Run a one-shot command with the realm environment
    pub async fn run(&self, invocation: &Invocation) -> RealmResult<Vec<u8>> {
        self.run_with_env(invocation, &self.env).await
    }

    pub async fn run_with_env(&self, invocation: &Invocation, env: &Environment) -> RealmResult<Vec<u8>> {
        realm_debug!(self.layout.realm(), "Running `{}`", invocation.command_line());
        self.runner.run(invocation, env).await
    }

    pub async fn create_kdb(&self) -> RealmResult<()> {
        for invocation in self.provider.create_kdb(&self.layout)? {
            self.run(&invocation).await?;
        }
        realm_info!(self.layout.realm(), "Created KDB");
        Ok(())
    }

    /// Add `name` with `password`, or with a random key when `None`
    pub async fn add_principal(&self, name: &str, password: Option<&str>) -> RealmResult<()> {
        let invocation = self.provider.add_principal(&self.layout, name, password)?;
        self.run(&invocation).await?;
        Ok(())
    }

    pub async fn change_password(
        &self,
        name: &str,
        password: Option<&str>,
        keysalt: Option<&str>,
    ) -> RealmResult<()> {
        let invocation = self.provider.change_password(&self.layout, name, password, keysalt)?;
        self.run(&invocation).await?;
        Ok(())
    }

    pub async fn extract_keytab(&self, name: &str, keytab: &Path) -> RealmResult<()> {
        let invocation = self.provider.extract_keytab(&self.layout, name, keytab)?;
        self.run(&invocation).await?;
        Ok(())
    }

    /// Obtain initial credentials; the password goes through stdin
    pub async fn kinit(&self, name: &str, password: Option<&str>, flags: &[String]) -> RealmResult<Vec<u8>> {
        self.kinit_with_env(name, password, flags, &self.env).await
    }

    pub async fn kinit_with_env(
        &self,
        name: &str,
        password: Option<&str>,
        flags: &[String],
        env: &Environment,
    ) -> RealmResult<Vec<u8>> {
        let invocation = self.provider.kinit(name, password, flags, true)?;
        self.run_with_env(&invocation, env).await
    }

    /// List a credential cache, the realm's own by default
    pub async fn klist(&self, ccache: Option<&Path>) -> RealmResult<Vec<u8>> {
        let invocation = self.provider.klist(&self.layout, ccache)?;
        self.run(&invocation).await
    }

    /// List a keytab, the realm's server keytab by default
    pub async fn klist_keytab(&self, keytab: Option<&Path>) -> RealmResult<Vec<u8>> {
        let invocation = self.provider.klist_keytab(&self.layout, keytab)?;
        self.run(&invocation).await
    }

    pub async fn prep_kadmin(
        &self,
        principal: Option<&str>,
        password: Option<&str>,
        flags: &[String],
    ) -> RealmResult<Vec<u8>> {
        let invocation = self.provider.prep_kadmin(&self.layout, principal, password, flags)?;
        self.run(&invocation).await
    }

    pub async fn run_kadmin(&self, query: &str) -> RealmResult<Vec<u8>> {
        let invocation = self.provider.run_kadmin(&self.layout, query)?;
        self.run(&invocation).await
    }

    pub async fn run_kadminl(&self, query: impl Into<AdminQuery>) -> RealmResult<Vec<u8>> {
        let invocation = self.provider.run_kadminl(&self.layout, &query.into())?;
        self.run(&invocation).await
    }

    pub async fn start_kdc(&mut self, extra_args: &[String], env: Option<&Environment>) -> RealmResult<()> {
        let launch = self.provider.kdc_launch(&self.layout, extra_args)?;
        self.start_daemon(DaemonRole::Kdc, &launch, env).await
    }

    pub async fn start_kadmind(&mut self, env: Option<&Environment>) -> RealmResult<()> {
        let launch = self.provider.kadmind_launch(&self.layout)?;
        self.start_daemon(DaemonRole::Kadmind, &launch, env).await
    }

    /// Start a daemon in `role` and keep its handle
    ///
    /// Fails with `AlreadyStarted`, spawning nothing, when the role is taken.
    pub async fn start_daemon(
        &mut self,
        role: DaemonRole,
        launch: &DaemonLaunch,
        env: Option<&Environment>,
    ) -> RealmResult<()> {
        if self.slot(role).is_some() {
            return Err(RealmError::AlreadyStarted { role });
        }
        let env = env.unwrap_or(&self.env);
        let handle = self.supervisor.start(role, launch, env).await?;
        realm_info!(self.layout.realm(), role = %role, pid = ?handle.pid(), "Daemon is ready");
        *self.slot_mut(role) = Some(handle);
        Ok(())
    }

    pub async fn stop_kdc(&mut self) -> RealmResult<()> {
        self.stop_daemon(DaemonRole::Kdc).await
    }

    pub async fn stop_kadmind(&mut self) -> RealmResult<()> {
        self.stop_daemon(DaemonRole::Kadmind).await
    }

    /// Terminate the daemon in `role` and clear its slot
    ///
    /// The slot is cleared only once the exit is confirmed; after an error
    /// the handle stays registered so teardown can retry it.
    pub async fn stop_daemon(&mut self, role: DaemonRole) -> RealmResult<()> {
        let slot = match role {
            DaemonRole::Kdc => &mut self.kdc,
            DaemonRole::Kadmind => &mut self.kadmind,
        };
        let handle = slot.as_mut().ok_or(RealmError::NotRunning { role })?;
        let code = self.supervisor.stop(handle).await?;
        *slot = None;
        realm_debug!(self.layout.realm(), role = %role, code = code, "Daemon exited");
        Ok(())
    }

    /// Send SIGTERM to every live daemon without waiting for them
    pub fn kill_daemons(&mut self) {
        let realm = self.layout.realm().to_string();
        for handle in [self.kdc.as_mut(), self.kadmind.as_mut()].into_iter().flatten() {
            if let Err(e) = handle.terminate() {
                realm_warn!(realm, role = %handle.role(), error = %e, "Failed to signal daemon");
            }
        }
    }

    /// Stop both daemons and remove the working directory unless attached
    ///
    /// Every step is attempted; the first error is returned.
    pub async fn stop(mut self) -> RealmResult<()> {
        log_shutdown(self.layout.realm(), "stop requested");
        let mut first_error = None;

        for role in [DaemonRole::Kdc, DaemonRole::Kadmind] {
            if self.is_running(role) {
                if let Err(e) = self.stop_daemon(role).await {
                    realm_warn!(self.layout.realm(), role = %role, error = %e, "Daemon did not stop cleanly");
                    first_error.get_or_insert(e);
                }
            }
        }

        if !self.is_existing {
            let tmpdir = self.layout.tmpdir().to_path_buf();
            match tokio::fs::remove_dir_all(&tmpdir).await {
                Ok(()) => realm_debug!(self.layout.realm(), "Removed {}", tmpdir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    first_error.get_or_insert(RealmError::file_system("remove", tmpdir, e));
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn slot(&self, role: DaemonRole) -> Option<&DaemonHandle> {
        match role {
            DaemonRole::Kdc => self.kdc.as_ref(),
            DaemonRole::Kadmind => self.kadmind.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: DaemonRole) -> &mut Option<DaemonHandle> {
        match role {
            DaemonRole::Kdc => &mut self.kdc,
            DaemonRole::Kadmind => &mut self.kadmind,
        }
    }
}

impl Drop for Realm {
    fn drop(&mut self) {
        if self.kdc.is_some() || self.kadmind.is_some() {
            realm_warn!(self.layout.realm(), "Realm dropped with live daemons, killing them");
            self.kill_daemons();
        }
    }
}

fn create_tmpdir() -> RealmResult<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(TMPDIR_PREFIX)
        .suffix(TMPDIR_SUFFIX)
        .tempdir()
        .map_err(|e| RealmError::file_system("create", std::env::temp_dir(), e))?;
    Ok(dir.keep())
}

/// Fully qualified name of this host, `localhost` on macOS
fn default_hostname() -> String {
    if cfg!(target_os = "macos") {
        return "localhost".to_string();
    }
    let Some(short) = system_hostname() else {
        return "localhost".to_string();
    };
    canonical_hostname(&short, reverse_lookup)
}

/// The name `short` resolves back to, or `short` itself when resolution
/// fails or comes back empty
fn canonical_hostname(short: &str, resolve: impl Fn(&str) -> Option<String>) -> String {
    match resolve(short) {
        Some(name) if !name.is_empty() => name,
        _ => short.to_string(),
    }
}

/// Forward-resolve `host`, then name its first address
///
/// A numeric answer means the address has no name.
fn reverse_lookup(host: &str) -> Option<String> {
    let addr = dns_lookup::lookup_host(host).ok()?.into_iter().next()?;
    dns_lookup::lookup_addr(&addr)
        .ok()
        .filter(|name| name.parse::<IpAddr>().is_err())
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    nix::unistd::gethostname().ok()?.into_string().ok()
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_hostname_prefers_resolved_name() {
        let name = canonical_hostname("vm", |_| Some("vm.example.test".to_string()));
        assert_eq!(name, "vm.example.test");
    }

    #[test]
    fn test_canonical_hostname_falls_back_to_short_name() {
        assert_eq!(canonical_hostname("vm", |_| None), "vm");
        assert_eq!(canonical_hostname("vm", |_| Some(String::new())), "vm");
    }

    #[test]
    fn test_default_hostname_is_never_empty() {
        assert!(!default_hostname().is_empty());
    }
}
