//! Kerberos implementations a realm can drive
//!
//! [`Provider`] is a closed set of two dialects. Each operation builds the
//! [`Invocation`] or [`DaemonLaunch`] for its dialect; the realm runs them.
//! Operations a dialect lacks return [`RealmError::Unsupported`].

pub mod context;
pub mod heimdal;
pub mod mit;
pub mod paths;
pub mod plugins;

pub use context::{Probe, ToolchainContext};
pub use heimdal::Heimdal;
pub use mit::Mit;
pub use paths::{PathOverrides, Tool, ToolPaths};

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shared::Section;

use crate::error::{RealmError, RealmResult};
use crate::process::{DaemonLaunch, Invocation};
use crate::realm::RealmLayout;

const SYSTEM_KRB5_CONFIG: &str = "/usr/bin/krb5-config";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mit,
    Heimdal,
}

impl ProviderKind {
    /// Pick the dialect from `krb5-config --version` output
    ///
    /// macOS ships Heimdal as the system `krb5-config` without saying so.
    pub fn classify(version_output: &str, krb5_config: &Path) -> Self {
        Self::classify_for(version_output, krb5_config, cfg!(target_os = "macos"))
    }

    fn classify_for(version_output: &str, krb5_config: &Path, is_macos: bool) -> Self {
        let says_heimdal = version_output.to_lowercase().contains("heimdal");
        let macos_system = is_macos && krb5_config == Path::new(SYSTEM_KRB5_CONFIG);
        if says_heimdal || macos_system {
            ProviderKind::Heimdal
        } else {
            ProviderKind::Mit
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Mit => write!(f, "mit"),
            ProviderKind::Heimdal => write!(f, "heimdal"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = RealmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mit" => Ok(ProviderKind::Mit),
            "heimdal" => Ok(ProviderKind::Heimdal),
            other => Err(RealmError::invalid_option(
                "provider",
                format!("unknown provider `{other}` (expected mit or heimdal)"),
            )),
        }
    }
}

/// A local admin query: one line as typed at the prompt, or an ordered
/// argument list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminQuery {
    Line(String),
    Args(Vec<String>),
}

impl From<&str> for AdminQuery {
    fn from(line: &str) -> Self {
        AdminQuery::Line(line.to_string())
    }
}

impl From<String> for AdminQuery {
    fn from(line: String) -> Self {
        AdminQuery::Line(line)
    }
}

impl<S: Into<String>> From<Vec<S>> for AdminQuery {
    fn from(args: Vec<S>) -> Self {
        AdminQuery::Args(args.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    Mit(Mit),
    Heimdal(Heimdal),
}

impl Provider {
    /// Resolve tool paths for `kind`; MIT also gets the plugin directory
    pub fn new(kind: ProviderKind, tools: ToolPaths, plugin_dir: Option<&Path>) -> Self {
        match kind {
            ProviderKind::Mit => Provider::Mit(Mit::new(tools, plugin_dir.map(Path::to_path_buf))),
            ProviderKind::Heimdal => Provider::Heimdal(Heimdal::new(tools)),
        }
    }

    /// Probe the toolchain (once per context) unless `forced`, then resolve
    pub async fn select(
        ctx: &ToolchainContext,
        overrides: &PathOverrides,
        forced: Option<ProviderKind>,
    ) -> Self {
        let krb5_config = paths::resolve_krb5_config(overrides);
        let kind = match forced {
            Some(kind) => kind,
            None => ctx.probe(&krb5_config).await.kind,
        };
        let tools = ToolPaths::resolve(kind, overrides);
        let plugin_dir = match kind {
            ProviderKind::Mit => ctx.plugin_dir(&krb5_config).await,
            ProviderKind::Heimdal => None,
        };
        Self::new(kind, tools, plugin_dir)
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Mit(_) => ProviderKind::Mit,
            Provider::Heimdal(_) => ProviderKind::Heimdal,
        }
    }

    pub fn tools(&self) -> &ToolPaths {
        match self {
            Provider::Mit(mit) => mit.tools(),
            Provider::Heimdal(heimdal) => heimdal.tools(),
        }
    }

    pub fn krb5_conf_skeleton(&self) -> Section {
        match self {
            Provider::Mit(mit) => mit.krb5_conf_skeleton(),
            Provider::Heimdal(heimdal) => heimdal.krb5_conf_skeleton(),
        }
    }

    /// Heimdal has no separate KDC profile
    pub fn kdc_conf_skeleton(&self) -> Option<Section> {
        match self {
            Provider::Mit(mit) => Some(mit.kdc_conf_skeleton()),
            Provider::Heimdal(_) => None,
        }
    }

    pub fn create_kdb(&self, layout: &RealmLayout) -> RealmResult<Vec<Invocation>> {
        match self {
            Provider::Mit(mit) => mit.create_kdb(),
            Provider::Heimdal(heimdal) => heimdal.create_kdb(layout),
        }
    }

    pub fn add_principal(
        &self,
        layout: &RealmLayout,
        name: &str,
        password: Option<&str>,
    ) -> RealmResult<Invocation> {
        match self {
            Provider::Mit(mit) => mit.add_principal(name, password),
            Provider::Heimdal(heimdal) => heimdal.add_principal(layout, name, password),
        }
    }

    pub fn change_password(
        &self,
        layout: &RealmLayout,
        name: &str,
        password: Option<&str>,
        keysalt: Option<&str>,
    ) -> RealmResult<Invocation> {
        match self {
            Provider::Mit(mit) => mit.change_password(name, password, keysalt),
            Provider::Heimdal(heimdal) => heimdal.change_password(layout, name, password, keysalt),
        }
    }

    pub fn extract_keytab(
        &self,
        layout: &RealmLayout,
        name: &str,
        keytab: &Path,
    ) -> RealmResult<Invocation> {
        match self {
            Provider::Mit(mit) => mit.extract_keytab(name, keytab),
            Provider::Heimdal(heimdal) => heimdal.extract_keytab(layout, name, keytab),
        }
    }

    /// `verbose` only affects MIT's `kinit`
    pub fn kinit(
        &self,
        name: &str,
        password: Option<&str>,
        flags: &[String],
        verbose: bool,
    ) -> RealmResult<Invocation> {
        match self {
            Provider::Mit(mit) => mit.kinit(name, password, flags, verbose),
            Provider::Heimdal(heimdal) => heimdal.kinit(name, password, flags),
        }
    }

    pub fn klist(&self, layout: &RealmLayout, ccache: Option<&Path>) -> RealmResult<Invocation> {
        let default = layout.ccache();
        let ccache = ccache.unwrap_or(&default);
        match self {
            Provider::Mit(mit) => mit.klist(ccache),
            Provider::Heimdal(heimdal) => heimdal.klist(ccache),
        }
    }

    pub fn klist_keytab(&self, layout: &RealmLayout, keytab: Option<&Path>) -> RealmResult<Invocation> {
        let default = layout.keytab();
        let keytab = keytab.unwrap_or(&default);
        match self {
            Provider::Mit(mit) => mit.klist_keytab(keytab),
            Provider::Heimdal(heimdal) => heimdal.klist_keytab(keytab),
        }
    }

    pub fn prep_kadmin(
        &self,
        layout: &RealmLayout,
        principal: Option<&str>,
        password: Option<&str>,
        flags: &[String],
    ) -> RealmResult<Invocation> {
        match self {
            Provider::Mit(mit) => mit.prep_kadmin(layout, principal, password, flags),
            Provider::Heimdal(heimdal) => heimdal.prep_kadmin(),
        }
    }

    pub fn run_kadmin(&self, layout: &RealmLayout, query: &str) -> RealmResult<Invocation> {
        match self {
            Provider::Mit(mit) => mit.run_kadmin(layout, query),
            Provider::Heimdal(heimdal) => heimdal.run_kadmin(),
        }
    }

    pub fn run_kadminl(&self, layout: &RealmLayout, query: &AdminQuery) -> RealmResult<Invocation> {
        match self {
            Provider::Mit(mit) => mit.run_kadminl(query),
            Provider::Heimdal(heimdal) => heimdal.run_kadminl(layout, query),
        }
    }

    pub fn kdc_launch(&self, layout: &RealmLayout, extra_args: &[String]) -> RealmResult<DaemonLaunch> {
        match self {
            Provider::Mit(mit) => mit.kdc_launch(extra_args),
            Provider::Heimdal(heimdal) => heimdal.kdc_launch(layout, extra_args),
        }
    }

    pub fn kadmind_launch(&self, layout: &RealmLayout) -> RealmResult<DaemonLaunch> {
        match self {
            Provider::Mit(mit) => mit.kadmind_launch(layout),
            Provider::Heimdal(heimdal) => heimdal.kadmind_launch(layout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let path = Path::new("/opt/krb5/bin/krb5-config");
        assert_eq!(
            ProviderKind::classify_for("Kerberos 5 release 1.21.2", path, false),
            ProviderKind::Mit
        );
        assert_eq!(
            ProviderKind::classify_for("HEIMDAL 7.8.0", path, false),
            ProviderKind::Heimdal
        );
        assert_eq!(
            ProviderKind::classify_for("something", Path::new(SYSTEM_KRB5_CONFIG), true),
            ProviderKind::Heimdal
        );
        assert_eq!(
            ProviderKind::classify_for("something", Path::new(SYSTEM_KRB5_CONFIG), false),
            ProviderKind::Mit
        );
        assert_eq!(ProviderKind::classify_for("something", path, true), ProviderKind::Mit);
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("MIT".parse::<ProviderKind>().unwrap(), ProviderKind::Mit);
        assert_eq!("heimdal".parse::<ProviderKind>().unwrap(), ProviderKind::Heimdal);
        assert!("shishi".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Heimdal.to_string(), "heimdal");
    }

    #[tokio::test]
    async fn test_forced_provider_skips_probe() {
        let ctx = ToolchainContext::new();
        let provider = Provider::select(&ctx, &PathOverrides::new(), Some(ProviderKind::Heimdal)).await;
        assert_eq!(provider.kind(), ProviderKind::Heimdal);
        assert!(provider.kdc_conf_skeleton().is_none());
        assert!(ctx.version().is_none());
    }

    #[test]
    fn test_default_paths_for_listing() {
        let tools = ToolPaths::resolve_with(ProviderKind::Mit, &PathOverrides::new(), |_| None);
        let provider = Provider::new(ProviderKind::Mit, tools, None);
        let layout = RealmLayout::new("R", "/tmp/x", "h", shared::PortBlock::default());

        let klist = provider.klist(&layout, None).unwrap();
        assert_eq!(klist.argv, vec!["/usr/bin/klist", "/tmp/x/ccache"]);
        let keytab = provider.klist_keytab(&layout, None).unwrap();
        assert_eq!(keytab.argv, vec!["/usr/bin/klist", "-k", "/tmp/x/keytab"]);
    }
}
