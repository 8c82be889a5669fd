//! Executable path resolution
//!
//! A tool resolves to, in order: an explicit override keyed by executable
//! name, the executable found on `PATH`, or the provider's built-in default.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ProviderKind;
use crate::error::{RealmError, RealmResult};

/// Prefix of environment variables that override a tool path, e.g.
/// `K5REALM_PATH_KADMIN_LOCAL`
pub const ENV_OVERRIDE_PREFIX: &str = "K5REALM_PATH_";

/// Roles a Kerberos executable plays in the realm lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    Krb5Config,
    Kdb5Util,
    Kdc,
    Kadmin,
    KadminLocal,
    Kadmind,
    Kprop,
    Kinit,
    Klist,
    Ktutil,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Krb5Config => "krb5-config",
            Tool::Kdb5Util => "kdb5_util",
            Tool::Kdc => "kdc",
            Tool::Kadmin => "kadmin",
            Tool::KadminLocal => "kadmin.local",
            Tool::Kadmind => "kadmind",
            Tool::Kprop => "kprop",
            Tool::Kinit => "kinit",
            Tool::Klist => "klist",
            Tool::Ktutil => "ktutil",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// (tool, executable name, default path)
type ToolSpec = (Tool, &'static str, &'static str);

pub const KRB5_CONFIG: ToolSpec = (Tool::Krb5Config, "krb5-config", "/usr/bin/krb5-config");

const MIT_TOOLS: &[ToolSpec] = &[
    (Tool::Kdb5Util, "kdb5_util", "/usr/sbin/kdb5_util"),
    (Tool::Kdc, "krb5kdc", "/usr/sbin/krb5kdc"),
    (Tool::Kadmin, "kadmin", "/usr/bin/kadmin"),
    (Tool::KadminLocal, "kadmin.local", "/usr/sbin/kadmin.local"),
    (Tool::Kadmind, "kadmind", "/usr/sbin/kadmind"),
    (Tool::Kprop, "kprop", "/usr/sbin/kprop"),
    (Tool::Kinit, "kinit", "/usr/bin/kinit"),
    (Tool::Klist, "klist", "/usr/bin/klist"),
];

#[cfg(target_os = "macos")]
const HEIMDAL_HELPERS: &str = "/System/Library/PrivateFrameworks/Heimdal.framework/Helpers";
#[cfg(not(target_os = "macos"))]
const HEIMDAL_HELPERS: &str = "/usr/libexec";

fn heimdal_tools() -> Vec<(Tool, &'static str, String)> {
    vec![
        (Tool::Kdc, "kdc", format!("{HEIMDAL_HELPERS}/kdc")),
        (Tool::Kadmin, "kadmin", "/usr/bin/kadmin".to_string()),
        (Tool::KadminLocal, "kadmin", "/usr/bin/kadmin".to_string()),
        (Tool::Kadmind, "kadmind", format!("{HEIMDAL_HELPERS}/kadmind")),
        (Tool::Kinit, "kinit", "/usr/bin/kinit".to_string()),
        (Tool::Klist, "klist", "/usr/bin/klist".to_string()),
        (Tool::Ktutil, "ktutil", "/usr/bin/ktutil".to_string()),
    ]
}

fn tool_table(kind: ProviderKind) -> Vec<(Tool, &'static str, String)> {
    match kind {
        ProviderKind::Mit => MIT_TOOLS
            .iter()
            .map(|(tool, name, default)| (*tool, *name, default.to_string()))
            .collect(),
        ProviderKind::Heimdal => heimdal_tools(),
    }
}

/// Every executable name either provider may look up
pub fn known_executables() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = std::iter::once(KRB5_CONFIG.1)
        .chain(MIT_TOOLS.iter().map(|(_, name, _)| *name))
        .chain(heimdal_tools().into_iter().map(|(_, name, _)| name))
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Caller-supplied executable paths, keyed by executable name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathOverrides(BTreeMap<String, PathBuf>);

impl PathOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<N: Into<String>, P: Into<PathBuf>>(mut self, name: N, path: P) -> Self {
        self.insert(name, path);
        self
    }

    pub fn insert<N: Into<String>, P: Into<PathBuf>>(&mut self, name: N, path: P) {
        self.0.insert(name.into(), path.into());
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.0.get(name).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries from this set replace those in `self`
    pub fn extend(&mut self, other: PathOverrides) {
        self.0.extend(other.0);
    }

    /// Parse a `NAME=PATH` assignment
    pub fn parse_assignment(assignment: &str) -> RealmResult<(String, PathBuf)> {
        match assignment.split_once('=') {
            Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
                Ok((name.trim().to_string(), PathBuf::from(path.trim())))
            }
            _ => Err(RealmError::invalid_option(
                "tool",
                format!("expected NAME=PATH, got `{assignment}`"),
            )),
        }
    }

    /// Overrides from `K5REALM_PATH_<NAME>` variables of the current process
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var_os(var).map(PathBuf::from))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        let mut overrides = Self::new();
        for name in known_executables() {
            if let Some(path) = lookup(&env_var_name(name)) {
                overrides.insert(name, path);
            }
        }
        overrides
    }
}

/// `kadmin.local` -> `K5REALM_PATH_KADMIN_LOCAL`
pub fn env_var_name(executable: &str) -> String {
    let suffix: String = executable
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{ENV_OVERRIDE_PREFIX}{suffix}")
}

/// Resolved executable paths for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    kind: ProviderKind,
    paths: BTreeMap<Tool, PathBuf>,
}

impl ToolPaths {
    pub fn resolve(kind: ProviderKind, overrides: &PathOverrides) -> Self {
        Self::resolve_with(kind, overrides, |name| which::which(name).ok())
    }

    pub fn resolve_with(
        kind: ProviderKind,
        overrides: &PathOverrides,
        lookup: impl Fn(&str) -> Option<PathBuf>,
    ) -> Self {
        let paths = tool_table(kind)
            .into_iter()
            .map(|(tool, name, default)| {
                let path = resolve_one(name, &default, overrides, &lookup);
                (tool, path)
            })
            .collect();
        Self { kind, paths }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn get(&self, tool: Tool) -> Option<&Path> {
        self.paths.get(&tool).map(PathBuf::as_path)
    }

    /// Path of `tool` as an argv element
    pub fn arg(&self, tool: Tool) -> RealmResult<String> {
        self.get(tool)
            .map(|p| p.to_string_lossy().into_owned())
            .ok_or(RealmError::Unsupported {
                provider: self.kind,
                operation: tool.name(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tool, &Path)> {
        self.paths.iter().map(|(tool, path)| (*tool, path.as_path()))
    }
}

/// Resolve `krb5-config`, which is needed before the provider is known
pub fn resolve_krb5_config(overrides: &PathOverrides) -> PathBuf {
    let (_, name, default) = KRB5_CONFIG;
    resolve_one(name, default, overrides, &|name: &str| which::which(name).ok())
}

fn resolve_one(
    name: &str,
    default: &str,
    overrides: &PathOverrides,
    lookup: &dyn Fn(&str) -> Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = overrides.get(name) {
        debug!(tool = name, path = %path.display(), "Using overridden path");
        return path.to_path_buf();
    }
    if let Some(path) = lookup(name) {
        debug!(tool = name, path = %path.display(), "Using discovered path");
        return path;
    }
    debug!(tool = name, path = default, "Using default path");
    PathBuf::from(default)
}
