//! Per-session memo of toolchain facts
//!
//! Probing `krb5-config` and walking library directories is slow and gives
//! the same answer for every realm in a test session. A [`ToolchainContext`]
//! remembers both. Share one through an `Arc` to reuse the answers across
//! realms; the first probe wins.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::plugins::find_plugin_dir;
use super::ProviderKind;

/// Outcome of `krb5-config --version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub kind: ProviderKind,
    /// Trimmed version output, `None` when the probe failed
    pub version: Option<String>,
}

#[derive(Debug, Default)]
pub struct ToolchainContext {
    probe: OnceCell<Probe>,
    plugin_dir: OnceCell<Option<PathBuf>>,
}

impl ToolchainContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `krb5_config` once; later calls return the first answer
    pub async fn probe(&self, krb5_config: &Path) -> &Probe {
        self.probe
            .get_or_init(|| async {
                let probe = run_probe(krb5_config).await;
                info!(
                    provider = %probe.kind,
                    version = probe.version.as_deref().unwrap_or("unknown"),
                    "Selected Kerberos provider"
                );
                probe
            })
            .await
    }

    /// Version string of the probed toolchain, if a probe has run and succeeded
    pub fn version(&self) -> Option<&str> {
        self.probe.get().and_then(|p| p.version.as_deref())
    }

    /// Whether the probed toolchain is at least `minimum` (dotted numeric)
    pub fn version_at_least(&self, minimum: &str) -> bool {
        match (self.version().and_then(parse_version), parse_version(minimum)) {
            (Some(have), Some(want)) => compare_versions(&have, &want) != Ordering::Less,
            _ => false,
        }
    }

    /// Plugin directory of the installed toolchain, searched once
    pub async fn plugin_dir(&self, krb5_config: &Path) -> Option<&Path> {
        self.plugin_dir
            .get_or_init(|| async {
                let prefix = command_output(krb5_config, "--prefix")
                    .await
                    .map(|out| PathBuf::from(out.trim()));
                let ld_library_path = std::env::var("LD_LIBRARY_PATH").ok();
                let found = tokio::task::spawn_blocking(move || {
                    find_plugin_dir(ld_library_path.as_deref(), prefix.as_deref())
                })
                .await
                .ok()
                .flatten();
                debug!(plugin_dir = ?found, "Plugin directory search finished");
                found
            })
            .await
            .as_deref()
    }
}

async fn run_probe(krb5_config: &Path) -> Probe {
    match command_output(krb5_config, "--version").await {
        Some(output) => Probe {
            kind: ProviderKind::classify(&output, krb5_config),
            version: Some(output.trim().to_string()),
        },
        None => {
            debug!(tool = %krb5_config.display(), "Provider probe failed, defaulting to MIT");
            Probe {
                kind: ProviderKind::Mit,
                version: None,
            }
        }
    }
}

/// Combined stdout/stderr of a successful `tool arg` run
async fn command_output(tool: &Path, arg: &str) -> Option<String> {
    let output = Command::new(tool).arg(arg).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Some(text)
}

/// Numeric components of the last version-looking token, e.g.
/// `Kerberos 5 release 1.21.2` -> `[1, 21, 2]`
pub fn parse_version(text: &str) -> Option<Vec<u32>> {
    let token = text
        .split_whitespace()
        .rev()
        .find(|t| t.starts_with(|c: char| c.is_ascii_digit()))?;
    let parts: Vec<u32> = token
        .split('.')
        .map_while(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .collect();
    (!parts.is_empty()).then_some(parts)
}

fn compare_versions(have: &[u32], want: &[u32]) -> Ordering {
    let len = have.len().max(want.len());
    (0..len)
        .map(|i| {
            let a = have.get(i).copied().unwrap_or(0);
            let b = want.get(i).copied().unwrap_or(0);
            a.cmp(&b)
        })
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("Kerberos 5 release 1.21.2"), Some(vec![1, 21, 2]));
        assert_eq!(parse_version("heimdal 7.8.0\n"), Some(vec![7, 8, 0]));
        assert_eq!(parse_version("1.22-beta1"), Some(vec![1, 22]));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn test_compare_versions_pads_with_zero() {
        assert_eq!(compare_versions(&[1, 21], &[1, 21, 0]), Ordering::Equal);
        assert_eq!(compare_versions(&[1, 9], &[1, 10]), Ordering::Less);
        assert_eq!(compare_versions(&[2], &[1, 99]), Ordering::Greater);
    }

    #[tokio::test]
    async fn test_failed_probe_defaults_to_mit_and_is_memoised() {
        let ctx = ToolchainContext::new();
        let probe = ctx.probe(Path::new("/nonexistent/krb5-config")).await;
        assert_eq!(probe.kind, ProviderKind::Mit);
        assert_eq!(probe.version, None);
        assert!(!ctx.version_at_least("1.0"));

        // A later, different path does not re-probe
        let again = ctx.probe(Path::new("/usr/bin/false")).await;
        assert_eq!(again.kind, ProviderKind::Mit);
    }
}
