//! Immutable environment snapshots handed to realm subprocesses

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::process::Command;

/// Harness variables forwarded to every subprocess on top of the realm map
pub const PASSTHROUGH_VARS: &[&str] = &["PATH", "LD_LIBRARY_PATH", "DYLD_LIBRARY_PATH", "KRB5_TRACE"];

/// Environment map for a realm subprocess
///
/// Children never inherit the harness environment wholesale: [`Environment::apply`]
/// clears it, copies [`PASSTHROUGH_VARS`] from the current process and then
/// sets the variables held here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy with one variable added or replaced
    pub fn with<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Install this environment on `cmd`
    pub fn apply(&self, cmd: &mut Command) {
        cmd.env_clear();
        for name in PASSTHROUGH_VARS {
            if let Some(value) = std::env::var_os(name) {
                cmd.env(name, value);
            }
        }
        cmd.envs(&self.vars);
    }

    /// `export NAME=value` lines, values shell-quoted
    pub fn to_shell_exports(&self) -> String {
        self.vars
            .iter()
            .map(|(k, v)| {
                let quoted = shlex::try_quote(v).map(|q| q.into_owned()).unwrap_or_else(|_| v.clone());
                format!("export {k}={quoted}\n")
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_does_not_touch_original() {
        let base = Environment::new().with("KRB5_CONFIG", "/tmp/a/krb5.conf");
        let derived = base.clone().with("KRB5_CONFIG", "/tmp/a/krb5.conf.alt");

        assert_eq!(base.get("KRB5_CONFIG"), Some("/tmp/a/krb5.conf"));
        assert_eq!(derived.get("KRB5_CONFIG"), Some("/tmp/a/krb5.conf.alt"));
    }

    #[test]
    fn test_shell_exports_quote_values() {
        let env: Environment = [("A", "plain"), ("B", "has space")].into_iter().collect();
        assert_eq!(env.to_shell_exports(), "export A=plain\nexport B='has space'\n");
    }
}
