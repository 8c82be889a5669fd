//! Names and paths derived from a realm's name, directory, host and ports

use std::path::{Path, PathBuf};

use shared::{PortBlock, Substitutions};

use crate::env::Environment;

const DEV_NULL: &str = "/dev/null";

/// Where a realm keeps its files and what its principals are called
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmLayout {
    realm: String,
    tmpdir: PathBuf,
    hostname: String,
    ports: PortBlock,
}

impl RealmLayout {
    pub fn new<R, H>(realm: R, tmpdir: impl Into<PathBuf>, hostname: H, ports: PortBlock) -> Self
    where
        R: Into<String>,
        H: Into<String>,
    {
        Self {
            realm: realm.into(),
            tmpdir: tmpdir.into(),
            hostname: hostname.into(),
            ports,
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn tmpdir(&self) -> &Path {
        &self.tmpdir
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn ports(&self) -> PortBlock {
        self.ports
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.tmpdir.join(name)
    }

    pub fn krb5_conf(&self) -> PathBuf {
        self.path("krb5.conf")
    }

    pub fn kdc_conf(&self) -> PathBuf {
        self.path("kdc.conf")
    }

    pub fn keytab(&self) -> PathBuf {
        self.path("keytab")
    }

    pub fn client_keytab(&self) -> PathBuf {
        self.path("client_keytab")
    }

    pub fn ccache(&self) -> PathBuf {
        self.path("ccache")
    }

    pub fn kadmin_ccache(&self) -> PathBuf {
        self.path("kadmin_ccache")
    }

    pub fn stash(&self) -> PathBuf {
        self.path("stash")
    }

    pub fn dump(&self) -> PathBuf {
        self.path("dump")
    }

    pub fn kdc_log(&self) -> PathBuf {
        self.path("kdc.log")
    }

    pub fn acl(&self) -> PathBuf {
        self.path("acl")
    }

    pub fn dictfile(&self) -> PathBuf {
        self.path("dictfile")
    }

    pub fn user_princ(&self) -> String {
        format!("user@{}", self.realm)
    }

    pub fn admin_princ(&self) -> String {
        format!("user/admin@{}", self.realm)
    }

    pub fn host_princ(&self) -> String {
        format!("host/{}@{}", self.hostname, self.realm)
    }

    pub fn nfs_princ(&self) -> String {
        format!("nfs/{}@{}", self.hostname, self.realm)
    }

    pub fn krbtgt_princ(&self) -> String {
        format!("krbtgt/{0}@{0}", self.realm)
    }

    pub fn kiprop_princ(&self) -> String {
        format!("kiprop/{}@{}", self.hostname, self.realm)
    }

    /// `name` followed by the last component of the realm directory
    pub fn password(&self, name: &str) -> String {
        let suffix = self
            .tmpdir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{name}{suffix}")
    }

    pub fn kprop_port(&self) -> u16 {
        self.ports.kprop()
    }

    pub fn server_port(&self) -> u16 {
        self.ports.server()
    }

    /// Variables available to `$name` placeholders in profiles
    pub fn substitutions(&self) -> Substitutions {
        Substitutions::for_realm(&self.realm, &self.tmpdir, &self.hostname, self.ports)
    }

    /// Client and server environment pointing at the given config files
    pub fn environment(&self, krb5_conf: &Path, kdc_conf: Option<&Path>) -> Environment {
        let kdc_profile = kdc_conf
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEV_NULL.to_string());
        let kprop_port = self.kprop_port().to_string();

        Environment::new()
            .with("KRB5_CONFIG", krb5_conf.to_string_lossy())
            .with("KRB5_KDC_PROFILE", kdc_profile)
            .with("KRB5CCNAME", self.ccache().to_string_lossy())
            .with("KRB5_KTNAME", self.keytab().to_string_lossy())
            .with("KRB5_CLIENT_KTNAME", self.client_keytab().to_string_lossy())
            .with("KRB5RCACHEDIR", self.tmpdir.to_string_lossy())
            .with("KPROPD_PORT", kprop_port.clone())
            .with("KPROP_PORT", kprop_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(dir: &str) -> RealmLayout {
        RealmLayout::new("TEST.EXAMPLE", dir, "host.test", PortBlock::new(61500))
    }

    #[test]
    fn test_principal_names() {
        let layout = layout("/tmp/abc-krbtest");
        assert_eq!(layout.user_princ(), "user@TEST.EXAMPLE");
        assert_eq!(layout.admin_princ(), "user/admin@TEST.EXAMPLE");
        assert_eq!(layout.host_princ(), "host/host.test@TEST.EXAMPLE");
        assert_eq!(layout.nfs_princ(), "nfs/host.test@TEST.EXAMPLE");
        assert_eq!(layout.krbtgt_princ(), "krbtgt/TEST.EXAMPLE@TEST.EXAMPLE");
    }

    #[test]
    fn test_password_follows_directory_name() {
        let a = layout("/tmp/abc-krbtest");
        let b = layout("/tmp/xyz-krbtest");
        assert_eq!(a.password("user"), "userabc-krbtest");
        assert_eq!(a.password("user"), a.password("user"));
        assert_ne!(a.password("user"), b.password("user"));
        assert_ne!(a.password("user"), a.password("admin"));
    }

    #[test]
    fn test_environment_points_inside_directory() {
        let layout = layout("/tmp/abc-krbtest");
        let env = layout.environment(&layout.krb5_conf(), None);

        assert_eq!(env.get("KRB5_CONFIG"), Some("/tmp/abc-krbtest/krb5.conf"));
        assert_eq!(env.get("KRB5_KDC_PROFILE"), Some("/dev/null"));
        assert_eq!(env.get("KRB5CCNAME"), Some("/tmp/abc-krbtest/ccache"));
        assert_eq!(env.get("KRB5_KTNAME"), Some("/tmp/abc-krbtest/keytab"));
        assert_eq!(env.get("KRB5_CLIENT_KTNAME"), Some("/tmp/abc-krbtest/client_keytab"));
        assert_eq!(env.get("KRB5RCACHEDIR"), Some("/tmp/abc-krbtest"));
        assert_eq!(env.get("KPROPD_PORT"), Some("61503"));
        assert_eq!(env.get("KPROP_PORT"), Some("61503"));
        assert_eq!(env.len(), 8);

        let with_kdc = layout.environment(&layout.krb5_conf(), Some(&layout.kdc_conf()));
        assert_eq!(with_kdc.get("KRB5_KDC_PROFILE"), Some("/tmp/abc-krbtest/kdc.conf"));
    }
}
