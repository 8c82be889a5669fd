//! MIT krb5 command dialect

use std::path::{Path, PathBuf};

use shared::Section;

use super::paths::{Tool, ToolPaths};
use super::AdminQuery;
use crate::error::{RealmError, RealmResult};
use crate::process::{DaemonLaunch, Invocation, Readiness};
use crate::realm::RealmLayout;

const READY_MARKER: &str = "starting...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mit {
    tools: ToolPaths,
    plugin_dir: Option<PathBuf>,
}

impl Mit {
    pub fn new(tools: ToolPaths, plugin_dir: Option<PathBuf>) -> Self {
        Self { tools, plugin_dir }
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn plugin_dir(&self) -> Option<&Path> {
        self.plugin_dir.as_deref()
    }

    pub fn krb5_conf_skeleton(&self) -> Section {
        Section::new()
            .with(
                "libdefaults",
                Section::new()
                    .with("default_realm", "$realm")
                    .with("dns_lookup_kdc", "false"),
            )
            .with(
                "realms",
                Section::new().with(
                    "$realm",
                    Section::new()
                        .with("kdc", "$hostname:$port0")
                        .with("admin_server", "$hostname:$port1")
                        .with("kpasswd_server", "$hostname:$port2"),
                ),
            )
    }

    pub fn kdc_conf_skeleton(&self) -> Section {
        let db_module_dir = self
            .plugin_dir
            .as_ref()
            .map(|dir| dir.join("kdc").to_string_lossy().into_owned());

        Section::new()
            .with(
                "realms",
                Section::new().with(
                    "$realm",
                    Section::new()
                        .with("database_module", "db")
                        .with("iprop_port", "$port4")
                        .with("key_stash_file", "$tmpdir/stash")
                        .with("acl_file", "$tmpdir/acl")
                        .with("dict_file", "$tmpdir/dictfile")
                        .with("kadmind_port", "$port1")
                        .with("kpasswd_port", "$port2")
                        .with("kdc_ports", "$port0")
                        .with("kdc_tcp_ports", "$port0")
                        .with("database_name", "$tmpdir/db"),
                ),
            )
            .with(
                "dbmodules",
                Section::new().with("db_module_dir", db_module_dir).with(
                    "db",
                    Section::new()
                        .with("db_library", "db2")
                        .with("database_name", "$tmpdir/db"),
                ),
            )
            .with(
                "logging",
                Section::new()
                    .with("admin_server", "FILE:$tmpdir/kadmind5.log")
                    .with("kdc", "FILE:$tmpdir/kdc.log")
                    .with("default", "FILE:$tmpdir/others.log"),
            )
    }

    pub fn create_kdb(&self) -> RealmResult<Vec<Invocation>> {
        let kdb5_util = self.tools.arg(Tool::Kdb5Util)?;
        Ok(vec![Invocation::new([
            kdb5_util.as_str(),
            "create",
            "-W",
            "-s",
            "-P",
            "master",
        ])])
    }

    pub fn add_principal(&self, name: &str, password: Option<&str>) -> RealmResult<Invocation> {
        let mut args = vec!["addprinc".to_string()];
        push_key_args(&mut args, password);
        args.push(name.to_string());
        self.run_kadminl(&AdminQuery::Args(args))
    }

    pub fn change_password(
        &self,
        name: &str,
        password: Option<&str>,
        keysalt: Option<&str>,
    ) -> RealmResult<Invocation> {
        let mut args = vec!["cpw".to_string()];
        push_key_args(&mut args, password);
        if let Some(keysalt) = keysalt {
            args.extend(["-e".to_string(), keysalt.to_string()]);
        }
        args.push(name.to_string());
        self.run_kadminl(&AdminQuery::Args(args))
    }

    pub fn extract_keytab(&self, name: &str, keytab: &Path) -> RealmResult<Invocation> {
        self.run_kadminl(&AdminQuery::Args(vec![
            "ktadd".to_string(),
            "-k".to_string(),
            keytab.to_string_lossy().into_owned(),
            "-norandkey".to_string(),
            name.to_string(),
        ]))
    }

    pub fn kinit(
        &self,
        name: &str,
        password: Option<&str>,
        flags: &[String],
        verbose: bool,
    ) -> RealmResult<Invocation> {
        let mut argv = vec![self.tools.arg(Tool::Kinit)?];
        if verbose {
            argv.push("-V".to_string());
        }
        argv.extend(flags.iter().cloned());
        argv.push(name.to_string());

        let invocation = Invocation::new(argv);
        Ok(match password {
            Some(pw) => invocation.with_input(format!("{pw}\n")),
            None => invocation,
        })
    }

    pub fn klist(&self, ccache: &Path) -> RealmResult<Invocation> {
        Ok(Invocation::new([
            self.tools.arg(Tool::Klist)?,
            ccache.to_string_lossy().into_owned(),
        ]))
    }

    pub fn klist_keytab(&self, keytab: &Path) -> RealmResult<Invocation> {
        Ok(Invocation::new([
            self.tools.arg(Tool::Klist)?,
            "-k".to_string(),
            keytab.to_string_lossy().into_owned(),
        ]))
    }

    /// Obtain a kadmin service ticket into the realm's kadmin cache
    ///
    /// Without a principal, the realm's admin principal and its password
    /// are used.
    pub fn prep_kadmin(
        &self,
        layout: &RealmLayout,
        principal: Option<&str>,
        password: Option<&str>,
        flags: &[String],
    ) -> RealmResult<Invocation> {
        let (principal, password) = match principal {
            Some(principal) => (principal.to_string(), password.map(str::to_string)),
            None => (layout.admin_princ(), Some(layout.password("admin"))),
        };
        let mut all_flags = vec![
            "-S".to_string(),
            "kadmin/admin".to_string(),
            "-c".to_string(),
            layout.kadmin_ccache().to_string_lossy().into_owned(),
        ];
        all_flags.extend(flags.iter().cloned());
        self.kinit(&principal, password.as_deref(), &all_flags, true)
    }

    pub fn run_kadmin(&self, layout: &RealmLayout, query: &str) -> RealmResult<Invocation> {
        Ok(Invocation::new([
            self.tools.arg(Tool::Kadmin)?,
            "-c".to_string(),
            layout.kadmin_ccache().to_string_lossy().into_owned(),
            "-q".to_string(),
            query.to_string(),
        ]))
    }

    /// `kadmin.local -q <query>`; argument lists are shell-quoted and joined
    pub fn run_kadminl(&self, query: &AdminQuery) -> RealmResult<Invocation> {
        let query = match query {
            AdminQuery::Line(line) => line.clone(),
            AdminQuery::Args(args) => shlex::try_join(args.iter().map(String::as_str))
                .map_err(|e| RealmError::invalid_option("query", e.to_string()))?,
        };
        Ok(Invocation::new([
            self.tools.arg(Tool::KadminLocal)?,
            "-q".to_string(),
            query,
        ]))
    }

    pub fn kdc_launch(&self, extra_args: &[String]) -> RealmResult<DaemonLaunch> {
        let mut argv = vec![self.tools.arg(Tool::Kdc)?, "-n".to_string()];
        argv.extend(extra_args.iter().cloned());
        Ok(DaemonLaunch::new(argv, Readiness::output(READY_MARKER)))
    }

    pub fn kadmind_launch(&self, layout: &RealmLayout) -> RealmResult<DaemonLaunch> {
        let argv = vec![
            self.tools.arg(Tool::Kadmind)?,
            "-nofork".to_string(),
            "-W".to_string(),
            "-p".to_string(),
            self.tools.arg(Tool::Kdb5Util)?,
            "-K".to_string(),
            self.tools.arg(Tool::Kprop)?,
            "-F".to_string(),
            layout.dump().to_string_lossy().into_owned(),
        ];
        Ok(DaemonLaunch::new(argv, Readiness::output(READY_MARKER)))
    }
}

fn push_key_args(args: &mut Vec<String>, password: Option<&str>) {
    match password {
        Some(pw) => args.extend(["-pw".to_string(), pw.to_string()]),
        None => args.push("-randkey".to_string()),
    }
}
