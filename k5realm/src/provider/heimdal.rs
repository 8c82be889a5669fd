//! Heimdal command dialect
//!
//! Heimdal keeps its KDC settings in `krb5.conf`, drives the database
//! through `kadmin --local`, and announces KDC readiness only in its log
//! file. Remote kadmin operations are not provided.

use std::path::Path;

use shared::Section;

use super::paths::{Tool, ToolPaths};
use super::{AdminQuery, ProviderKind};
use crate::error::{RealmError, RealmResult};
use crate::process::{DaemonLaunch, Invocation, Readiness};
use crate::realm::RealmLayout;

const READY_MARKER: &str = "KDC started";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heimdal {
    tools: ToolPaths,
}

impl Heimdal {
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn krb5_conf_skeleton(&self) -> Section {
        Section::new()
            .with(
                "libdefaults",
                Section::new()
                    .with("default_realm", "$realm")
                    .with("default_keytab_name", "FILE:$tmpdir/keytab")
                    .with("dns_lookup_kdc", "false")
                    .with("dns_lookup_realm", "false"),
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
            .with(
                "logging",
                Section::new()
                    .with("kadmind", "FILE:$tmpdir/kadmind.log")
                    .with("kdc", "FILE:$tmpdir/kdc.log")
                    .with("kpasswdd", "FILE:$tmpdir/kpasswdd.log")
                    .with("krb5", "FILE:$tmpdir/krb5.log")
                    .with("default", "FILE:$tmpdir/others.log"),
            )
            .with(
                "kdc",
                Section::new()
                    .with(
                        "database",
                        Section::new()
                            .with("dbname", "$tmpdir/db")
                            .with("mkey_file", "$tmpdir/stash")
                            .with("acl_file", "$tmpdir/acl")
                            .with("log_file", "$tmpdir/db.log"),
                    )
                    .with("ports", "$port0"),
            )
    }

    pub fn create_kdb(&self, layout: &RealmLayout) -> RealmResult<Vec<Invocation>> {
        let stash = self.run_kadminl(
            layout,
            &AdminQuery::Args(vec![
                "stash".to_string(),
                format!("--key-file={}", layout.stash().display()),
                "--random-password".to_string(),
            ]),
        )?;
        let init = self
            .run_kadminl(
                layout,
                &AdminQuery::Args(vec!["init".to_string(), layout.realm().to_string()]),
            )?
            .with_input("\n\n");
        Ok(vec![stash, init])
    }

    pub fn add_principal(
        &self,
        layout: &RealmLayout,
        name: &str,
        password: Option<&str>,
    ) -> RealmResult<Invocation> {
        let mut args = vec!["add".to_string(), "--use-defaults".to_string()];
        args.push(key_arg(password));
        args.push(name.to_string());
        self.run_kadminl(layout, &AdminQuery::Args(args))
    }

    pub fn change_password(
        &self,
        layout: &RealmLayout,
        name: &str,
        password: Option<&str>,
        keysalt: Option<&str>,
    ) -> RealmResult<Invocation> {
        let mut args = vec!["change_password".to_string(), key_arg(password)];
        if let Some(keysalt) = keysalt {
            args.extend(["-e".to_string(), keysalt.to_string()]);
        }
        args.push(name.to_string());
        self.run_kadminl(layout, &AdminQuery::Args(args))
    }

    pub fn extract_keytab(
        &self,
        layout: &RealmLayout,
        name: &str,
        keytab: &Path,
    ) -> RealmResult<Invocation> {
        self.run_kadminl(
            layout,
            &AdminQuery::Args(vec![
                "ext".to_string(),
                format!("--keytab={}", keytab.display()),
                name.to_string(),
            ]),
        )
    }

    pub fn kinit(&self, name: &str, password: Option<&str>, flags: &[String]) -> RealmResult<Invocation> {
        let mut argv = vec![self.tools.arg(Tool::Kinit)?];
        if password.is_some() {
            argv.push("--password-file=STDIN".to_string());
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
            "-c".to_string(),
            ccache.to_string_lossy().into_owned(),
        ]))
    }

    pub fn klist_keytab(&self, keytab: &Path) -> RealmResult<Invocation> {
        Ok(Invocation::new([
            self.tools.arg(Tool::Ktutil)?,
            "-k".to_string(),
            keytab.to_string_lossy().into_owned(),
            "list".to_string(),
        ]))
    }

    pub fn prep_kadmin(&self) -> RealmResult<Invocation> {
        Err(unsupported("prep_kadmin"))
    }

    pub fn run_kadmin(&self) -> RealmResult<Invocation> {
        Err(unsupported("run_kadmin"))
    }

    /// `kadmin --local --config-file=<krb5.conf> <args...>`
    pub fn run_kadminl(&self, layout: &RealmLayout, query: &AdminQuery) -> RealmResult<Invocation> {
        let mut argv = vec![
            self.tools.arg(Tool::KadminLocal)?,
            "--local".to_string(),
            config_file_arg(layout),
        ];
        match query {
            AdminQuery::Line(line) => argv.push(line.clone()),
            AdminQuery::Args(args) => argv.extend(args.iter().cloned()),
        }
        Ok(Invocation::new(argv))
    }

    pub fn kdc_launch(&self, layout: &RealmLayout, extra_args: &[String]) -> RealmResult<DaemonLaunch> {
        let mut argv = vec![self.tools.arg(Tool::Kdc)?];
        if cfg!(target_os = "macos") {
            argv.push("--no-sandbox".to_string());
        }
        argv.push(config_file_arg(layout));
        argv.extend(extra_args.iter().cloned());
        Ok(DaemonLaunch::new(argv, Readiness::log(layout.kdc_log(), READY_MARKER)))
    }

    pub fn kadmind_launch(&self, layout: &RealmLayout) -> RealmResult<DaemonLaunch> {
        let argv = vec![
            self.tools.arg(Tool::Kadmind)?,
            config_file_arg(layout),
            format!("--ports={}", layout.ports().kadmind()),
        ];
        Ok(DaemonLaunch::new(argv, Readiness::None))
    }
}

fn config_file_arg(layout: &RealmLayout) -> String {
    format!("--config-file={}", layout.krb5_conf().display())
}

fn key_arg(password: Option<&str>) -> String {
    match password {
        Some(pw) => format!("--password={pw}"),
        None => "--random-key".to_string(),
    }
}

fn unsupported(operation: &'static str) -> RealmError {
    RealmError::Unsupported {
        provider: ProviderKind::Heimdal,
        operation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::paths::PathOverrides;
    use shared::PortBlock;

    fn heimdal() -> Heimdal {
        Heimdal::new(ToolPaths::resolve_with(
            ProviderKind::Heimdal,
            &PathOverrides::new().with("kadmin", "/h/kadmin").with("kdc", "/h/kdc"),
            |_| None,
        ))
    }

    fn layout() -> RealmLayout {
        RealmLayout::new("R.TEST", "/tmp/d-krbtest", "h", PortBlock::new(61000))
    }

    #[test]
    fn test_create_kdb_stashes_then_inits() {
        let invocations = heimdal().create_kdb(&layout()).unwrap();
        assert_eq!(invocations.len(), 2);
        assert_eq!(
            invocations[0].argv,
            vec![
                "/h/kadmin",
                "--local",
                "--config-file=/tmp/d-krbtest/krb5.conf",
                "stash",
                "--key-file=/tmp/d-krbtest/stash",
                "--random-password"
            ]
        );
        assert_eq!(invocations[1].argv[3..], ["init", "R.TEST"]);
        assert_eq!(invocations[1].input.as_deref(), Some("\n\n"));
    }

    #[test]
    fn test_principal_commands() {
        let layout = layout();
        let add = heimdal().add_principal(&layout, "u@R.TEST", Some("pw")).unwrap();
        assert_eq!(add.argv[3..], ["add", "--use-defaults", "--password=pw", "u@R.TEST"]);

        let cpw = heimdal()
            .change_password(&layout, "u@R.TEST", None, Some("aes256-cts"))
            .unwrap();
        assert_eq!(cpw.argv[3..], ["change_password", "--random-key", "-e", "aes256-cts", "u@R.TEST"]);

        let ext = heimdal()
            .extract_keytab(&layout, "host/h@R.TEST", Path::new("/tmp/d-krbtest/keytab"))
            .unwrap();
        assert_eq!(ext.argv[3..], ["ext", "--keytab=/tmp/d-krbtest/keytab", "host/h@R.TEST"]);
    }

    #[test]
    fn test_kinit_reads_password_from_stdin() {
        let inv = heimdal().kinit("u@R.TEST", Some("pw"), &[]).unwrap();
        assert_eq!(inv.argv, vec!["/usr/bin/kinit", "--password-file=STDIN", "u@R.TEST"]);
        assert_eq!(inv.input.as_deref(), Some("pw\n"));

        let no_pw = heimdal().kinit("u@R.TEST", None, &["-k".to_string()]).unwrap();
        assert_eq!(no_pw.argv, vec!["/usr/bin/kinit", "-k", "u@R.TEST"]);
        assert_eq!(no_pw.input, None);
    }

    #[test]
    fn test_listing_commands() {
        let klist = heimdal().klist(Path::new("/c")).unwrap();
        assert_eq!(klist.argv, vec!["/usr/bin/klist", "-c", "/c"]);
        let keytab = heimdal().klist_keytab(Path::new("/k")).unwrap();
        assert_eq!(keytab.argv, vec!["/usr/bin/ktutil", "-k", "/k", "list"]);
    }

    #[test]
    fn test_single_line_query_is_one_argument() {
        let inv = heimdal()
            .run_kadminl(&layout(), &AdminQuery::from("get user@R.TEST"))
            .unwrap();
        assert_eq!(inv.argv.len(), 4);
        assert_eq!(inv.argv[3], "get user@R.TEST");
    }

    #[test]
    fn test_remote_admin_is_unsupported() {
        assert!(matches!(
            heimdal().prep_kadmin(),
            Err(RealmError::Unsupported { operation: "prep_kadmin", .. })
        ));
        assert!(matches!(
            heimdal().run_kadmin(),
            Err(RealmError::Unsupported { operation: "run_kadmin", .. })
        ));
    }

    #[test]
    fn test_daemon_launches() {
        let layout = layout();
        let kdc = heimdal().kdc_launch(&layout, &[]).unwrap();
        assert_eq!(kdc.argv.first().map(String::as_str), Some("/h/kdc"));
        assert_eq!(kdc.argv.last().map(String::as_str), Some("--config-file=/tmp/d-krbtest/krb5.conf"));
        assert_eq!(kdc.readiness, Readiness::log("/tmp/d-krbtest/kdc.log", "KDC started"));

        let kadmind = heimdal().kadmind_launch(&layout).unwrap();
        assert_eq!(
            kadmind.argv[1..],
            ["--config-file=/tmp/d-krbtest/krb5.conf", "--ports=61001"]
        );
        assert_eq!(kadmind.readiness, Readiness::None);
    }
}
