//! Fake Kerberos toolchains for realm tests
//!
//! Each toolchain is a directory of small `/bin/sh` scripts that speak the
//! command line of MIT krb5 or Heimdal closely enough for the realm
//! lifecycle: they create the files the real tools would, print the same
//! readiness markers, and append every call to `$KRB5RCACHEDIR/fake.log`
//! (the realm directory) so tests can check what ran and in which order.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use k5realm::{PathOverrides, ProviderKind, RealmOptions, RealmOptionsBuilder};
use tempfile::TempDir;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const REALM: &'static str = "TEST.EXAMPLE";
    pub const PORT_BASE: u16 = 61500;
    pub const HOSTNAME: &'static str = "host.test";
    pub const READINESS_TIMEOUT: Duration = Duration::from_secs(10);
    pub const STOP_GRACE: Duration = Duration::from_secs(2);
}

const LOG: &str = r#"echo "$(basename "$0") $*" >> "$KRB5RCACHEDIR/fake.log""#;

const REQUIRE_DB: &str = r#"[ -f "$KRB5RCACHEDIR/db" ] || { echo "$(basename "$0"): cannot open database" >&2; exit 1; }"#;

const KINIT: &str = r#"cache="$KRB5CCNAME"
princ=""
while [ $# -gt 0 ]; do
    case "$1" in
        -c) cache="$2"; shift ;;
        -S) shift ;;
        -*) ;;
        *) princ="$1" ;;
    esac
    shift
done
read -r pw || true
[ -n "$pw" ] || { echo "kinit: no password supplied" >&2; exit 1; }
printf '%s %s\n' "$princ" "$pw" > "$cache"
echo "Authenticated to Kerberos v5"
"#;

const KLIST: &str = r#"cache="$KRB5CCNAME"
keytab=""
while [ $# -gt 0 ]; do
    case "$1" in
        -c) cache="$2"; shift ;;
        -k) keytab="$2"; shift ;;
        -*) ;;
        *) cache="$1" ;;
    esac
    shift
done
if [ -n "$keytab" ]; then
    [ -s "$keytab" ] || { echo "klist: key table $keytab not found" >&2; exit 1; }
    echo "Keytab name: FILE:$keytab"
    cat "$keytab"
    exit 0
fi
[ -s "$cache" ] || { echo "klist: No credentials cache found ($cache)" >&2; exit 1; }
echo "Ticket cache: FILE:$cache"
echo "Default principal: $(cut -d' ' -f1 "$cache")"
"#;

fn mit_scripts() -> Vec<(&'static str, String)> {
    vec![
        (
            "krb5-config",
            r#"case "$1" in
    --version) echo "Kerberos 5 release 1.21.2" ;;
    --prefix) dirname "$0" ;;
    *) exit 1 ;;
esac
"#
            .to_string(),
        ),
        (
            "kdb5_util",
            format!("{LOG}\n[ \"$1\" = create ] && : > \"$KRB5RCACHEDIR/db\" && : > \"$KRB5RCACHEDIR/stash\"\n"),
        ),
        (
            "kadmin.local",
            format!(
                r#"{LOG}
{REQUIRE_DB}
[ "$1" = "-q" ] || exit 2
set -- $2
if [ "$1" = ktadd ]; then
    while [ $# -gt 0 ]; do
        [ "$1" = "-k" ] && printf 'KVNO Principal\n   1 %s\n' "$4" > "$2"
        shift
    done
fi
echo "Authenticating as principal root/admin with password."
"#
            ),
        ),
        (
            "kadmin",
            format!(
                r#"{LOG}
[ "$1" = "-c" ] && [ -s "$2" ] || {{ echo "kadmin: no credentials cache" >&2; exit 1; }}
echo "Authenticating as principal with existing credentials."
"#
            ),
        ),
        (
            "krb5kdc",
            format!("{LOG}\n{REQUIRE_DB}\necho \"krb5kdc: starting...\"\nexec sleep 300\n"),
        ),
        (
            "kadmind",
            format!("{LOG}\n{REQUIRE_DB}\necho \"kadmind: starting...\"\nexec sleep 300\n"),
        ),
        ("kprop", format!("{LOG}\n")),
        ("kinit", format!("{LOG}\n{KINIT}")),
        ("klist", format!("{LOG}\n{KLIST}")),
        (
            "failing-daemon",
            format!("{LOG}\necho \"krb5kdc: cannot bind to port\"\nexit 3\n"),
        ),
    ]
}

fn heimdal_scripts() -> Vec<(&'static str, String)> {
    vec![
        (
            "krb5-config",
            r#"case "$1" in
    --version) echo "heimdal 7.8.0" ;;
    --prefix) dirname "$0" ;;
    *) exit 1 ;;
esac
"#
            .to_string(),
        ),
        (
            "kadmin",
            format!(
                r#"{LOG}
[ "$1" = "--local" ] || {{ echo "kadmin: only local mode is faked" >&2; exit 2; }}
shift
case "$1" in --config-file=*) shift ;; esac
cmd="$1"
shift
case "$cmd" in
    stash)
        for arg in "$@"; do
            case "$arg" in --key-file=*) : > "${{arg#--key-file=}}" ;; esac
        done ;;
    init)
        read -r a || true
        read -r b || true
        : > "$KRB5RCACHEDIR/db" ;;
    ext)
        {REQUIRE_DB}
        for arg in "$@"; do
            case "$arg" in --keytab=*) printf 'Vno  Type  Principal\n  1  aes  %s\n' "$2" > "${{arg#--keytab=}}" ;; esac
        done ;;
    *)
        {REQUIRE_DB} ;;
esac
"#
            ),
        ),
        (
            "kdc",
            format!(
                r#"{LOG}
{REQUIRE_DB}
conf=""
for arg in "$@"; do
    case "$arg" in --config-file=*) conf="${{arg#--config-file=}}" ;; esac
done
[ -n "$conf" ] || exit 2
echo "some chatter on stdout"
echo "KDC started" >> "$(dirname "$conf")/kdc.log"
exec sleep 300
"#
            ),
        ),
        ("kadmind", format!("{LOG}\nexec sleep 300\n")),
        ("kinit", format!("{LOG}\n{KINIT}")),
        ("klist", format!("{LOG}\n{KLIST}")),
        (
            "ktutil",
            format!(
                r#"{LOG}
[ "$1" = "-k" ] && [ -s "$2" ] || {{ echo "ktutil: keytab not found" >&2; exit 1; }}
cat "$2"
"#
            ),
        ),
    ]
}

/// A directory of fake Kerberos executables, removed on drop
///
/// Keep it alive for as long as a realm built from it is running.
pub struct FakeToolchain {
    kind: ProviderKind,
    dir: TempDir,
}

impl FakeToolchain {
    pub fn mit() -> FakeToolchain {
        Self::write(ProviderKind::Mit, mit_scripts())
    }

    pub fn heimdal() -> FakeToolchain {
        Self::write(ProviderKind::Heimdal, heimdal_scripts())
    }

    fn write(kind: ProviderKind, scripts: Vec<(&'static str, String)>) -> Self {
        let dir = tempfile::Builder::new()
            .prefix(&format!("fake-{kind}-"))
            .tempdir()
            .expect("create toolchain dir");
        for (name, body) in scripts {
            let path = dir.path().join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
        }
        Self { kind, dir }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Overrides pointing every executable at this toolchain
    pub fn overrides(&self) -> PathOverrides {
        let mut overrides = PathOverrides::new();
        for entry in fs::read_dir(self.dir.path()).expect("list toolchain") {
            let entry = entry.expect("toolchain entry");
            let name = entry.file_name().to_string_lossy().into_owned();
            overrides.insert(name, entry.path());
        }
        overrides
    }

    /// Realm options wired to this toolchain with the standard test realm
    pub fn options(&self) -> RealmOptionsBuilder {
        RealmOptions::builder()
            .realm(TestFixtures::REALM)
            .port_base(TestFixtures::PORT_BASE)
            .hostname(TestFixtures::HOSTNAME)
            .provider(self.kind)
            .tool_paths(self.overrides())
            .readiness_timeout(TestFixtures::READINESS_TIMEOUT)
            .stop_grace(TestFixtures::STOP_GRACE)
    }
}

/// Lines the fake tools appended to the realm's call log
pub fn fake_log(realm_dir: &Path) -> Vec<String> {
    fs::read_to_string(realm_dir.join("fake.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
