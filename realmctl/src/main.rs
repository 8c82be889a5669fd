//! realmctl
//!
//! Brings up an ephemeral Kerberos realm from the command line:
//! - `probe` reports which toolchain would be used
//! - `up` prints the realm environment and holds the realm until Ctrl+C
//! - `exec` runs one command inside a fresh realm and exits with its code

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::process::Command;

use k5realm::provider::paths::resolve_krb5_config;
use k5realm::{PathOverrides, ProviderKind, Realm, RealmOptions, Section, ToolPaths, ToolchainContext};
use shared::{logging, realm_info, realm_warn};

#[derive(Parser)]
#[command(name = "realmctl")]
#[command(about = "Ephemeral Kerberos realms for integration testing")]
struct Args {
    /// Realm name
    #[arg(long, default_value = k5realm::realm::DEFAULT_REALM)]
    realm: String,

    /// First port of the 10-port block
    #[arg(long, default_value_t = k5realm::realm::DEFAULT_PORT_BASE)]
    port_base: u16,

    /// Force a provider instead of probing krb5-config
    #[arg(long, value_parser = parse_provider)]
    provider: Option<ProviderKind>,

    /// Attach to an existing realm directory instead of creating one
    #[arg(long)]
    existing: Option<PathBuf>,

    /// JSON object deep-merged over the krb5.conf skeleton
    #[arg(long, value_name = "FILE.json")]
    krb5_conf: Option<PathBuf>,

    /// JSON object deep-merged over the kdc.conf skeleton
    #[arg(long, value_name = "FILE.json")]
    kdc_conf: Option<PathBuf>,

    /// Do not start the KDC
    #[arg(long)]
    no_kdc: bool,

    /// Start kadmind
    #[arg(long)]
    kadmind: bool,

    /// Do not fetch initial credentials for the user principal
    #[arg(long)]
    no_creds: bool,

    /// Do not create the user and admin principals
    #[arg(long)]
    no_user: bool,

    /// Do not create the host principal and keytab
    #[arg(long)]
    no_host: bool,

    /// Hostname used in principals and profiles
    #[arg(long)]
    hostname: Option<String>,

    /// Executable override, repeatable
    #[arg(long = "tool", value_name = "NAME=PATH", value_parser = parse_tool)]
    tools: Vec<(String, PathBuf)>,

    /// Seconds to wait for each daemon to report readiness
    #[arg(long, default_value = "120")]
    timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the provider, version and plugin directory that would be used
    Probe,
    /// Bring a realm up, print its environment and wait for Ctrl+C
    Up {
        #[arg(long, value_enum, default_value_t = Format::Shell)]
        format: Format,
    },
    /// Bring a realm up, run a command inside it and tear it down
    Exec {
        #[arg(last = true, required = true, value_name = "CMD")]
        command: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Shell,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    logging::init_tracing_with_level(Some(&args.log_level));

    match &args.command {
        Commands::Probe => probe(&args).await,
        Commands::Up { format } => up(&args, *format).await,
        Commands::Exec { command } => {
            let code = exec(&args, command).await?;
            std::process::exit(code);
        }
    }
}

async fn probe(args: &Args) -> Result<()> {
    let overrides = tool_overrides(args);
    let krb5_config = resolve_krb5_config(&overrides);
    let ctx = ToolchainContext::new();

    let probe = ctx.probe(&krb5_config).await;
    let kind = args.provider.unwrap_or(probe.kind);
    println!("krb5-config: {}", krb5_config.display());
    println!("provider: {kind}");
    println!("version: {}", probe.version.as_deref().unwrap_or("unknown"));
    if kind == ProviderKind::Mit {
        let plugin_dir = ctx.plugin_dir(&krb5_config).await;
        println!(
            "plugin_dir: {}",
            plugin_dir.map_or_else(|| "none".to_string(), |p| p.display().to_string())
        );
    }
    for (tool, path) in ToolPaths::resolve(kind, &overrides).iter() {
        println!("{tool}: {}", path.display());
    }
    Ok(())
}

async fn up(args: &Args, format: Format) -> Result<()> {
    let realm = bring_up(args).await?;

    match format {
        Format::Shell => print!("{}", realm.env().to_shell_exports()),
        Format::Json => println!("{}", serde_json::to_string_pretty(realm.env())?),
    }
    realm_info!(realm.realm(), tmpdir = %realm.tmpdir().display(), "Realm is up, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    realm.stop().await?;
    Ok(())
}

/// Run `command` with the realm environment layered over ours
async fn exec(args: &Args, command: &[String]) -> Result<i32> {
    let Some((program, rest)) = command.split_first() else {
        bail!("no command given");
    };
    let realm = bring_up(args).await?;

    let status = Command::new(program)
        .args(rest)
        .envs(realm.env().iter())
        .status()
        .await;
    let name = realm.realm().to_string();
    let stopped = realm.stop().await;

    let status = status.with_context(|| format!("failed to run `{program}`"))?;
    if let Err(e) = stopped {
        realm_warn!(name, error = %e, "Realm teardown was incomplete");
    }
    Ok(status.code().unwrap_or(1))
}

async fn bring_up(args: &Args) -> Result<Realm> {
    let options = realm_options(args)?;

    match Realm::start(options).await {
        Ok(realm) => Ok(realm),
        Err(failure) => {
            let error = failure.cleanup().await;
            logging::log_error(&args.realm, "bring-up", &error);
            Err(error).context("realm bring-up failed")
        }
    }
}

fn realm_options(args: &Args) -> Result<RealmOptions> {
    let mut builder = RealmOptions::builder()
        .realm(&args.realm)
        .port_base(args.port_base)
        .start_kdc(!args.no_kdc)
        .start_kadmind(args.kadmind)
        .get_creds(!args.no_creds)
        .create_user(!args.no_user)
        .create_host(!args.no_host)
        .readiness_timeout(Duration::from_secs(args.timeout_secs))
        .tool_paths(tool_overrides(args));

    if let Some(kind) = args.provider {
        builder = builder.provider(kind);
    }
    if let Some(dir) = &args.existing {
        builder = builder.existing(dir);
    }
    if let Some(hostname) = &args.hostname {
        builder = builder.hostname(hostname);
    }
    if let Some(path) = &args.krb5_conf {
        builder = builder.krb5_conf(read_section(path)?);
    }
    if let Some(path) = &args.kdc_conf {
        builder = builder.kdc_conf(read_section(path)?);
    }
    Ok(builder.build()?)
}

/// `K5REALM_PATH_*` variables first, then `--tool` flags on top
fn tool_overrides(args: &Args) -> PathOverrides {
    let mut overrides = PathOverrides::from_env();
    for (name, path) in &args.tools {
        overrides.insert(name.clone(), path.clone());
    }
    overrides
}

fn read_section(path: &Path) -> Result<Section> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a profile object", path.display()))
}

fn parse_provider(value: &str) -> Result<ProviderKind, String> {
    value.parse().map_err(|e: k5realm::RealmError| e.to_string())
}

fn parse_tool(value: &str) -> Result<(String, PathBuf), String> {
    PathOverrides::parse_assignment(value).map_err(|e| e.to_string())
}
