//! Shared logging utilities for consistent tracing across the fixture

use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Crates whose events are shown at the requested level
const FIXTURE_TARGETS: &[&str] = &["k5realm", "realmctl", "shared"];

fn level_filter(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    FIXTURE_TARGETS
        .iter()
        .map(|target| format!("{target}={base_level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the global tracing subscriber with an optional log level
///
/// `RUST_LOG` takes precedence when it is set. Output goes to stderr so
/// stdout stays free for exported environments.
pub fn init_tracing_with_level(log_level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter(log_level)));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize tracing at the default level
pub fn init_tracing() {
    init_tracing_with_level(None);
}

/// Route tracing output through the test harness; safe to call repeatedly
pub fn init_test_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(EnvFilter::new(level_filter(Some("debug"))))
        .with_test_writer()
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for realm-aware info logging
#[macro_export]
macro_rules! realm_info {
    ($realm:expr, $($arg:tt)*) => {
        tracing::info!(
            realm = %$realm,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for realm-aware warning logging
#[macro_export]
macro_rules! realm_warn {
    ($realm:expr, $($arg:tt)*) => {
        tracing::warn!(
            realm = %$realm,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for realm-aware error logging
#[macro_export]
macro_rules! realm_error {
    ($realm:expr, $($arg:tt)*) => {
        tracing::error!(
            realm = %$realm,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for realm-aware debug logging
#[macro_export]
macro_rules! realm_debug {
    ($realm:expr, $($arg:tt)*) => {
        tracing::debug!(
            realm = %$realm,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(realm: &str, details: &str) {
    info!(
        realm = %realm,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(realm: &str, reason: &str) {
    info!(
        realm = %realm,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(realm: &str, context: &str, error: &dyn std::fmt::Display) {
    error!(
        realm = %realm,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}
