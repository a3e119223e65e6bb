//! Logging for the webhook server and the history commands
//!
//! Log lines always go to stderr: `parley history show --json` prints its
//! result on stdout and must stay machine readable. Debug builds log in the
//! pretty format, release builds as one JSON object per line.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Level used when the configured one is not a tracing level
pub const FALLBACK_LEVEL: Level = Level::INFO;

/// sqlx logs every statement and hyper every connection at `info` and below
const NOISY_CRATES: &[&str] = &["sqlx", "hyper", "reqwest"];

/// Parse a level from `--log` or `core.log_level`, case-insensitively
pub fn parse_level(level: &str) -> Option<Level> {
    Level::from_str(level.trim()).ok()
}

/// Filter directives for `level`
///
/// Our crate and the HTTP trace layer follow `level`; the storage and HTTP
/// client crates never log below `warn` unless `level` is stricter.
pub fn filter_directives(level: Level) -> String {
    let quiet = level.min(Level::WARN);
    let lvl = level.as_str().to_lowercase();

    let mut directives = vec![
        lvl.clone(),
        format!("parley_engine={}", lvl),
        format!("tower_http={}", lvl),
    ];
    directives.extend(
        NOISY_CRATES
            .iter()
            .map(|krate| format!("{}={}", krate, quiet.as_str().to_lowercase())),
    );
    directives.join(",")
}

/// Install the global subscriber
///
/// `RUST_LOG` replaces the derived filter entirely. An unknown `log_level`
/// falls back to `info` and is reported once logging is up. Only the first
/// call installs anything.
pub fn init_logging(log_level: &str) {
    let level = parse_level(log_level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(filter_directives(level.unwrap_or(FALLBACK_LEVEL)))
    });

    #[cfg(debug_assertions)]
    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .pretty()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();

    #[cfg(not(debug_assertions))]
    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr),
        )
        .try_init();

    if installed.is_ok() && level.is_none() {
        tracing::warn!(
            "Unknown log level {:?}, using {}",
            log_level,
            FALLBACK_LEVEL
        );
    }
}
