//! Logging setup
//!
//! The beacon never writes to the page's own output. When logging is on,
//! records go to `$XDG_STATE_HOME/pagebeacon/pagebeacon.log`.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LogRotation, LoggingConfig};

/// Targets capped at `warn` unless the level names them explicitly
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls"];

/// Install the file subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    let log_path = Config::log_path();
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pagebeacon.log".to_string());
    let appender = RollingFileAppender::new(rotation(config.rotation), &log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!(
        log_file = %log_path.display(),
        level = %config.level,
        rotation = ?config.rotation,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Subscriber for tests; output is captured by the test harness.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Flushes pending log writes when dropped
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

pub fn log_file_path() -> PathBuf {
    Config::log_path()
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// Expand the configured level into filter directives.
fn filter_directives(level: &str) -> String {
    let mut directives = level.trim().to_string();
    for target in QUIET_TARGETS {
        let named = level
            .split(',')
            .any(|d| d.split('=').next().map(str::trim) == Some(*target));
        if !named {
            directives.push_str(&format!(",{}=warn", target));
        }
    }
    directives
}
