//! File logging. The terminal belongs to the TUI, so nothing goes to stdout.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter directive
pub const LOG_ENV: &str = "KVDASH_LOG";

const DEFAULT_FILTER: &str = "kvdash=info";
const LOG_FILE_PREFIX: &str = "kvdash.log";

/// `<data_dir>/kvdash/logs`
pub fn default_log_dir() -> Option<PathBuf> {
  dirs::data_dir().map(|d| d.join("kvdash").join("logs"))
}

/// Install the global subscriber writing to a daily rolling file in `dir`.
///
/// The returned guard flushes buffered lines on drop and must be held until
/// the process exits.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  tracing_subscriber::registry()
    .with(filter)
    .with(
      fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  tracing::info!(dir = %dir.display(), "logging initialized");
  Ok(guard)
}
