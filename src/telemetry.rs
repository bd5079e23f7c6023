//! Logging setup: stderr plus an optional daily-rotated file.

use std::path::{Path, PathBuf};

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Environment variable holding an `EnvFilter` directive, e.g. `kedil_admin=debug`.
pub const LOG_ENV: &str = "KEDIL_LOG";

const LOG_FILE_PREFIX: &str = "kedil-admin.log";

/// Keeps the file writer flushing until dropped.
pub struct TelemetryGuard {
  _guard: Option<WorkerGuard>,
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init(verbosity: u8, logging: &LoggingConfig) -> TelemetryGuard {
  let filter = EnvFilter::builder()
    .with_default_directive(level_from_verbosity(verbosity).into())
    .with_env_var(LOG_ENV)
    .from_env_lossy();

  let stderr_layer = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false)
    .compact();

  let mut file_error = None;
  let (file_layer, guard) = if logging.file {
    let dir = resolve_log_dir(logging.directory.as_deref());
    match std::fs::create_dir_all(&dir) {
      Ok(()) => {
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
        (Some(layer), Some(guard))
      }
      Err(e) => {
        file_error = Some(format!("log dir init failed for {}: {}", dir.display(), e));
        (None, None)
      }
    }
  } else {
    (None, None)
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr_layer)
    .with(file_layer)
    .init();

  if let Some(error) = file_error {
    tracing::warn!("{}", error);
  }

  TelemetryGuard { _guard: guard }
}

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
  match verbosity {
    0 => LevelFilter::WARN,
    1 => LevelFilter::INFO,
    2 => LevelFilter::DEBUG,
    _ => LevelFilter::TRACE,
  }
}

fn resolve_log_dir(configured: Option<&Path>) -> PathBuf {
  match configured {
    Some(dir) => dir.to_path_buf(),
    None => dirs::data_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join("kedil-admin")
      .join("logs"),
  }
}
