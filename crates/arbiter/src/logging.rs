use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log to stderr and to a daily file under the log directory.
///
/// The returned guard flushes the file writer when dropped, so keep it alive
/// for the life of the process.
pub fn setup_logging(data_dir: &Path) -> Result<WorkerGuard> {
    let log_dir = log_directory(data_dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "arbiter.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    tracing::info!("Log file: {}/arbiter.log", log_dir.display());
    Ok(guard)
}

/// `ARBITER_LOG_DIR`, or `logs/` under the data directory.
fn log_directory(data_dir: &Path) -> PathBuf {
    std::env::var_os("ARBITER_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("logs"))
}
