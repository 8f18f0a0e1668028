use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins over the configured level.
fn env_filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")))
}

/// Logs to stderr, or to `<log_dir>/<timestamp>.log` when a directory is
/// given. Keep the returned guard alive until exit so buffered lines are
/// flushed.
pub(crate) fn init_tracing(
    level: Option<&str>,
    log_dir: Option<&Path>,
) -> anyhow::Result<(Option<PathBuf>, Option<WorkerGuard>)> {
    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter(level))
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok((None, None));
    };

    std::fs::create_dir_all(log_dir)?;
    let timestamp = chrono::Local::now().format("%Y-%m-%dT%H%M%S").to_string();
    let log_path = log_dir.join(format!("{}.log", timestamp));
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok((Some(log_path), Some(guard)))
}
