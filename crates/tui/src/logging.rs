use std::{fs, path::PathBuf};

use anyhow::Result;
use directories::BaseDirs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "GPTCLI_LOG";

pub fn log_dir() -> PathBuf {
    match BaseDirs::new() {
        Some(base) => base.data_dir().join("gptcli").join("logs"),
        None => PathBuf::from("logs"),
    }
}

/// Logs go to a daily file so nothing lands on the terminal the UI owns.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init() -> Result<WorkerGuard> {
    let dir = log_dir();
    fs::create_dir_all(&dir)?;
    let appender = tracing_appender::rolling::daily(&dir, "gptcli.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()?;
    Ok(guard)
}
