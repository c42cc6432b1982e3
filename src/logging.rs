use crate::config::{log_dir, SERVICE_NAME};
use crate::error::AppError;
use std::fs;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_ENV: &str = "COSTBOARD_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn file_writer() -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), AppError> {
    let dir = log_dir()?;
    fs::create_dir_all(&dir)?;
    let appender = tracing_appender::rolling::daily(&dir, format!("{SERVICE_NAME}.log"));
    Ok(tracing_appender::non_blocking(appender))
}

/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init() -> Result<WorkerGuard, AppError> {
    let (writer, guard) = file_writer()?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .with_filter(EnvFilter::new("warn"));

    if let Err(e) = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
    {
        eprintln!("Failed to initialize logging: {e}");
    }
    Ok(guard)
}

pub fn init_tui() -> Result<WorkerGuard, AppError> {
    let (writer, guard) = file_writer()?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter());

    if let Err(e) = tracing_subscriber::registry().with(file_layer).try_init() {
        eprintln!("Failed to initialize logging: {e}");
    }
    Ok(guard)
}
