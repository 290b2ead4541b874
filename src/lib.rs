//! consultsync Library
//!
//! Session synchronization for a two-terminal consultation: an operator
//! console drives a customer display over a shared session channel, with
//! screen navigation, comparison selection and modal overlays kept in step.

pub mod channel;
pub mod cli;
pub mod config;
pub mod demo;
pub mod display;
pub mod event;
pub mod metrics;
pub mod modal;
pub mod operator;
pub mod session;

use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

/// Initialize tracing subscriber for logging.
///
/// With a log file, output goes to a daily rolling file only so interactive
/// terminals stay readable; otherwise it goes to stderr. Keep the returned
/// guard alive until exit or buffered lines are lost.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("consultsync={}", level).into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(directory)?;

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = log_file
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    Ok(guard)
}
