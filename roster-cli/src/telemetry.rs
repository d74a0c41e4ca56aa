use anyhow::Result;
use std::ffi::OsStr;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber. Logs go to stderr so stdout carries only
/// the run summary. The returned guard must live until exit when a log file
/// is configured.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let pretty_layer = match config.format {
        LogFormat::Pretty => Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        ),
        LogFormat::Json => None,
    };

    let json_layer = match config.format {
        LogFormat::Json => Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false),
        ),
        LogFormat::Pretty => None,
    };

    let (file_layer, guard) = if let Some(log_path) = &config.file {
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let directory = log_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = log_path
            .file_name()
            .unwrap_or_else(|| OsStr::new("roster-sync.log"));

        let file_appender = match config.rotation.as_str() {
            "daily" => rolling::daily(directory, file_name),
            "hourly" => rolling::hourly(directory, file_name),
            _ => rolling::never(directory, file_name),
        };

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .json()
            .with_current_span(true)
            .with_span_list(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
