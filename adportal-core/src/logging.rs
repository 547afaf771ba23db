//! Unified logging system
//!
//! Provides structured logging with configurable output for every adportal
//! binary. Library crates only emit `tracing` events; the hosting shell calls
//! [`init_logging`] once at startup.

use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Whether to include file and line information
    pub include_location: bool,
    /// Whether to include thread information
    pub include_thread: bool,
    /// Whether to log to file
    pub log_to_file: bool,
    /// Log file path (if log_to_file is true)
    pub log_file_path: Option<String>,
    /// Whether to emit span close events with their duration
    pub enable_span_events: bool,
    /// Custom filter directives
    pub filter_directives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            include_thread: false,
            log_to_file: false,
            log_file_path: None,
            enable_span_events: false,
            filter_directives: vec![
                "adportal_core=info".to_string(),
                "adportal_client=info".to_string(),
                "adportal_session=info".to_string(),
            ],
        }
    }
}

/// Install one formatting layer on the registry, writing to stderr or a file
macro_rules! install_layer {
    ($registry:expr, $layer:expr, $config:expr) => {{
        let layer = $layer
            .with_span_events(if $config.enable_span_events {
                FmtSpan::CLOSE
            } else {
                FmtSpan::NONE
            })
            .with_file($config.include_location)
            .with_line_number($config.include_location)
            .with_thread_ids($config.include_thread)
            .with_thread_names($config.include_thread);

        if $config.log_to_file {
            let Some(log_path) = &$config.log_file_path else {
                return Err("log_file_path must be specified when log_to_file is true".into());
            };
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?;
            $registry
                .with(layer.with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()?;
        } else {
            $registry.with(layer.with_writer(io::stderr)).try_init()?;
        }
    }};
}

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to
/// stderr so that command output on stdout stays clean.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // Add custom filter directives
    for directive in &config.filter_directives {
        filter = filter.add_directive(directive.parse()?);
    }

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => install_layer!(registry, fmt::layer().json(), config),
        LogFormat::Pretty => install_layer!(registry, fmt::layer().pretty(), config),
        LogFormat::Compact => install_layer!(registry, fmt::layer().compact(), config),
    }

    Ok(())
}

/// Logging macros for common patterns
#[macro_export]
macro_rules! log_operation_start {
    ($operation:expr) => {
        tracing::info!(
            operation = $operation,
            "Starting operation"
        );
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info!(
            operation = $operation,
            $($field)*,
            "Starting operation"
        );
    };
}

#[macro_export]
macro_rules! log_operation_success {
    ($operation:expr) => {
        tracing::info!(
            operation = $operation,
            "Operation completed successfully"
        );
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info!(
            operation = $operation,
            $($field)*,
            "Operation completed successfully"
        );
    };
}

#[macro_export]
macro_rules! log_operation_error {
    ($operation:expr, $error:expr) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            "Operation failed"
        );
    };
    ($operation:expr, $error:expr, $($field:tt)*) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            $($field)*,
            "Operation failed"
        );
    };
}
