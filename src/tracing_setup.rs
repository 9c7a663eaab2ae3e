use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{GatewayConfig, LogFormat};

/// Logging settings handed to [`init_tracing`]; nothing else in the crate
/// reads or changes the level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            include_spans: true,
        }
    }
}

impl LogConfig {
    pub fn from_gateway(config: &GatewayConfig) -> Self {
        Self {
            level: config.log_level.clone(),
            format: config.log_format,
            ..Self::default()
        }
    }

    /// `RUST_LOG` when set, the configured level otherwise.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level)
                .wrap_err_with(|| format!("Invalid log level: {}", self.level)),
        }
    }
}

/// Install the global subscriber described by `config`.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let env_filter = config.env_filter()?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(config.include_spans)
                    .with_span_list(config.include_spans),
            )
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?,
        LogFormat::Pretty => Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?,
    }

    tracing::info!(
        level = %config.level,
        format = ?config.format,
        "Waypoint logging initialized"
    );
    Ok(())
}
