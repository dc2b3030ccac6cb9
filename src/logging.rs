//! Diagnostics for the sidecar.
//!
//! stdout carries the request/response protocol, so every event goes to
//! stderr. `RUST_LOG` takes precedence over the configured level.

use std::io;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub with_timestamps: bool,
    pub with_target: bool,
    pub with_ansi: bool,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            with_timestamps: true,
            with_target: false,
            with_ansi: false,
            format: LogFormat::default(),
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Parses `error|warn|info|debug|trace`, case-insensitive.
pub fn parse_level(raw: &str) -> Result<Level, String> {
    raw.trim()
        .parse::<Level>()
        .map_err(|_| format!("unknown log level {raw:?}"))
}

pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    init_logging_with_writer(config, io::stderr)
}

pub fn init_logging_with_writer<W>(config: &LogConfig, writer: W) -> anyhow::Result<()>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = build_env_filter(config.level);
    match config.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(config.with_target);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()?;
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target);
            if config.with_timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init()?;
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.without_time())
                    .try_init()?;
            }
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target);
            if config.with_timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init()?;
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.without_time())
                    .try_init()?;
            }
        }
    }
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    let level_str = level.as_str().to_lowercase();
    // Dependencies stay at warn.
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,admissiond={level_str}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("INFO"), Ok(Level::INFO));
        assert_eq!(parse_level(" debug "), Ok(Level::DEBUG));
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn builder_overrides_defaults() {
        let cfg = LogConfig::default()
            .with_level(Level::WARN)
            .with_format(LogFormat::Json);
        assert_eq!(cfg.level, Level::WARN);
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.with_ansi);
    }
}
