//! Log subscriber setup for the daemon.
//!
//! `RUST_LOG` wins over the configured level when it is set.

use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingOutputFormat {
    Pretty,
    #[default]
    Compact,
    /// One JSON object per line, for log shippers.
    Json,
}

impl FromStr for TracingOutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for the schedsync crates when `RUST_LOG` is unset.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Adds file and line to each record.
    pub include_location: bool,
    /// Logs span creation and close.
    pub include_span_events: bool,
}

impl TracingConfig {
    /// Running under a service manager.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Json,
            include_location: false,
            include_span_events: true,
        }
    }

    /// Running in a terminal with `--debug`.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            format: TracingOutputFormat::Pretty,
            include_location: true,
            include_span_events: false,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    fn directive(&self) -> String {
        format!("schedsync={}", self.level)
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.include_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_span_events(span_events);

        match self.format {
            TracingOutputFormat::Pretty => layer.pretty().boxed(),
            TracingOutputFormat::Compact => layer.compact().boxed(),
            TracingOutputFormat::Json => layer.json().boxed(),
        }
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directive()));
    let subscriber = tracing_subscriber::registry()
        .with(config.layer())
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
