//! Structured logging setup.
//!
//! Stdout logging in a selectable format, plus an optional daily-rolling
//! JSON log file written through a non-blocking appender.
//!
//! # Component Targets
//!
//! | Target | Description |
//! |--------|-------------|
//! | `exercise_feed::bus` | Connection manager: connects, backoff, frames |
//! | `exercise_feed::engine` | Classification, inject store, lifecycle |
//! | `exercise_feed::fold` | Command fold engine |
//! | `exercise_feed::session` | Session wiring and publishing |
//!
//! ```bash
//! # Debug only the fold engine
//! RUST_LOG=warn,exercise_feed::fold=debug exercise_feed run
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::{prelude::*, Error};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable format with colors (default for development)
    #[default]
    Pretty,
    /// JSON format (best for log aggregation)
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("Unknown log format '{other}'. Use: pretty, json, compact")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LogConfig {
    /// Base level when RUST_LOG is unset
    #[serde(default = "default_level")]
    pub level: String,

    /// Format for stdout logging
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for the rolling JSON log file; no file when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            log_dir: None,
        }
    }
}

impl LogConfig {
    /// JSON to stdout plus a rolling file under `log_dir`.
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            format: LogFormat::Json,
            log_dir: Some(log_dir),
            ..Default::default()
        }
    }
}

fn base_filter(level: &str, env_filter_override: Option<&str>) -> EnvFilter {
    if let Some(filter) = env_filter_override {
        return EnvFilter::new(filter);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(level);
        for directive in ["tokio_tungstenite=warn", "tungstenite=warn"] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    })
}

/// JSON file layer with its own filter. Without one a layer sees every
/// event from every crate.
fn file_layer<S, W>(writer: W, filter: EnvFilter) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .json()
        .with_filter(filter)
        .boxed()
}

/// Initialize logging.
///
/// The returned guard, when present, must be held for the life of the
/// program or buffered file output is lost.
///
/// ```ignore
/// let _guard = init_logging(&config.logging, None)?;
/// ```
pub fn init_logging(
    config: &LogConfig,
    env_filter_override: Option<&str>,
) -> Result<Option<WorkerGuard>> {
    let filter = base_filter(&config.level, env_filter_override);

    let stdout_layer = match config.format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
        LogFormat::Pretty => fmt::layer().with_target(false).boxed(),
    };

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "exercise-feed.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let filter = base_filter(&config.level, env_filter_override);
            (Some(file_layer(writer, filter)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer.with_filter(filter))
        .with(file)
        .try_init()
        .map_err(|e| Error::config(format!("logging already initialised: {e}")))?;

    Ok(guard)
}

/// Log target constants for component-specific logging.
///
/// ```ignore
/// tracing::debug!(target: targets::FOLD, command = %name, "Folded command");
/// ```
pub mod targets {
    /// Connection manager
    pub const BUS: &str = "exercise_feed::bus";
    /// Classification, inject store, lifecycle
    pub const ENGINE: &str = "exercise_feed::engine";
    /// Command fold engine
    pub const FOLD: &str = "exercise_feed::fold";
    /// Session wiring and publishing
    pub const SESSION: &str = "exercise_feed::session";
}
