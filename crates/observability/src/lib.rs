// crates/observability/src/lib.rs
//! Logging setup for the stemsmith binaries.
//!
//! `RUST_LOG` wins when set. Otherwise the filter is `warn,stemsmith=info`,
//! raised to debug/trace for the stemsmith crates by `-v`/`-vv`.

use std::path::PathBuf;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const LOG_FILE_PREFIX: &str = "stemsmith.log";

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// 0 = info, 1 = debug, 2+ = trace (stemsmith crates only).
    pub verbosity: u8,
    /// JSON lines on stderr instead of the compact human format.
    pub json: bool,
    /// Also write JSON logs to a daily rolling file in this directory.
    pub file_dir: Option<PathBuf>,
}

impl LogConfig {
    /// Log file directory under the app cache dir, if one exists.
    pub fn default_file_dir() -> Option<PathBuf> {
        stemsmith_core::paths::log_dir()
    }
}

/// Keeps the non-blocking file writer alive. Hold it until exit or buffered
/// lines are lost.
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,stemsmith=info",
        1 => "warn,stemsmith=debug",
        _ => "warn,stemsmith=trace",
    }
}

fn build_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)))
}

/// Install the global subscriber. Fails if one is already installed or the
/// log directory cannot be created.
pub fn init_logging(config: LogConfig) -> anyhow::Result<LogGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);
    layers.push(if config.json {
        stderr.json().boxed()
    } else {
        stderr.compact().boxed()
    });

    let mut file_guard = None;
    if let Some(dir) = &config.file_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(build_filter(config.verbosity))
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(LogGuard { _file: file_guard })
}
