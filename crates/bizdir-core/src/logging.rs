//! Tracing subscriber setup.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogConfig, paths};

/// Environment variable holding a filter directive that overrides config.
pub const LOG_ENV: &str = "BIZDIR_LOG";

const LOG_FILE_NAME: &str = "bizdir.log";

/// Keeps the file writer alive. Buffered lines are flushed on drop.
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

/// Picks the filter: `BIZDIR_LOG`, then the configured directive, then `warn`.
pub fn resolve_filter(config: &LogConfig) -> EnvFilter {
    if let Ok(directive) = std::env::var(LOG_ENV)
        && let Ok(filter) = EnvFilter::try_new(directive.trim())
    {
        return filter;
    }
    EnvFilter::try_new(config.filter.trim()).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Installs the global subscriber. Later calls are no-ops.
///
/// # Errors
/// Returns an error if the log directory cannot be created.
pub fn init(config: &LogConfig) -> Result<LogGuard> {
    if config.file {
        init_file(config, &paths::logs_dir())
    } else {
        let _ = fmt()
            .with_env_filter(resolve_filter(config))
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
        Ok(LogGuard { _worker: None })
    }
}

fn init_file(config: &LogConfig, dir: &Path) -> Result<LogGuard> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = fmt()
        .with_env_filter(resolve_filter(config))
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Ok(LogGuard {
        _worker: Some(guard),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_filter_falls_back() {
        let config = LogConfig {
            filter: "bizdir=loud".into(),
            file: false,
        };
        if std::env::var_os(LOG_ENV).is_some() {
            return;
        }
        assert_eq!(resolve_filter(&config).to_string(), "warn");
    }

    #[test]
    fn test_file_sink_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let config = LogConfig {
            filter: "debug".into(),
            file: true,
        };

        let _guard = init_file(&config, &logs).unwrap();
        assert!(logs.is_dir());
    }
}
