use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Configuration for the logging system
pub struct LogConfig {
    /// Directory for rotated JSON log files; `None` logs to stdout only
    pub log_dir: Option<PathBuf>,
    /// Prefix for log file names
    pub file_prefix: String,
    /// Maximum number of log files to keep (rotation)
    pub max_files: usize,
    /// Filter used when `RUST_LOG` is not set
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            file_prefix: "mirror-sync".to_string(),
            max_files: 5,
            default_level: "info".to_string(),
        }
    }
}

/// Initialize the logging system
///
/// This sets up:
/// - Stdout logging, human-readable
/// - Optional JSON file logging with daily rotation
/// - Levels from `RUST_LOG`, falling back to the configured level
///
/// # Log Targets
/// - `main` - Process lifecycle
/// - `config` - Configuration loading
/// - `store` - Database and migrations
/// - `transfer` - rsync subprocesses
/// - `transfer::stats` - Statistics parsing
/// - `scheduler` - Scheduler loop
/// - `scheduler::worker` - Job execution
/// - `scheduler::settings` - Runtime settings reloads
/// - `api::health` - Health check endpoint
///
/// # Example
/// ```bash
/// # Trace the job worker, keep everything else at info
/// RUST_LOG=info,scheduler::worker=trace mirror-sync
/// ```
pub fn init_logging(config: LogConfig) -> Result<LogGuard> {
    let env_filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.default_level))
            .context("Invalid log level")
    };

    let (file_layer, worker_guard) = match &config.log_dir {
        Some(log_dir) => {
            // Ensure log directory exists
            std::fs::create_dir_all(log_dir).context("Failed to create log directory")?;

            // Create file appender with rotation
            let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix(&config.file_prefix)
                .filename_suffix("log")
                .max_log_files(config.max_files)
                .build(log_dir)
                .context("Failed to create file appender")?;

            // IMPORTANT: The guard MUST be kept alive for the entire application lifetime
            let (non_blocking_file, worker_guard) = tracing_appender::non_blocking(file_appender);

            // Create file layer (JSON format for structured logging)
            let file_layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_filter(env_filter()?);

            (Some(file_layer), Some(worker_guard))
        }
        None => (None, None),
    };

    // Create stdout layer (human-readable)
    let stdout_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .with_ansi(false)
        .with_filter(env_filter()?);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .init();

    match &config.log_dir {
        Some(log_dir) => tracing::info!(
            target: "main",
            log_dir = %log_dir.display(),
            max_files = config.max_files,
            "Logging system initialized"
        ),
        None => tracing::info!(target: "main", "Logging system initialized (stdout only)"),
    }

    Ok(LogGuard {
        _worker_guard: worker_guard,
    })
}

/// Guard that ensures logs are flushed before exit
pub struct LogGuard {
    _worker_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        tracing::info!(target: "main", "Flushing logs before shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert_eq!(config.file_prefix, "mirror-sync");
        assert_eq!(config.max_files, 5);
        assert_eq!(config.log_dir, None);
        assert_eq!(config.default_level, "info");
    }

    #[test]
    fn test_log_directory_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let config = LogConfig {
            log_dir: Some(log_dir.clone()),
            file_prefix: "test".to_string(),
            max_files: 3,
            default_level: "debug".to_string(),
        };

        let result = init_logging(config);
        assert!(result.is_ok());
        assert!(log_dir.exists());

        // Keep the guard alive during test
        let _guard = result.unwrap();
    }
}
