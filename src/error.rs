use thiserror::Error;

/// Malformed value in the environment-sourced configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Failures talking to the persistent store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Unexpected value in column {column}: {value:?}")]
    Corrupt { column: &'static str, value: String },

    #[error("Blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Store unreachable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },
}

/// Crate-level error taxonomy
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Scheduler iteration panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
