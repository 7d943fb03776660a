//! Persistent job, mirror and settings storage.
//!
//! This module is the single definition of the shared schema: the embedded
//! migrations under `migrations/` create the tables, `schema` mirrors them
//! for Diesel, and every read or write the scheduler performs goes through
//! [`StoreDb`].

mod db;
mod models;
pub mod schema;

pub use db::{INTERRUPTED_ERROR, StoreDb};
pub use models::{
    JobCompletion, JobStatus, Mirror, MirrorStatus, NewMirror, QueuedJob, SettingSeed, SyncJob,
    TriggerOrigin,
};

pub type Result<T> = std::result::Result<T, crate::error::StoreError>;

/// Current time as a UTC Unix timestamp, the unit of every time column
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
