//! Mirror synchronization service.
//!
//! Runs rsync against configured upstream trees on a cron schedule and on
//! operator request, one transfer at a time, and records every attempt in a
//! SQLite database shared with the management API.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod store;
pub mod transfer;
