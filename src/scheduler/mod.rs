//! Sync scheduling: cron expressions, runtime settings, the job worker and
//! the scheduler loop that ties them together.

mod cron;
mod manager;
mod models;
pub mod settings;
mod worker;

pub use cron::{CronError, CronExpr};
pub use manager::{Scheduler, SchedulerConfig};
pub use models::SchedulerContext;
pub use settings::RuntimeSettings;
