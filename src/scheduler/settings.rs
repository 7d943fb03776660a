use super::cron::CronExpr;
use crate::config::{SyncConfig, parse_bool};
use crate::store::SettingSeed;
use std::collections::HashMap;
use std::time::Duration;

pub const SYNC_SCHEDULE: &str = "sync_schedule";
pub const SYNC_BANDWIDTH_LIMIT: &str = "sync_bandwidth_limit";
pub const SYNC_TIMEOUT: &str = "sync_timeout";
pub const SYNC_ON_STARTUP: &str = "sync_on_startup";

/// Operator-tunable values the scheduler re-reads while running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub schedule: CronExpr,
    /// KB/s, 0 = unlimited
    pub bandwidth_limit_kbs: u32,
    pub timeout: Duration,
    pub sync_on_startup: bool,
}

impl RuntimeSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            schedule: config.schedule.clone(),
            bandwidth_limit_kbs: config.bandwidth_limit_kbs,
            timeout: config.timeout,
            sync_on_startup: config.sync_on_startup,
        }
    }

    /// Rows written to the settings table on first startup
    pub fn seeds(&self) -> Vec<SettingSeed> {
        vec![
            SettingSeed::new(
                SYNC_SCHEDULE,
                self.schedule.as_str(),
                "Cron expression (UTC) for full mirror syncs",
            ),
            SettingSeed::new(
                SYNC_BANDWIDTH_LIMIT,
                self.bandwidth_limit_kbs.to_string(),
                "Bandwidth limit per transfer in KB/s (0 = unlimited)",
            ),
            SettingSeed::new(
                SYNC_TIMEOUT,
                self.timeout.as_secs().to_string(),
                "Transfer I/O timeout in seconds",
            ),
            SettingSeed::new(
                SYNC_ON_STARTUP,
                self.sync_on_startup.to_string(),
                "Run a full sync when the service starts",
            ),
        ]
    }

    /// Overlay values read from the settings table.
    ///
    /// Absent or malformed entries keep the current value. Returns whether
    /// the schedule changed.
    pub fn apply(&mut self, values: &HashMap<String, String>) -> bool {
        let mut schedule_changed = false;

        if let Some(raw) = values.get(SYNC_SCHEDULE) {
            match CronExpr::parse(raw) {
                Ok(schedule) if schedule != self.schedule => {
                    tracing::info!(
                        target: "scheduler::settings",
                        old = %self.schedule,
                        new = %schedule,
                        "Sync schedule changed"
                    );
                    self.schedule = schedule;
                    schedule_changed = true;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        target: "scheduler::settings",
                        value = %raw,
                        error = %e,
                        keeping = %self.schedule,
                        "Ignoring invalid sync schedule"
                    );
                }
            }
        }

        if let Some(limit) = parse_setting(values, SYNC_BANDWIDTH_LIMIT, |v| v.parse::<u32>().ok()) {
            self.bandwidth_limit_kbs = limit;
        }

        if let Some(secs) = parse_setting(values, SYNC_TIMEOUT, |v| v.parse::<u64>().ok()) {
            self.timeout = Duration::from_secs(secs);
        }

        if let Some(flag) = parse_setting(values, SYNC_ON_STARTUP, parse_bool) {
            self.sync_on_startup = flag;
        }

        schedule_changed
    }
}

fn parse_setting<T>(
    values: &HashMap<String, String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = values.get(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        tracing::debug!(target: "scheduler::settings", key, value = %raw, "Ignoring malformed setting");
    }
    parsed
}
