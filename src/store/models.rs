use serde::{Deserialize, Serialize};

/// Runtime status of a mirror
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MirrorStatus {
    Active,
    Syncing,
    Error,
}

impl MirrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorStatus::Active => "active",
            MirrorStatus::Syncing => "syncing",
            MirrorStatus::Error => "error",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "active" => Some(MirrorStatus::Active),
            "syncing" => Some(MirrorStatus::Syncing),
            "error" => Some(MirrorStatus::Error),
            _ => None,
        }
    }
}

/// Status of a sync job
///
/// Jobs only move forward: `queued → running → completed | failed`, or
/// `queued → cancelled` when an operator withdraws the request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

/// Why a job was queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOrigin {
    /// Fleet-wide run fired by the cron schedule (or the startup sync)
    Scheduled,
    /// Explicit request by the named operator
    Operator(String),
}

impl TriggerOrigin {
    pub const SCHEDULED: &'static str = "scheduled";

    pub fn as_str(&self) -> &str {
        match self {
            TriggerOrigin::Scheduled => Self::SCHEDULED,
            TriggerOrigin::Operator(name) => name,
        }
    }

    pub fn from_str(value: &str) -> Self {
        if value == Self::SCHEDULED {
            TriggerOrigin::Scheduled
        } else {
            TriggerOrigin::Operator(value.to_string())
        }
    }
}

/// A mirrored upstream tree and its last known sync state
#[derive(Debug, Clone, Serialize)]
pub struct Mirror {
    pub id: i64,
    pub name: String,
    pub mirror_type: String,
    pub upstream_url: String,
    pub local_path: String,
    pub enabled: bool,
    pub status: MirrorStatus,
    pub last_sync_started: Option<i64>, // Unix timestamp
    pub last_sync_completed: Option<i64>, // Unix timestamp
    pub last_sync_error: Option<String>,
    pub total_size_bytes: Option<i64>,
    pub file_count: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One recorded attempt to synchronize one mirror
#[derive(Debug, Clone, Serialize)]
pub struct SyncJob {
    pub id: i64,
    pub mirror_id: i64,
    pub status: JobStatus,
    pub created_at: i64, // Unix timestamp, doubles as the queued time
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub files_transferred: Option<i64>,
    pub bytes_transferred: Option<i64>,
    pub files_deleted: Option<i64>,
    pub rsync_output: Option<String>,
    pub error_message: Option<String>,
    pub triggered_by: Option<String>,
}

impl SyncJob {
    pub fn origin(&self) -> Option<TriggerOrigin> {
        self.triggered_by.as_deref().map(TriggerOrigin::from_str)
    }
}

/// A queued job joined with the mirror it targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: i64,
    pub mirror_id: i64,
    pub created_at: i64,
    pub triggered_by: Option<String>,
    pub mirror_name: String,
    pub upstream_url: String,
    pub local_path: String,
}

/// Mirror provisioned at startup when no row with the same name exists
#[derive(Debug, Clone)]
pub struct NewMirror {
    pub name: String,
    pub mirror_type: String,
    pub upstream_url: String,
    pub local_path: String,
    pub enabled: bool,
}

impl NewMirror {
    pub fn new(
        name: impl Into<String>,
        mirror_type: impl Into<String>,
        upstream_url: impl Into<String>,
        local_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mirror_type: mirror_type.into(),
            upstream_url: upstream_url.into(),
            local_path: local_path.into(),
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Default value written to the settings table on first startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingSeed {
    pub key: String,
    pub value: String,
    pub description: String,
}

impl SettingSeed {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            description: description.into(),
        }
    }
}

/// Terminal outcome of a running job, applied to the job and its mirror
/// in one transaction.
///
/// `None` statistics mean "unknown": the stored column is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub status: JobStatus,
    pub files_transferred: Option<i64>,
    pub bytes_transferred: Option<i64>,
    pub files_deleted: Option<i64>,
    pub output: String,
    pub error: Option<String>,
    pub total_size_bytes: Option<i64>,
    pub file_count: Option<i64>,
}

impl JobCompletion {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
