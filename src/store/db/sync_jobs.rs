use super::StoreDb;
use super::mirrors::MirrorRuntimeChangeset;
use crate::error::StoreError;
use crate::store::schema::mirrors::{self, dsl as mirrors_dsl};
use crate::store::schema::sync_jobs::{self, dsl as sync_jobs_dsl};
use crate::store::{
    JobCompletion, JobStatus, MirrorStatus, QueuedJob, Result, SyncJob, TriggerOrigin,
};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

/// Error recorded on jobs that were running when a previous process died
pub const INTERRUPTED_ERROR: &str = "Sync interrupted: the scheduler stopped before the transfer finished";

impl StoreDb {
    /// Queue a sync of one mirror, returning the new job id
    pub fn enqueue_job(&self, mirror_id: i64, origin: &TriggerOrigin, now: i64) -> Result<i64> {
        let mut conn = self.connection()?;
        insert_queued_job(&mut conn, mirror_id, origin, now)
    }

    /// Queue one job per enabled mirror in a single transaction.
    ///
    /// Returns the new job ids in insertion order.
    pub fn enqueue_for_enabled_mirrors(&self, origin: &TriggerOrigin, now: i64) -> Result<Vec<i64>> {
        let mut conn = self.connection()?;
        conn.transaction::<_, StoreError, _>(|tx_conn| {
            let mirror_ids = mirrors_dsl::mirrors
                .filter(mirrors_dsl::enabled.eq(true))
                .order(mirrors_dsl::id.asc())
                .select(mirrors_dsl::id)
                .load::<i64>(tx_conn)?;

            mirror_ids
                .into_iter()
                .map(|mirror_id| insert_queued_job(tx_conn, mirror_id, origin, now))
                .collect()
        })
    }

    /// Every queued job with its mirror, oldest first
    pub fn queued_jobs(&self) -> Result<Vec<QueuedJob>> {
        let mut conn = self.connection()?;
        let rows = sync_jobs_dsl::sync_jobs
            .inner_join(mirrors::table)
            .filter(sync_jobs_dsl::status.eq(JobStatus::Queued.as_str()))
            .order((sync_jobs_dsl::created_at.asc(), sync_jobs_dsl::id.asc()))
            .select(QueuedJobRow::as_select())
            .load::<QueuedJobRow>(&mut conn)?;

        Ok(rows.into_iter().map(QueuedJob::from).collect())
    }

    /// Move a job from `queued` to `running` and mark its mirror as syncing.
    ///
    /// Both writes share one transaction. Returns false without touching the
    /// mirror when the job is no longer queued (cancelled or already claimed).
    pub fn claim_job(&self, job_id: i64, mirror_id: i64, now: i64) -> Result<bool> {
        let mut conn = self.connection()?;
        conn.transaction::<_, StoreError, _>(|tx_conn| {
            let claimed = diesel::update(
                sync_jobs_dsl::sync_jobs
                    .filter(sync_jobs_dsl::id.eq(job_id))
                    .filter(sync_jobs_dsl::status.eq(JobStatus::Queued.as_str())),
            )
            .set((
                sync_jobs_dsl::status.eq(JobStatus::Running.as_str()),
                sync_jobs_dsl::started_at.eq(now),
            ))
            .execute(tx_conn)?;

            if claimed == 0 {
                return Ok(false);
            }

            diesel::update(mirrors_dsl::mirrors.find(mirror_id))
                .set(MirrorRuntimeChangeset {
                    status: Some(MirrorStatus::Syncing.as_str().to_string()),
                    last_sync_started: Some(now),
                    updated_at: Some(now),
                    ..Default::default()
                })
                .execute(tx_conn)?;

            Ok(true)
        })
    }

    /// Record the terminal outcome of a running job on the job and its mirror.
    ///
    /// On success the mirror becomes active, its completion time advances and
    /// its error is cleared; size and file count are only overwritten when
    /// known. On failure the mirror keeps its last completion time and
    /// cumulative statistics. Returns false when the job was not running.
    pub fn finish_job(
        &self,
        job_id: i64,
        mirror_id: i64,
        completion: &JobCompletion,
        now: i64,
    ) -> Result<bool> {
        let mut conn = self.connection()?;
        conn.transaction::<_, StoreError, _>(|tx_conn| {
            let finished = diesel::update(
                sync_jobs_dsl::sync_jobs
                    .filter(sync_jobs_dsl::id.eq(job_id))
                    .filter(sync_jobs_dsl::status.eq(JobStatus::Running.as_str())),
            )
            .set(JobCompletionChangeset {
                status: completion.status.as_str().to_string(),
                completed_at: now,
                files_transferred: completion.files_transferred,
                bytes_transferred: completion.bytes_transferred,
                files_deleted: completion.files_deleted,
                rsync_output: Some(completion.output.clone()),
                error_message: completion.error.clone(),
            })
            .execute(tx_conn)?;

            if finished == 0 {
                return Ok(false);
            }

            let changeset = if completion.succeeded() {
                MirrorRuntimeChangeset {
                    status: Some(MirrorStatus::Active.as_str().to_string()),
                    last_sync_completed: Some(now),
                    last_sync_error: Some(None),
                    total_size_bytes: completion.total_size_bytes,
                    file_count: completion.file_count,
                    updated_at: Some(now),
                    ..Default::default()
                }
            } else {
                MirrorRuntimeChangeset {
                    status: Some(MirrorStatus::Error.as_str().to_string()),
                    last_sync_error: Some(completion.error.clone()),
                    updated_at: Some(now),
                    ..Default::default()
                }
            };

            diesel::update(mirrors_dsl::mirrors.find(mirror_id))
                .set(changeset)
                .execute(tx_conn)?;

            Ok(true)
        })
    }

    /// Withdraw a job that has not started yet
    pub fn cancel_queued_job(&self, job_id: i64, now: i64) -> Result<bool> {
        let mut conn = self.connection()?;
        let cancelled = diesel::update(
            sync_jobs_dsl::sync_jobs
                .filter(sync_jobs_dsl::id.eq(job_id))
                .filter(sync_jobs_dsl::status.eq(JobStatus::Queued.as_str())),
        )
        .set((
            sync_jobs_dsl::status.eq(JobStatus::Cancelled.as_str()),
            sync_jobs_dsl::completed_at.eq(now),
        ))
        .execute(&mut conn)?;
        Ok(cancelled > 0)
    }

    /// Fail jobs left `running` by a process that died mid-transfer.
    ///
    /// Their mirrors move from `syncing` to `error`; last completion time and
    /// cumulative statistics are left alone. Returns the number of jobs failed.
    pub fn recover_interrupted_jobs(&self, now: i64) -> Result<usize> {
        let mut conn = self.connection()?;
        conn.transaction::<_, StoreError, _>(|tx_conn| {
            let stranded = sync_jobs_dsl::sync_jobs
                .filter(sync_jobs_dsl::status.eq(JobStatus::Running.as_str()))
                .select((sync_jobs_dsl::id, sync_jobs_dsl::mirror_id))
                .load::<(i64, i64)>(tx_conn)?;

            for (job_id, mirror_id) in &stranded {
                diesel::update(sync_jobs_dsl::sync_jobs.find(*job_id))
                    .set((
                        sync_jobs_dsl::status.eq(JobStatus::Failed.as_str()),
                        sync_jobs_dsl::completed_at.eq(now),
                        sync_jobs_dsl::error_message.eq(INTERRUPTED_ERROR),
                    ))
                    .execute(tx_conn)?;

                diesel::update(
                    mirrors_dsl::mirrors
                        .find(*mirror_id)
                        .filter(mirrors_dsl::status.eq(MirrorStatus::Syncing.as_str())),
                )
                .set(MirrorRuntimeChangeset {
                    status: Some(MirrorStatus::Error.as_str().to_string()),
                    last_sync_error: Some(Some(INTERRUPTED_ERROR.to_string())),
                    updated_at: Some(now),
                    ..Default::default()
                })
                .execute(tx_conn)?;
            }

            Ok(stranded.len())
        })
    }

    pub fn get_job(&self, job_id: i64) -> Result<Option<SyncJob>> {
        let mut conn = self.connection()?;
        let row = sync_jobs_dsl::sync_jobs
            .find(job_id)
            .select(SyncJobRow::as_select())
            .first::<SyncJobRow>(&mut conn)
            .optional()?;

        row.map(SyncJob::try_from).transpose()
    }

    /// Job history for a mirror, newest first
    pub fn jobs_for_mirror(&self, mirror_id: i64, limit: i64) -> Result<Vec<SyncJob>> {
        let mut conn = self.connection()?;
        let rows = sync_jobs_dsl::sync_jobs
            .filter(sync_jobs_dsl::mirror_id.eq(mirror_id))
            .order((sync_jobs_dsl::created_at.desc(), sync_jobs_dsl::id.desc()))
            .limit(limit)
            .select(SyncJobRow::as_select())
            .load::<SyncJobRow>(&mut conn)?;

        rows.into_iter().map(SyncJob::try_from).collect()
    }

    /// Number of jobs currently in `status`
    pub fn count_jobs_with_status(&self, status: JobStatus) -> Result<i64> {
        let mut conn = self.connection()?;
        let count = sync_jobs_dsl::sync_jobs
            .filter(sync_jobs_dsl::status.eq(status.as_str()))
            .count()
            .get_result::<i64>(&mut conn)?;
        Ok(count)
    }
}

fn insert_queued_job(
    conn: &mut SqliteConnection,
    mirror_id: i64,
    origin: &TriggerOrigin,
    now: i64,
) -> Result<i64> {
    let job_id = diesel::insert_into(sync_jobs::table)
        .values(NewSyncJobRow {
            mirror_id,
            status: JobStatus::Queued.as_str(),
            created_at: now,
            triggered_by: origin.as_str(),
        })
        .returning(sync_jobs_dsl::id)
        .get_result::<i64>(conn)?;
    Ok(job_id)
}

// =========================================================================
// Row Types
// =========================================================================

#[derive(Queryable, Selectable)]
#[diesel(table_name = sync_jobs)]
struct SyncJobRow {
    id: i64,
    mirror_id: i64,
    status: String,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    files_transferred: Option<i64>,
    bytes_transferred: Option<i64>,
    files_deleted: Option<i64>,
    rsync_output: Option<String>,
    error_message: Option<String>,
    triggered_by: Option<String>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = sync_jobs)]
struct QueuedJobRow {
    #[diesel(select_expression = sync_jobs::id)]
    job_id: i64,
    #[diesel(select_expression = sync_jobs::mirror_id)]
    mirror_id: i64,
    #[diesel(select_expression = sync_jobs::created_at)]
    created_at: i64,
    #[diesel(select_expression = sync_jobs::triggered_by)]
    triggered_by: Option<String>,
    #[diesel(select_expression = mirrors::name)]
    mirror_name: String,
    #[diesel(select_expression = mirrors::upstream_url)]
    upstream_url: String,
    #[diesel(select_expression = mirrors::local_path)]
    local_path: String,
}

#[derive(Insertable)]
#[diesel(table_name = sync_jobs)]
struct NewSyncJobRow<'a> {
    mirror_id: i64,
    status: &'a str,
    created_at: i64,
    triggered_by: &'a str,
}

#[derive(AsChangeset)]
#[diesel(table_name = sync_jobs)]
struct JobCompletionChangeset {
    status: String,
    completed_at: i64,
    files_transferred: Option<i64>,
    bytes_transferred: Option<i64>,
    files_deleted: Option<i64>,
    rsync_output: Option<String>,
    error_message: Option<String>,
}

impl From<QueuedJobRow> for QueuedJob {
    fn from(row: QueuedJobRow) -> Self {
        QueuedJob {
            job_id: row.job_id,
            mirror_id: row.mirror_id,
            created_at: row.created_at,
            triggered_by: row.triggered_by,
            mirror_name: row.mirror_name,
            upstream_url: row.upstream_url,
            local_path: row.local_path,
        }
    }
}

impl TryFrom<SyncJobRow> for SyncJob {
    type Error = StoreError;

    fn try_from(row: SyncJobRow) -> Result<Self> {
        let status = JobStatus::from_str(&row.status).ok_or(StoreError::Corrupt {
            column: "sync_jobs.status",
            value: row.status.clone(),
        })?;

        Ok(SyncJob {
            id: row.id,
            mirror_id: row.mirror_id,
            status,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            files_transferred: row.files_transferred,
            bytes_transferred: row.bytes_transferred,
            files_deleted: row.files_deleted,
            rsync_output: row.rsync_output,
            error_message: row.error_message,
            triggered_by: row.triggered_by,
        })
    }
}
