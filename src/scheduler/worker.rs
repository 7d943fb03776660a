use super::models::SchedulerContext;
use super::settings::RuntimeSettings;
use crate::store::{self, JobCompletion, JobStatus, QueuedJob, StoreDb, now_timestamp};
use crate::transfer::{Transfer, TransferOutcome, TransferRequest};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

/// Characters of transfer output kept on a job
pub const MAX_OUTPUT_CHARS: usize = 10_000;
/// Characters of output kept as the job and mirror error
pub const MAX_ERROR_CHARS: usize = 1_000;

/// What happened to a queued job handed to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRun {
    /// The job left `queued` before it could be claimed
    Skipped,
    Finished(JobStatus),
}

/// Drive one queued job through `running` to a terminal state
pub async fn run_job<T: Transfer>(
    db: &StoreDb,
    transfer: &T,
    ctx: &SchedulerContext,
    settings: &RuntimeSettings,
    job: &QueuedJob,
) -> store::Result<JobRun> {
    let (job_id, mirror_id) = (job.job_id, job.mirror_id);

    let claimed = db
        .interact(move |db| db.claim_job(job_id, mirror_id, now_timestamp()))
        .await?;
    if !claimed {
        tracing::debug!(target: "scheduler::worker", job_id, "Job is no longer queued, skipping");
        return Ok(JobRun::Skipped);
    }

    tracing::info!(
        target: "scheduler::worker",
        job_id,
        mirror = %job.mirror_name,
        triggered_by = job.triggered_by.as_deref().unwrap_or("unknown"),
        "Starting sync job"
    );

    let request = TransferRequest {
        label: job.mirror_name.clone(),
        source: job.upstream_url.clone(),
        destination: PathBuf::from(&job.local_path),
        timeout: settings.timeout,
        bandwidth_limit_kbs: settings.bandwidth_limit_kbs,
    };
    // A panicking transfer still has to leave the job in a terminal state
    let outcome = AssertUnwindSafe(transfer.execute(&request, ctx.slot()))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            tracing::error!(target: "scheduler::worker", job_id, error = %message, "Transfer panicked");
            TransferOutcome::failed_to_launch(format!("Transfer panicked: {message}"))
        });
    let completion = completion_from(&outcome);
    let status = completion.status;

    let recorded = db
        .interact(move |db| db.finish_job(job_id, mirror_id, &completion, now_timestamp()))
        .await?;
    if !recorded {
        tracing::warn!(target: "scheduler::worker", job_id, "Job was no longer running when its outcome was recorded");
    }

    match status {
        JobStatus::Completed => {
            tracing::info!(target: "scheduler::worker", job_id, mirror = %job.mirror_name, "Sync job completed")
        }
        _ => {
            tracing::error!(target: "scheduler::worker", job_id, mirror = %job.mirror_name, "Sync job failed")
        }
    }

    Ok(JobRun::Finished(status))
}

/// Map a transfer outcome onto the values persisted for the job
pub fn completion_from(outcome: &TransferOutcome) -> JobCompletion {
    let stats = &outcome.stats;
    let output = tail_chars(&outcome.output, MAX_OUTPUT_CHARS).to_string();

    let (status, error, total_size_bytes, file_count) = if outcome.success {
        (
            JobStatus::Completed,
            None,
            stats.total_size.and_then(to_i64),
            stats.total_files.and_then(to_i64),
        )
    } else {
        let tail = tail_chars(outcome.output.trim_end(), MAX_ERROR_CHARS);
        let error = if tail.is_empty() {
            "Transfer failed without output".to_string()
        } else {
            tail.to_string()
        };
        (JobStatus::Failed, Some(error), None, None)
    };

    JobCompletion {
        status,
        files_transferred: stats.files_transferred.and_then(to_i64),
        bytes_transferred: stats.bytes_transferred.and_then(to_i64),
        files_deleted: stats.files_deleted.and_then(to_i64),
        output,
        error,
        total_size_bytes,
        file_count,
    }
}

/// The last `max_chars` characters of `text`
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn to_i64(value: u64) -> Option<i64> {
    i64::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferStats;

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("abc", 3), "abc");
        assert_eq!(tail_chars("ab", 3), "ab");
        assert_eq!(tail_chars("abc", 0), "");
        // Multi-byte characters are never split
        assert_eq!(tail_chars("ééé", 2), "éé");
    }

    #[test]
    fn test_success_records_known_stats_only() {
        let outcome = TransferOutcome {
            success: true,
            output: "Number of files: 1,234\n".to_string(),
            stats: TransferStats {
                total_files: Some(1234),
                files_transferred: Some(56),
                total_size: None,
                bytes_transferred: None,
                files_deleted: Some(0),
            },
        };

        let completion = completion_from(&outcome);
        assert_eq!(completion.status, JobStatus::Completed);
        assert_eq!(completion.error, None);
        assert_eq!(completion.file_count, Some(1234));
        assert_eq!(completion.total_size_bytes, None);
        assert_eq!(completion.files_transferred, Some(56));
        assert_eq!(completion.bytes_transferred, None);
        assert_eq!(completion.files_deleted, Some(0));
        assert_eq!(completion.output, outcome.output);
    }

    #[test]
    fn test_failure_keeps_bounded_tails() {
        let mut output = "x".repeat(20_000);
        output.push_str("\nrsync error: error in socket IO (code 10)\n");
        let outcome = TransferOutcome {
            success: false,
            output,
            stats: TransferStats::default(),
        };

        let completion = completion_from(&outcome);
        assert_eq!(completion.status, JobStatus::Failed);
        assert_eq!(completion.output.chars().count(), MAX_OUTPUT_CHARS);
        assert!(completion.output.ends_with("(code 10)\n"));

        let error = completion.error.unwrap();
        assert_eq!(error.chars().count(), MAX_ERROR_CHARS);
        assert!(error.ends_with("rsync error: error in socket IO (code 10)"));
        assert_eq!(completion.total_size_bytes, None);
        assert_eq!(completion.file_count, None);
    }

    #[test]
    fn test_failure_without_output_has_an_error() {
        let completion = completion_from(&TransferOutcome::default());
        assert_eq!(completion.status, JobStatus::Failed);
        assert_eq!(completion.error.as_deref(), Some("Transfer failed without output"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
