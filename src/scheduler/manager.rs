use super::models::SchedulerContext;
use super::settings::RuntimeSettings;
use super::worker::{JobRun, panic_message, run_job};
use crate::config::SyncConfig;
use crate::error::{Result, StoreError, SyncError};
use crate::store::{NewMirror, StoreDb, TriggerOrigin, now_timestamp};
use crate::transfer::Transfer;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Configuration for the Scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often queued jobs are polled for
    pub poll_interval: Duration,
    /// Pause after a failed iteration
    pub error_backoff: Duration,
    /// Store reachability checks before startup gives up
    pub connect_attempts: u32,
    pub connect_backoff: Duration,
    /// Mirrors provisioned when absent
    pub mirrors: Vec<NewMirror>,
    /// Compiled-in settings, seeded into and overridden by the settings table
    pub defaults: RuntimeSettings,
}

impl SchedulerConfig {
    pub fn from_sync_config(config: &SyncConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            error_backoff: config.error_backoff,
            connect_attempts: config.db_connect_attempts,
            connect_backoff: config.db_connect_backoff,
            mirrors: config.mirrors.clone(),
            defaults: RuntimeSettings::from_config(config),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Iteration {
    Scheduled,
    Poll,
}

/// Single-worker scheduler executing queued and cron-triggered sync jobs
pub struct Scheduler<T: Transfer> {
    db: StoreDb,
    transfer: T,
    ctx: Arc<SchedulerContext>,
    config: SchedulerConfig,
    settings: RuntimeSettings,
    next_run: Option<DateTime<Utc>>,
}

impl<T: Transfer> Scheduler<T> {
    pub fn new(db: StoreDb, transfer: T, ctx: Arc<SchedulerContext>, config: SchedulerConfig) -> Self {
        let settings = config.defaults.clone();
        Self {
            db,
            transfer,
            ctx,
            config,
            settings,
            next_run: None,
        }
    }

    /// Run until shutdown is requested.
    ///
    /// Only startup failures are returned; errors inside the steady-state
    /// loop are logged and retried.
    pub async fn run(mut self) -> Result<()> {
        if !self.startup().await? {
            return Ok(());
        }

        self.arm_cron();

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The queue was just drained, skip the immediate first tick
        poll.tick().await;

        let cancel = self.ctx.cancellation().clone();
        tracing::info!(target: "scheduler", "Scheduler loop started");

        while self.ctx.is_running() {
            let iteration = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep_until(self.next_run) => Iteration::Scheduled,
                _ = poll.tick() => Iteration::Poll,
            };

            let result = AssertUnwindSafe(self.run_iteration(iteration))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(SyncError::Panicked(panic_message(panic.as_ref()))));

            if matches!(iteration, Iteration::Scheduled) {
                self.arm_cron();
            }

            if let Err(e) = result {
                tracing::error!(
                    target: "scheduler",
                    iteration = ?iteration,
                    error = %e,
                    "Scheduler iteration failed"
                );
                self.backoff().await;
            }
        }

        tracing::info!(target: "scheduler", "Scheduler loop stopped");
        Ok(())
    }

    /// Prepare the store and work off anything left from before.
    ///
    /// Returns false when shutdown was requested while waiting for the store.
    async fn startup(&mut self) -> Result<bool> {
        if !self.wait_for_store().await? {
            return Ok(false);
        }

        let seeds = self.config.defaults.seeds();
        let mirrors = self.config.mirrors.clone();
        let (applied, seeded_settings, seeded_mirrors, recovered) = self
            .db
            .interact(move |db| {
                let applied = db.run_migrations()?;
                let seeded_settings = db.seed_settings(&seeds)?;
                let mut seeded_mirrors = 0;
                for mirror in &mirrors {
                    if db.seed_mirror(mirror)? {
                        seeded_mirrors += 1;
                    }
                }
                let recovered = db.recover_interrupted_jobs(now_timestamp())?;
                Ok((applied, seeded_settings, seeded_mirrors, recovered))
            })
            .await?;

        tracing::info!(
            target: "scheduler",
            migrations = applied,
            settings = seeded_settings,
            mirrors = seeded_mirrors,
            "Store prepared"
        );
        if recovered > 0 {
            tracing::warn!(target: "scheduler", jobs = recovered, "Marked interrupted jobs as failed");
        }

        self.reload_settings().await;

        if self.settings.sync_on_startup {
            tracing::info!(target: "scheduler", "Running startup sync");
            if let Err(e) = self.enqueue_fleet().await {
                tracing::error!(target: "scheduler", error = %e, "Failed to queue startup sync");
            }
        }

        if let Err(e) = self.drain_queue().await {
            tracing::error!(target: "scheduler", error = %e, "Failed to drain queued jobs at startup");
        }

        Ok(true)
    }

    /// Ping the store until it answers, a bounded number of times
    async fn wait_for_store(&self) -> Result<bool> {
        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.db.interact(|db| db.ping()).await {
                Ok(()) => {
                    tracing::info!(target: "scheduler", attempt, path = %self.db.path().display(), "Store is reachable");
                    return Ok(true);
                }
                Err(e) => {
                    tracing::warn!(target: "scheduler", attempt, attempts, error = %e, "Store not reachable yet");
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = self.ctx.cancellation().cancelled() => return Ok(false),
                    _ = tokio::time::sleep(self.config.connect_backoff) => {}
                }
            }
        }

        Err(StoreError::Unavailable {
            attempts,
            last_error,
        }
        .into())
    }

    async fn run_iteration(&mut self, iteration: Iteration) -> Result<()> {
        match iteration {
            Iteration::Scheduled => self.run_scheduled_sync().await,
            Iteration::Poll => {
                if self.reload_settings().await {
                    self.arm_cron();
                }
                self.drain_queue().await.map(|_| ())
            }
        }
    }

    /// Cron-triggered fleet sync: fresh settings, one job per enabled mirror
    async fn run_scheduled_sync(&mut self) -> Result<()> {
        tracing::info!(target: "scheduler", "Scheduled sync due");
        self.reload_settings().await;
        self.enqueue_fleet().await?;
        self.drain_queue().await?;
        Ok(())
    }

    async fn enqueue_fleet(&self) -> Result<()> {
        let job_ids = self
            .db
            .interact(|db| db.enqueue_for_enabled_mirrors(&TriggerOrigin::Scheduled, now_timestamp()))
            .await?;
        tracing::info!(target: "scheduler", jobs = job_ids.len(), "Queued sync for enabled mirrors");
        Ok(())
    }

    /// Execute every queued job, oldest first, one at a time.
    ///
    /// Stops early when shutdown is requested; the remaining jobs stay
    /// queued for the next start.
    async fn drain_queue(&mut self) -> Result<usize> {
        let jobs = self.db.interact(|db| db.queued_jobs()).await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        tracing::debug!(target: "scheduler", jobs = jobs.len(), "Draining job queue");

        let mut finished = 0;
        for (index, job) in jobs.iter().enumerate() {
            if !self.ctx.is_running() {
                tracing::info!(
                    target: "scheduler",
                    remaining = jobs.len() - index,
                    "Shutdown requested, leaving remaining jobs queued"
                );
                break;
            }

            if let JobRun::Finished(_) =
                run_job(&self.db, &self.transfer, &self.ctx, &self.settings, job).await?
            {
                finished += 1;
            }
        }

        Ok(finished)
    }

    /// Re-read the settings table; returns whether the schedule changed
    async fn reload_settings(&mut self) -> bool {
        match self.db.interact(|db| db.load_settings()).await {
            Ok(values) => self.settings.apply(&values),
            Err(e) => {
                tracing::debug!(target: "scheduler::settings", error = %e, "Failed to read settings, keeping current values");
                false
            }
        }
    }

    /// Compute the next cron fire time from now
    fn arm_cron(&mut self) {
        self.next_run = self.settings.schedule.next_after(Utc::now());
        match self.next_run {
            Some(next_run) => {
                tracing::info!(target: "scheduler", schedule = %self.settings.schedule, next_run = %next_run, "Next scheduled sync")
            }
            None => {
                tracing::warn!(target: "scheduler", schedule = %self.settings.schedule, "Schedule never fires, scheduled syncs disabled")
            }
        }
    }

    async fn backoff(&self) {
        tokio::select! {
            _ = self.ctx.cancellation().cancelled() => {}
            _ = tokio::time::sleep(self.config.error_backoff) => {}
        }
    }

    #[cfg(test)]
    fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }
}

/// Sleep until a wall-clock instant; never completes for `None`
async fn sleep_until(at: Option<DateTime<Utc>>) {
    match at {
        Some(at) => {
            let remaining = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(remaining).await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::CronExpr;
    use crate::scheduler::settings::SYNC_BANDWIDTH_LIMIT;
    use crate::store::{INTERRUPTED_ERROR, JobStatus, MirrorStatus};
    use crate::transfer::{TransferOutcome, TransferRequest, TransferSlot, parse_stats};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const SUMMARY: &str = "Number of files: 1,234\nNumber of regular files transferred: 56\nTotal file size: 999,000 bytes\n";

    /// Transfer double that records requests and fails selected mirrors
    #[derive(Default)]
    struct ScriptedTransfer {
        requests: Mutex<Vec<TransferRequest>>,
        failing: Mutex<HashSet<String>>,
        panicking: Mutex<HashSet<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedTransfer {
        fn fail(&self, label: &str) {
            self.failing.lock().unwrap().insert(label.to_string());
        }

        fn panic_on(&self, label: &str) {
            self.panicking.lock().unwrap().insert(label.to_string());
        }

        fn succeed(&self, label: &str) {
            self.failing.lock().unwrap().remove(label);
        }

        fn labels(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.label.clone())
                .collect()
        }
    }

    impl Transfer for ScriptedTransfer {
        async fn execute(&self, request: &TransferRequest, slot: &TransferSlot) -> TransferOutcome {
            let _registration = slot.occupy(None);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());

            tokio::time::sleep(Duration::from_millis(5)).await;

            let panics = self.panicking.lock().unwrap().contains(&request.label);
            if panics {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                panic!("scripted transfer blew up for {}", request.label);
            }

            let failing = self.failing.lock().unwrap().contains(&request.label);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if failing {
                let output = "rsync: failed to connect: Connection refused (111)\nrsync error: error in socket IO (code 10)\n";
                TransferOutcome {
                    success: false,
                    output: output.to_string(),
                    stats: parse_stats(output),
                }
            } else {
                TransferOutcome {
                    success: true,
                    output: SUMMARY.to_string(),
                    stats: parse_stats(SUMMARY),
                }
            }
        }
    }

    fn config(dir: &TempDir) -> SchedulerConfig {
        let mirrors = ["freebsd", "netbsd", "openbsd"]
            .into_iter()
            .map(|name| {
                NewMirror::new(
                    name,
                    name,
                    format!("rsync://ftp.{name}.org/{name}/"),
                    dir.path().join(name).to_string_lossy(),
                )
            })
            .collect();

        SchedulerConfig {
            poll_interval: Duration::from_millis(20),
            error_backoff: Duration::from_millis(10),
            connect_attempts: 2,
            connect_backoff: Duration::from_millis(10),
            mirrors,
            defaults: RuntimeSettings {
                schedule: CronExpr::parse("0 4 * * *").unwrap(),
                bandwidth_limit_kbs: 0,
                timeout: Duration::from_secs(600),
                sync_on_startup: false,
            },
        }
    }

    fn scheduler(dir: &TempDir, config: SchedulerConfig) -> (Scheduler<Arc<ScriptedTransfer>>, Arc<ScriptedTransfer>, StoreDb) {
        let db = StoreDb::open(dir.path().join("mirrors.db"), 2).unwrap();
        let transfer = Arc::new(ScriptedTransfer::default());
        let scheduler = Scheduler::new(
            db.clone(),
            transfer.clone(),
            Arc::new(SchedulerContext::new()),
            config,
        );
        (scheduler, transfer, db)
    }

    fn mirror_id(db: &StoreDb, name: &str) -> i64 {
        db.get_mirror_by_name(name).unwrap().unwrap().id
    }

    #[tokio::test]
    async fn test_startup_prepares_store() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, transfer, db) = scheduler(&dir, config(&dir));

        assert!(scheduler.startup().await.unwrap());

        let names: Vec<String> = db.list_mirrors().unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["freebsd", "netbsd", "openbsd"]);
        assert_eq!(
            db.load_settings().unwrap().get("sync_schedule").map(String::as_str),
            Some("0 4 * * *")
        );
        // No startup sync requested and nothing queued
        assert!(transfer.labels().is_empty());
    }

    #[tokio::test]
    async fn test_startup_recovers_interrupted_and_drains_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, transfer, db) = scheduler(&dir, config(&dir));
        assert!(scheduler.startup().await.unwrap());

        // Simulate a previous process that died mid-transfer with more work queued
        let freebsd = mirror_id(&db, "freebsd");
        let openbsd = mirror_id(&db, "openbsd");
        let interrupted = db.enqueue_job(freebsd, &TriggerOrigin::Scheduled, now_timestamp()).unwrap();
        assert!(db.claim_job(interrupted, freebsd, now_timestamp()).unwrap());
        let leftover = db
            .enqueue_job(openbsd, &TriggerOrigin::Operator("alice".into()), now_timestamp())
            .unwrap();

        let restarted_transfer = Arc::new(ScriptedTransfer::default());
        let mut restarted = Scheduler::new(
            db.clone(),
            restarted_transfer.clone(),
            Arc::new(SchedulerContext::new()),
            config(&dir),
        );
        assert!(restarted.startup().await.unwrap());

        let job = db.get_job(interrupted).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(INTERRUPTED_ERROR));

        assert_eq!(db.get_job(leftover).unwrap().unwrap().status, JobStatus::Completed);
        assert_eq!(restarted_transfer.labels(), vec!["openbsd"]);
        assert!(transfer.labels().is_empty());
    }

    #[tokio::test]
    async fn test_startup_sync_queues_every_enabled_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.defaults.sync_on_startup = true;
        config.mirrors[1].enabled = false;
        let (mut scheduler, transfer, db) = scheduler(&dir, config);

        assert!(scheduler.startup().await.unwrap());

        assert_eq!(transfer.labels(), vec!["freebsd", "openbsd"]);
        let jobs = db.jobs_for_mirror(mirror_id(&db, "freebsd"), 10).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].origin(), Some(TriggerOrigin::Scheduled));
    }

    #[tokio::test]
    async fn test_operator_job_runs_before_scheduled_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, transfer, db) = scheduler(&dir, config(&dir));
        assert!(scheduler.startup().await.unwrap());

        let netbsd = mirror_id(&db, "netbsd");
        let alice = db
            .enqueue_job(netbsd, &TriggerOrigin::Operator("alice".into()), now_timestamp())
            .unwrap();

        scheduler.run_scheduled_sync().await.unwrap();

        assert_eq!(transfer.labels(), vec!["netbsd", "freebsd", "netbsd", "openbsd"]);
        assert_eq!(transfer.max_in_flight.load(Ordering::SeqCst), 1);

        let job = db.get_job(alice).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.triggered_by.as_deref(), Some("alice"));
        assert_eq!(job.files_transferred, Some(56));
        assert_eq!(db.count_jobs_with_status(JobStatus::Queued).unwrap(), 0);
        assert_eq!(db.count_jobs_with_status(JobStatus::Completed).unwrap(), 4);
    }

    #[tokio::test]
    async fn test_failure_preserves_last_completed() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, transfer, db) = scheduler(&dir, config(&dir));
        assert!(scheduler.startup().await.unwrap());
        let freebsd = mirror_id(&db, "freebsd");

        scheduler.run_scheduled_sync().await.unwrap();
        let before = db.get_mirror(freebsd).unwrap().unwrap();
        assert_eq!(before.status, MirrorStatus::Active);
        assert_eq!(before.file_count, Some(1234));
        assert_eq!(before.total_size_bytes, Some(999_000));
        assert!(before.last_sync_completed.is_some());

        transfer.fail("freebsd");
        let job_id = db.enqueue_job(freebsd, &TriggerOrigin::Operator("bob".into()), now_timestamp()).unwrap();
        scheduler.drain_queue().await.unwrap();

        let job = db.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("rsync error"));

        let after = db.get_mirror(freebsd).unwrap().unwrap();
        assert_eq!(after.status, MirrorStatus::Error);
        assert_eq!(after.last_sync_completed, before.last_sync_completed);
        assert_eq!(after.file_count, Some(1234));
        assert!(after.last_sync_error.unwrap().contains("rsync error"));

        // The next successful run clears the error
        transfer.succeed("freebsd");
        db.enqueue_job(freebsd, &TriggerOrigin::Operator("bob".into()), now_timestamp()).unwrap();
        scheduler.drain_queue().await.unwrap();
        let recovered = db.get_mirror(freebsd).unwrap().unwrap();
        assert_eq!(recovered.status, MirrorStatus::Active);
        assert_eq!(recovered.last_sync_error, None);
        assert!(recovered.last_sync_completed >= before.last_sync_completed);
    }

    #[tokio::test]
    async fn test_panicking_transfer_fails_job_and_loop_continues() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, transfer, db) = scheduler(&dir, config(&dir));
        transfer.panic_on("freebsd");
        let ctx = scheduler.ctx.clone();
        let handle = tokio::spawn(scheduler.run());

        let (freebsd, netbsd) = loop {
            if let (Ok(Some(f)), Ok(Some(n))) =
                (db.get_mirror_by_name("freebsd"), db.get_mirror_by_name("netbsd"))
            {
                break (f.id, n.id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        let doomed = db
            .enqueue_job(freebsd, &TriggerOrigin::Operator("dave".into()), now_timestamp())
            .unwrap();
        let next = db
            .enqueue_job(netbsd, &TriggerOrigin::Operator("dave".into()), now_timestamp())
            .unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            while db.get_job(next).unwrap().unwrap().status != JobStatus::Completed {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let job = db.get_job(doomed).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("scripted transfer blew up for freebsd"));

        let mirror = db.get_mirror(freebsd).unwrap().unwrap();
        assert_eq!(mirror.status, MirrorStatus::Error);
        assert!(!ctx.is_syncing());

        ctx.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(transfer.labels(), vec!["freebsd", "netbsd"]);
    }

    #[tokio::test]
    async fn test_bandwidth_setting_reaches_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, transfer, db) = scheduler(&dir, config(&dir));
        assert!(scheduler.startup().await.unwrap());

        db.put_setting(SYNC_BANDWIDTH_LIMIT, "500").unwrap();
        scheduler.run_scheduled_sync().await.unwrap();

        db.put_setting(SYNC_BANDWIDTH_LIMIT, "unlimited please").unwrap();
        scheduler.run_scheduled_sync().await.unwrap();

        let limits: Vec<u32> = transfer
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.bandwidth_limit_kbs)
            .collect();
        assert_eq!(limits, vec![500; 6]);
        assert_eq!(scheduler.settings().bandwidth_limit_kbs, 500);
    }

    #[tokio::test]
    async fn test_run_processes_queue_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, transfer, db) = scheduler(&dir, config(&dir));
        let ctx = scheduler.ctx.clone();
        let handle = tokio::spawn(scheduler.run());

        // Wait for startup to seed mirrors, then queue work for the poll tick
        let netbsd = loop {
            if let Ok(Some(mirror)) = db.get_mirror_by_name("netbsd") {
                break mirror.id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        let job_id = db
            .enqueue_job(netbsd, &TriggerOrigin::Operator("carol".into()), now_timestamp())
            .unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            while db.get_job(job_id).unwrap().unwrap().status != JobStatus::Completed {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        ctx.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(transfer.labels(), vec!["netbsd"]);
    }

    #[tokio::test]
    async fn test_shutdown_leaves_remaining_jobs_queued() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, transfer, db) = scheduler(&dir, config(&dir));
        assert!(scheduler.startup().await.unwrap());

        db.enqueue_for_enabled_mirrors(&TriggerOrigin::Scheduled, now_timestamp())
            .unwrap();
        scheduler.ctx.shutdown();
        assert_eq!(scheduler.drain_queue().await.unwrap(), 0);

        assert!(transfer.labels().is_empty());
        assert_eq!(db.count_jobs_with_status(JobStatus::Queued).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_startup_gives_up_on_unreachable_store() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file
        let db = StoreDb::open(dir.path(), 1).unwrap();
        let scheduler = Scheduler::new(
            db,
            Arc::new(ScriptedTransfer::default()),
            Arc::new(SchedulerContext::new()),
            config(&dir),
        );

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Store(StoreError::Unavailable { attempts: 2, .. })
        ));
    }
}
