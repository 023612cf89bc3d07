//! The job registry: state machine, claims, and outcome recording.
//!
//! The registry is the single writer for the durable store. Every operation
//! holds one async mutex for the duration of its load-modify-save cycle, so
//! concurrent workers can never interleave a read-then-write against the
//! same collection. In particular `select_eligible` persists its claims
//! before returning, guaranteeing at-most-one execution in flight per job id.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::backoff::retry_delay;
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::queue::dlq;
use crate::queue::job::{Job, JobSpec, JobState};
use crate::store::JsonStore;

/// Aggregate counts per state plus the current configuration.
#[derive(Debug, Clone)]
pub struct StatusSummary {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead: usize,
    pub config: QueueConfig,
}

pub struct JobRegistry {
    store: Mutex<JsonStore>,
}

impl JobRegistry {
    /// Open the registry over `store`, recovering from an unclean shutdown.
    ///
    /// Jobs found in `processing` were abandoned mid-execution: they are
    /// reset to `pending`, eligible immediately, attempts unchanged. Jobs
    /// found in `dead` are a half-finished migration and are re-migrated.
    pub fn open(store: JsonStore) -> Result<Self> {
        let mut jobs = store.load_jobs()?;
        let now = Utc::now();
        let mut changed = false;

        for job in jobs.iter_mut() {
            if job.state == JobState::Processing {
                tracing::info!(job_id = %job.id, "Recovering abandoned claim");
                job.state = JobState::Pending;
                job.next_eligible_at = None;
                job.updated_at = now;
                changed = true;
            }
        }

        let stranded: Vec<String> = jobs
            .iter()
            .filter(|j| j.state == JobState::Dead)
            .map(|j| j.id.clone())
            .collect();
        if !stranded.is_empty() {
            let mut dead_jobs = store.load_dlq()?;
            for id in &stranded {
                tracing::info!(job_id = %id, "Completing interrupted DLQ migration");
                dlq::migrate(&mut jobs, &mut dead_jobs, id, now);
            }
            store.save_dlq(&dead_jobs)?;
            changed = true;
        }

        if changed {
            store.save_jobs(&jobs)?;
        }

        Ok(Self {
            store: Mutex::new(store),
        })
    }

    /// Validate and persist a new job, filling defaults from the current config.
    pub async fn enqueue(&self, spec: JobSpec) -> Result<Job> {
        let store = self.store.lock().await;
        let mut jobs = store.load_jobs()?;
        let config = store.load_config()?;

        let job = spec.into_job(&config, Utc::now());
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(QueueError::InvalidInput(format!(
                "job id '{}' already exists in the queue",
                job.id
            )));
        }

        jobs.push(job.clone());
        store.save_jobs(&jobs)?;
        tracing::info!(job_id = %job.id, command = %job.command, "Job enqueued");
        Ok(job)
    }

    /// Claim up to `limit` eligible jobs for execution.
    ///
    /// Failed jobs whose backoff has elapsed are promoted back to `pending`
    /// first; claims then take pending jobs whose `next_eligible_at` has
    /// passed, FIFO by creation time. Claimed jobs transition to
    /// `processing` and are persisted before this returns.
    pub async fn select_eligible(&self, limit: usize) -> Result<Vec<Job>> {
        let store = self.store.lock().await;
        let mut jobs = store.load_jobs()?;
        let now = Utc::now();
        let mut changed = false;

        for job in jobs.iter_mut() {
            if job.state == JobState::Failed && job.next_eligible_at.map_or(true, |t| t <= now) {
                job.state = JobState::Pending;
                job.updated_at = now;
                changed = true;
            }
        }

        let mut eligible: Vec<usize> = jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.is_eligible(now))
            .map(|(i, _)| i)
            .collect();
        eligible.sort_by_key(|&i| jobs[i].created_at);
        eligible.truncate(limit);

        let mut claimed = Vec::with_capacity(eligible.len());
        for i in eligible {
            let job = &mut jobs[i];
            job.state = JobState::Processing;
            job.updated_at = now;
            claimed.push(job.clone());
            changed = true;
        }

        if changed {
            store.save_jobs(&jobs)?;
        }
        Ok(claimed)
    }

    /// Apply the outcome of an execution to the claimed job.
    ///
    /// Success completes the job. Failure increments `attempts` and either
    /// schedules a retry after the backoff delay or, once `attempts` exceeds
    /// `max_retries`, migrates the job to the DLQ within the same locked
    /// update. Returns the resulting state, or `None` if the job is no
    /// longer in the active collection.
    pub async fn record_outcome(&self, job_id: &str, success: bool) -> Result<Option<JobState>> {
        let store = self.store.lock().await;
        let mut jobs = store.load_jobs()?;
        let now = Utc::now();

        let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
            tracing::warn!(job_id = %job_id, "Outcome for a job no longer in the active collection");
            return Ok(None);
        };

        if success {
            job.state = JobState::Completed;
            job.updated_at = now;
            store.save_jobs(&jobs)?;
            tracing::info!(job_id = %job_id, "Job completed");
            return Ok(Some(JobState::Completed));
        }

        job.attempts += 1;
        job.updated_at = now;

        if job.attempts > job.max_retries {
            let attempts = job.attempts;
            job.state = JobState::Dead;
            let mut dead_jobs = store.load_dlq()?;
            dlq::migrate(&mut jobs, &mut dead_jobs, job_id, now);
            // DLQ gains the job before the active collection drops it, so a
            // crash between the two saves is repaired by the idempotent
            // re-migration at startup.
            store.save_dlq(&dead_jobs)?;
            store.save_jobs(&jobs)?;
            tracing::warn!(job_id = %job_id, attempts, "Retries exhausted, job moved to DLQ");
            return Ok(Some(JobState::Dead));
        }

        let config = store.load_config()?;
        let delay = retry_delay(job.attempts, config.backoff_base);
        job.state = JobState::Failed;
        job.next_eligible_at = Some(add_delay(now, delay));
        let attempts = job.attempts;
        store.save_jobs(&jobs)?;
        tracing::info!(
            job_id = %job_id,
            attempts,
            delay_secs = delay.as_secs(),
            "Job failed, retry scheduled"
        );
        Ok(Some(JobState::Failed))
    }

    /// Aggregate counts per state plus the current configuration.
    pub async fn status(&self) -> Result<StatusSummary> {
        let store = self.store.lock().await;
        let jobs = store.load_jobs()?;
        let dead_jobs = store.load_dlq()?;
        let config = store.load_config()?;

        let count = |state: JobState| jobs.iter().filter(|j| j.state == state).count();
        Ok(StatusSummary {
            pending: count(JobState::Pending),
            processing: count(JobState::Processing),
            completed: count(JobState::Completed),
            failed: count(JobState::Failed),
            dead: dead_jobs.len(),
            config,
        })
    }

    /// All active jobs, optionally filtered by state, oldest first.
    pub async fn list(&self, filter: Option<JobState>) -> Result<Vec<Job>> {
        let store = self.store.lock().await;
        let mut jobs = store.load_jobs()?;
        if let Some(state) = filter {
            jobs.retain(|j| j.state == state);
        }
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    /// The dead letter queue, oldest first.
    pub async fn dlq_jobs(&self) -> Result<Vec<Job>> {
        let store = self.store.lock().await;
        let mut jobs = store.load_dlq()?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    /// Move a job from the DLQ back to the active collection for a fresh run.
    pub async fn dlq_retry(&self, job_id: &str) -> Result<Job> {
        let store = self.store.lock().await;
        let mut dead_jobs = store.load_dlq()?;
        let Some(mut job) = dlq::take(&mut dead_jobs, job_id) else {
            return Err(QueueError::NotFound(job_id.to_string()));
        };

        let mut jobs = store.load_jobs()?;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(QueueError::InvalidInput(format!(
                "job id '{}' already exists in the queue",
                job.id
            )));
        }

        job.state = JobState::Pending;
        job.attempts = 0;
        job.next_eligible_at = None;
        job.updated_at = Utc::now();
        jobs.push(job.clone());

        // Active collection first: a crash after this save leaves the job in
        // both collections, which the duplicate check above keeps harmless.
        store.save_jobs(&jobs)?;
        store.save_dlq(&dead_jobs)?;
        tracing::info!(job_id = %job_id, "Job moved from DLQ back to the queue");
        Ok(job)
    }

    /// Empty the DLQ. Irreversible. Returns the number of jobs discarded.
    pub async fn dlq_clear(&self) -> Result<usize> {
        let store = self.store.lock().await;
        let dead_jobs = store.load_dlq()?;
        let discarded = dead_jobs.len();
        store.save_dlq(&[])?;
        tracing::info!(discarded, "DLQ cleared");
        Ok(discarded)
    }

    pub async fn config(&self) -> Result<QueueConfig> {
        let store = self.store.lock().await;
        store.load_config()
    }

    /// Update one configuration key and persist the result.
    pub async fn set_config(&self, key: &str, value: &str) -> Result<QueueConfig> {
        let store = self.store.lock().await;
        let mut config = store.load_config()?;
        config.set(key, value)?;
        store.save_config(&config)?;
        Ok(config)
    }
}

/// `now + delay`, clamped at the end of representable time.
fn add_delay(now: DateTime<Utc>, delay: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
