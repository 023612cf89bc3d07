//! Worker execution engine for running jobs.
//!
//! A fixed pool of worker tasks claims eligible jobs from the registry,
//! executes their shell commands, and reports outcomes back:
//!
//! 1. Each worker loop asks [`JobRegistry::select_eligible`] for one job
//! 2. [`CommandExecutor::execute`] spawns `sh -c <command>` with a hard timeout
//! 3. The outcome drives the retry state machine via `record_outcome`
//! 4. With no eligible job, the worker idles for the poll interval
//!
//! The idle wait and in-flight executions both race the shutdown token, so
//! cancellation is prompt: idle workers exit immediately and running
//! children are killed rather than awaited. A job killed by shutdown keeps
//! its `processing` claim and is recovered to `pending` at next startup.

pub mod executor;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use executor::{CommandExecutor, ExecutionOutcome};

use crate::queue::JobRegistry;

/// Default idle wait between empty poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A pool of concurrent worker tasks sharing one registry.
pub struct WorkerPool {
    registry: Arc<JobRegistry>,
    executor: CommandExecutor,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            registry,
            executor: CommandExecutor::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_executor(mut self, executor: CommandExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run `count` workers until `shutdown` is cancelled and all loops exit.
    pub async fn run(&self, count: u32, shutdown: CancellationToken) {
        tracing::info!(count, "Starting workers");

        let mut handles = Vec::with_capacity(count as usize);
        for worker_id in 1..=count {
            let registry = self.registry.clone();
            let executor = self.executor.clone();
            let poll_interval = self.poll_interval;
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, registry, executor, poll_interval, shutdown).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("All workers stopped");
    }
}

/// One worker: claim, execute, report, repeat.
///
/// Execution failures stay contained in the job's own state transition; only
/// a store error stops the loop.
async fn worker_loop(
    worker_id: u32,
    registry: Arc<JobRegistry>,
    executor: CommandExecutor,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    tracing::info!(worker = worker_id, "Worker started");

    while !shutdown.is_cancelled() {
        let claimed = match registry.select_eligible(1).await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(worker = worker_id, error = %e, "Store error, stopping worker");
                break;
            }
        };

        let Some(job) = claimed.into_iter().next() else {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => continue,
            }
        };

        let outcome = executor.execute(&job.id, &job.command, &shutdown).await;
        let success = match outcome {
            ExecutionOutcome::Success => true,
            ExecutionOutcome::Failure(_) => false,
            // The claim stays `processing` on disk and is recovered to
            // `pending` at next startup.
            ExecutionOutcome::Interrupted => break,
        };

        if let Err(e) = registry.record_outcome(&job.id, success).await {
            tracing::error!(
                worker = worker_id,
                job_id = %job.id,
                error = %e,
                "Failed to record outcome, stopping worker"
            );
            break;
        }
    }

    tracing::info!(worker = worker_id, "Worker stopped");
}
