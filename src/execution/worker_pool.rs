//! # Worker Pool
//!
//! Pulls seed and execution jobs from the shared [`JobQueue`] and runs them.
//!
//! A failed attempt hands the job back to the queue with one retry less; once
//! the budget is exhausted the job is parked as [`JobState::Failed`] and stays
//! queryable as an incident. Handlers never retry on their own.
//!
//! Every claim carries a lease of `worker.lock_time_ms`. A worker that dies
//! mid-attempt leaves its job claimed until the lease runs out, after which
//! any worker may claim it again.
//!
//! [`JobQueue`]: crate::database::JobQueue

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::config::WorkerConfig;
use crate::database::BatchStore;
use crate::error::{Result, RetentionError};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::log_job;
use crate::models::{JobPayload, JobState, QueuedJob};
use crate::orchestration::{
    BatchProgressTracker, ExecutionJobHandler, JobOutcome, RemovalTimeService, SeedJobHandler,
};
use crate::utils::Clock;

/// Runs one claimed job at a time
#[derive(Debug, Clone)]
pub struct JobWorker {
    store: Arc<dyn BatchStore>,
    seed_handler: SeedJobHandler,
    execution_handler: ExecutionJobHandler,
    progress_tracker: BatchProgressTracker,
    events: EventPublisher,
    clock: Arc<dyn Clock>,
    job_retries: u32,
    lock_time: chrono::Duration,
}

impl JobWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn BatchStore>,
        seed_handler: SeedJobHandler,
        execution_handler: ExecutionJobHandler,
        progress_tracker: BatchProgressTracker,
        events: EventPublisher,
        clock: Arc<dyn Clock>,
        job_retries: u32,
        lock_time: chrono::Duration,
    ) -> Self {
        Self {
            store,
            seed_handler,
            execution_handler,
            progress_tracker,
            events,
            clock,
            job_retries,
            lock_time,
        }
    }

    /// Worker sharing the service's store, handlers and event channel
    pub fn for_service(service: &RemovalTimeService, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            service.store().clone(),
            service.seed_handler().clone(),
            service.execution_handler().clone(),
            service.progress_tracker().clone(),
            service.events().clone(),
            clock,
            service.config().worker.max_retries,
            service.config().worker.lock_time(),
        )
    }

    /// Claim and run the next job; `false` when the queue had nothing ready.
    ///
    /// An empty poll also finalizes batches that drained without being archived.
    pub async fn run_next(&self) -> Result<bool> {
        let Some(job) = self.claim().await? else {
            self.sweep().await?;
            return Ok(false);
        };
        self.run_claimed(&job).await?;
        Ok(true)
    }

    /// Claim the next job under a fresh lease
    pub async fn claim(&self) -> Result<Option<QueuedJob>> {
        let now = self.clock.now();
        self.store.claim_next(now, now + self.lock_time).await
    }

    /// Finalize drained batches nobody archived; returns how many this call won
    pub async fn sweep(&self) -> Result<usize> {
        self.progress_tracker.finalize_drained().await
    }

    /// Run a claimed job, recording a failed attempt against its retries
    pub async fn run_claimed(&self, job: &QueuedJob) -> Result<()> {
        let Err(e) = self.process(job).await else {
            return Ok(());
        };

        match self.store.fail_attempt(job.job_id, &e.to_string()).await {
            Ok(JobState::Failed) => {
                error!(
                    job_id = %job.job_id,
                    batch_id = %job.batch_id,
                    error = %e,
                    "Job retries exhausted, parked as incident"
                );
                self.events.publish(LifecycleEvent::JobFailed(job.clone()));
            }
            Ok(_) => {
                warn!(job_id = %job.job_id, error = %e, "Job attempt failed, will retry");
            }
            // Lease expired and another worker finished the job meanwhile
            Err(RetentionError::JobNotFound(_)) => {
                warn!(job_id = %job.job_id, error = %e, "Failed attempt outlived its job");
            }
            Err(store_error) => return Err(store_error),
        }
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, batch_id = %job.batch_id))]
    async fn process(&self, job: &QueuedJob) -> Result<()> {
        match &job.payload {
            JobPayload::Seed(configuration) => {
                let progress = self
                    .seed_handler
                    .run(job.batch_id, job.job_id, configuration)
                    .await?;
                self.events.publish(LifecycleEvent::BatchSeeded(progress));
                self.progress_tracker.on_seed_completed(progress).await?;
            }
            JobPayload::Execution(_) => {
                let execution_job = job.as_execution_job().ok_or_else(|| {
                    RetentionError::StoreError(format!("job {} is not an execution job", job.job_id))
                })?;

                match self.execution_handler.run(&execution_job).await? {
                    JobOutcome::Done => {
                        log_job!(debug, "Execution job completed", job_id: job.job_id);
                        self.events.publish(LifecycleEvent::JobCompleted(job.clone()));
                        self.progress_tracker
                            .on_execution_job_finished(job.job_id)
                            .await?;
                    }
                    JobOutcome::Rescheduled(successor) => {
                        let successor =
                            QueuedJob::execution(successor, self.job_retries, self.clock.now());
                        self.store.replace(job.job_id, &successor).await?;
                        log_job!(debug, "Execution job rescheduled",
                            job_id: job.job_id,
                            successor_id: successor.job_id
                        );
                        self.events.publish(LifecycleEvent::JobRescheduled(successor));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Attempts made by one [`WorkerPool::run_until_idle`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Job attempts across all tasks
    pub attempts: usize,
    /// Attempts per task, indexed by task
    pub per_worker: Vec<usize>,
}

impl DrainReport {
    /// Tasks that ran at least one job
    pub fn active_workers(&self) -> usize {
        self.per_worker.iter().filter(|attempts| **attempts > 0).count()
    }
}

/// Fixed set of tokio tasks sharing one [`JobWorker`]
#[derive(Debug, Clone)]
pub struct WorkerPool {
    worker: JobWorker,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(worker: JobWorker, config: WorkerConfig) -> Self {
        Self { worker, config }
    }

    pub fn worker(&self) -> &JobWorker {
        &self.worker
    }

    /// Run jobs until the queue is empty and no task is mid-attempt.
    ///
    /// Claims go through one lock that also counts running jobs, so a task
    /// only stops once the queue is empty and nothing running can enqueue a
    /// successor. Idle tasks sweep drained batches on their way out.
    pub async fn run_until_idle(&self) -> Result<DrainReport> {
        let running = Arc::new(tokio::sync::Mutex::new(0usize));
        let tasks = (0..self.config.concurrency.max(1)).map(|_| {
            let worker = self.worker.clone();
            let running = running.clone();
            tokio::spawn(async move {
                let mut attempts = 0usize;
                loop {
                    let job = {
                        let mut running_jobs = running.lock().await;
                        match worker.claim().await? {
                            Some(job) => {
                                *running_jobs += 1;
                                Some(job)
                            }
                            None if *running_jobs == 0 => None,
                            None => {
                                drop(running_jobs);
                                tokio::task::yield_now().await;
                                continue;
                            }
                        }
                    };
                    let Some(job) = job else {
                        break;
                    };

                    let outcome = worker.run_claimed(&job).await;
                    *running.lock().await -= 1;
                    outcome?;
                    attempts += 1;
                    tokio::task::yield_now().await;
                }
                worker.sweep().await?;
                Ok::<usize, RetentionError>(attempts)
            })
        });

        let mut report = DrainReport::default();
        for result in futures::future::join_all(tasks).await {
            match result {
                Ok(attempts) => {
                    let attempts = attempts?;
                    report.attempts += attempts;
                    report.per_worker.push(attempts);
                }
                Err(e) => {
                    return Err(RetentionError::StoreError(format!("worker task panicked: {e}")));
                }
            }
        }
        debug!(
            attempts = report.attempts,
            active_workers = report.active_workers(),
            "Worker pool drained the queue"
        );
        Ok(report)
    }

    /// Poll until `shutdown` flips to true
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting worker pool"
        );

        let tasks = (0..self.config.concurrency.max(1)).map(|worker_index| {
            let worker = self.worker.clone();
            let poll_interval = self.config.poll_interval();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    match worker.run_next().await {
                        Ok(true) => continue,
                        Ok(false) => {}
                        Err(e) => {
                            error!(worker_index, error = %e, "Error claiming job");
                        }
                    }
                    tokio::select! {
                        _ = sleep(poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                debug!(worker_index, "Worker stopped");
            })
        });

        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }
        info!("Worker pool stopped");
        Ok(())
    }
}
