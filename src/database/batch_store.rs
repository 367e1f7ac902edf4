//! # Batch and Job Persistence
//!
//! The engine's own state: batch rows with their progress counters, the shared
//! job queue, historic batch rows and audit entries.
//!
//! Every operation here is atomic against the store. Completion of an execution
//! job removes the job row and decrements the batch counter in one step, so a
//! retried completion can never decrement twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AuditLogEntry, Batch, BatchProgress, HistoricBatch, JobState, QueuedJob};

#[async_trait]
pub trait BatchRepository: Send + Sync + Debug {
    /// Insert the batch together with its seed job
    async fn create_batch(&self, batch: &Batch, seed_job: &QueuedJob) -> Result<()>;

    /// Replace the seed job with its execution jobs and set the job total.
    ///
    /// Re-running with the same jobs inserts nothing new and leaves the total unchanged.
    async fn complete_seed(
        &self,
        batch_id: Uuid,
        seed_job_id: Uuid,
        jobs: &[QueuedJob],
    ) -> Result<BatchProgress>;

    async fn find_batch(&self, batch_id: Uuid) -> Result<Option<Batch>>;

    async fn batch_progress(&self, batch_id: Uuid) -> Result<Option<BatchProgress>>;

    /// Delete a finished execution job and decrement its batch counter.
    ///
    /// Returns `None` when the job row is already gone.
    async fn complete_execution_job(&self, job_id: Uuid) -> Result<Option<BatchProgress>>;

    /// Single-winner finalization. Returns `true` for the caller that archived
    /// the batch; every later or concurrent caller gets `false`.
    async fn try_finalize(
        &self,
        batch_id: Uuid,
        historic: &HistoricBatch,
        audit_entry: &AuditLogEntry,
    ) -> Result<bool>;

    /// Batches whose jobs have all finished but which were never finalized,
    /// oldest first
    async fn drained_batches(&self, limit: usize) -> Result<Vec<Uuid>>;

    async fn historic_batch(&self, batch_id: Uuid) -> Result<Option<HistoricBatch>>;

    /// Audit entries written outside batch finalization
    async fn record_audit_entry(&self, entry: &AuditLogEntry) -> Result<()>;

    async fn audit_entries(&self) -> Result<Vec<AuditLogEntry>>;
}

#[async_trait]
pub trait JobQueue: Send + Sync + Debug {
    /// Insert a pending job; an existing row with the same id is left untouched
    async fn enqueue(&self, job: &QueuedJob) -> Result<()>;

    /// Claim the oldest pending job, or a claimed one whose lease ran out
    /// before `now`. The claim holds until `lock_expires_at`.
    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        lock_expires_at: DateTime<Utc>,
    ) -> Result<Option<QueuedJob>>;

    /// Swap a finished attempt for its successor
    async fn replace(&self, job_id: Uuid, successor: &QueuedJob) -> Result<()>;

    /// Record a failed attempt. The job goes back to pending while retries
    /// remain and to [`JobState::Failed`] once they are exhausted.
    async fn fail_attempt(&self, job_id: Uuid, error: &str) -> Result<JobState>;

    async fn jobs_for_batch(&self, batch_id: Uuid) -> Result<Vec<QueuedJob>>;

    /// Jobs parked after exhausting their retries
    async fn failed_jobs(&self) -> Result<Vec<QueuedJob>>;
}

/// Combined store handed to the engine
pub trait BatchStore: BatchRepository + JobQueue {}

impl<T: BatchRepository + JobQueue> BatchStore for T {}
