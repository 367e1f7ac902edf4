//! # In-Memory Batch Store
//!
//! [`BatchRepository`] and [`JobQueue`] over a mutex-guarded table set and a
//! lock-free ready queue. Every multi-row operation runs under the table lock,
//! which gives it the same atomicity as a database transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::batch_store::{BatchRepository, JobQueue};
use crate::error::{Result, RetentionError};
use crate::models::{AuditLogEntry, Batch, BatchProgress, HistoricBatch, JobState, QueuedJob};

#[derive(Debug, Default)]
struct BatchTables {
    batches: HashMap<Uuid, Batch>,
    jobs: HashMap<Uuid, QueuedJob>,
    historic: HashMap<Uuid, HistoricBatch>,
    audit_log: Vec<AuditLogEntry>,
}

#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    tables: Mutex<BatchTables>,
    /// Ids of pending jobs in enqueue order; stale ids are skipped on claim
    ready: SegQueue<Uuid>,
}

impl InMemoryBatchStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn job_count(&self) -> usize {
        self.tables.lock().jobs.len()
    }

    fn insert_pending(&self, tables: &mut BatchTables, job: &QueuedJob) {
        if !tables.jobs.contains_key(&job.job_id) {
            let mut job = job.clone();
            job.state = JobState::Pending;
            let job_id = job.job_id;
            tables.jobs.insert(job_id, job);
            self.ready.push(job_id);
        }
    }
}

#[async_trait]
impl BatchRepository for InMemoryBatchStore {
    async fn create_batch(&self, batch: &Batch, seed_job: &QueuedJob) -> Result<()> {
        let mut tables = self.tables.lock();
        if tables.batches.contains_key(&batch.batch_id) {
            return Err(RetentionError::StoreError(format!(
                "batch {} already exists",
                batch.batch_id
            )));
        }
        tables.batches.insert(batch.batch_id, batch.clone());
        self.insert_pending(&mut tables, seed_job);
        Ok(())
    }

    async fn complete_seed(
        &self,
        batch_id: Uuid,
        seed_job_id: Uuid,
        jobs: &[QueuedJob],
    ) -> Result<BatchProgress> {
        let mut tables = self.tables.lock();
        if !tables.batches.contains_key(&batch_id) {
            return Err(RetentionError::BatchNotFound(batch_id));
        }

        for job in jobs {
            self.insert_pending(&mut tables, job);
        }
        tables.jobs.remove(&seed_job_id);

        let batch = tables
            .batches
            .get_mut(&batch_id)
            .ok_or(RetentionError::BatchNotFound(batch_id))?;
        if !batch.seed_completed {
            batch.total_jobs = jobs.len() as u32;
            batch.remaining_jobs = jobs.len() as u32;
            batch.seed_completed = true;
        }
        Ok(batch.progress())
    }

    async fn find_batch(&self, batch_id: Uuid) -> Result<Option<Batch>> {
        Ok(self.tables.lock().batches.get(&batch_id).cloned())
    }

    async fn batch_progress(&self, batch_id: Uuid) -> Result<Option<BatchProgress>> {
        Ok(self
            .tables
            .lock()
            .batches
            .get(&batch_id)
            .map(Batch::progress))
    }

    async fn complete_execution_job(&self, job_id: Uuid) -> Result<Option<BatchProgress>> {
        let mut tables = self.tables.lock();
        let Some(job) = tables.jobs.remove(&job_id) else {
            return Ok(None);
        };

        let batch = tables
            .batches
            .get_mut(&job.batch_id)
            .ok_or(RetentionError::BatchNotFound(job.batch_id))?;
        batch.remaining_jobs = batch.remaining_jobs.saturating_sub(1);
        batch.completed_jobs += 1;
        Ok(Some(batch.progress()))
    }

    async fn try_finalize(
        &self,
        batch_id: Uuid,
        historic: &HistoricBatch,
        audit_entry: &AuditLogEntry,
    ) -> Result<bool> {
        let mut tables = self.tables.lock();
        let batch = tables
            .batches
            .get_mut(&batch_id)
            .ok_or(RetentionError::BatchNotFound(batch_id))?;

        if batch.finalized_at.is_some() || !batch.progress().is_drained() {
            return Ok(false);
        }
        batch.finalized_at = Some(historic.end_time);

        tables.historic.insert(batch_id, historic.clone());
        tables.audit_log.push(audit_entry.clone());
        Ok(true)
    }

    async fn drained_batches(&self, limit: usize) -> Result<Vec<Uuid>> {
        let tables = self.tables.lock();
        let mut drained: Vec<&Batch> = tables
            .batches
            .values()
            .filter(|batch| batch.finalized_at.is_none() && batch.progress().is_drained())
            .collect();
        drained.sort_by_key(|batch| (batch.created_at, batch.batch_id));
        Ok(drained
            .into_iter()
            .take(limit)
            .map(|batch| batch.batch_id)
            .collect())
    }

    async fn historic_batch(&self, batch_id: Uuid) -> Result<Option<HistoricBatch>> {
        Ok(self.tables.lock().historic.get(&batch_id).cloned())
    }

    async fn record_audit_entry(&self, entry: &AuditLogEntry) -> Result<()> {
        self.tables.lock().audit_log.push(entry.clone());
        Ok(())
    }

    async fn audit_entries(&self) -> Result<Vec<AuditLogEntry>> {
        Ok(self.tables.lock().audit_log.clone())
    }
}

#[async_trait]
impl JobQueue for InMemoryBatchStore {
    async fn enqueue(&self, job: &QueuedJob) -> Result<()> {
        let mut tables = self.tables.lock();
        self.insert_pending(&mut tables, job);
        Ok(())
    }

    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        lock_expires_at: DateTime<Utc>,
    ) -> Result<Option<QueuedJob>> {
        while let Some(job_id) = self.ready.pop() {
            let mut tables = self.tables.lock();
            if let Some(job) = tables.jobs.get_mut(&job_id) {
                if job.state == JobState::Pending {
                    job.state = JobState::Claimed;
                    job.lock_expires_at = Some(lock_expires_at);
                    return Ok(Some(job.clone()));
                }
            }
        }

        // Claims abandoned by a worker that never came back
        let mut tables = self.tables.lock();
        let expired = tables
            .jobs
            .values_mut()
            .filter(|job| job.state == JobState::Claimed && job.is_claimable(now))
            .min_by_key(|job| (job.created_at, job.job_id));
        Ok(expired.map(|job| {
            job.lock_expires_at = Some(lock_expires_at);
            job.clone()
        }))
    }

    async fn replace(&self, job_id: Uuid, successor: &QueuedJob) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.jobs.remove(&job_id);
        self.insert_pending(&mut tables, successor);
        Ok(())
    }

    async fn fail_attempt(&self, job_id: Uuid, error: &str) -> Result<JobState> {
        let mut tables = self.tables.lock();
        let job = tables
            .jobs
            .get_mut(&job_id)
            .ok_or(RetentionError::JobNotFound(job_id))?;

        job.retries = job.retries.saturating_sub(1);
        job.last_error = Some(error.to_string());
        job.state = if job.retries == 0 {
            JobState::Failed
        } else {
            JobState::Pending
        };
        job.lock_expires_at = None;

        let state = job.state;
        if state == JobState::Pending {
            self.ready.push(job_id);
        }
        Ok(state)
    }

    async fn jobs_for_batch(&self, batch_id: Uuid) -> Result<Vec<QueuedJob>> {
        let mut jobs: Vec<QueuedJob> = self
            .tables
            .lock()
            .jobs
            .values()
            .filter(|job| job.batch_id == batch_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| (job.created_at, job.job_id));
        Ok(jobs)
    }

    async fn failed_jobs(&self) -> Result<Vec<QueuedJob>> {
        Ok(self
            .tables
            .lock()
            .jobs
            .values()
            .filter(|job| job.state == JobState::Failed)
            .cloned()
            .collect())
    }
}
