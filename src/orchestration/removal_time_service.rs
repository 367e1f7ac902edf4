//! # Removal Time Service
//!
//! Entry point for bulk set-removal-time requests.
//!
//! [`RemovalTimeService::execute_async`] resolves the selection, creates the
//! batch with its seed job and returns; workers take it from there.
//! [`RemovalTimeService::execute_sync`] runs the same plan inline, without a
//! batch row, and propagates the first failure to the caller.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tasker_retention::config::RetentionConfig;
//! use tasker_retention::database::{InMemoryBatchStore, InMemoryHistoryStore};
//! use tasker_retention::events::EventPublisher;
//! use tasker_retention::models::BatchType;
//! use tasker_retention::orchestration::{RemovalTimeService, SetRemovalTimeRequest};
//! use tasker_retention::utils::SystemClock;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let history = InMemoryHistoryStore::new();
//! let service = RemovalTimeService::new(
//!     history.clone(),
//!     Arc::new(history.writers()),
//!     InMemoryBatchStore::new(),
//!     Arc::new(RetentionConfig::default()),
//!     Arc::new(SystemClock),
//!     EventPublisher::default(),
//! );
//!
//! let request = SetRemovalTimeRequest::builder(BatchType::ProcessSetRemovalTime)
//!     .by_ids(["pi-1", "pi-2"])
//!     .clear_removal_time()?
//!     .build()?;
//! let batch = service.execute_async(&request).await?;
//! println!("created batch {}", batch.batch_id);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::batch_progress_tracker::BatchProgressTracker;
use super::chunk_planner::ChunkPlanner;
use super::execution_job_handler::{ExecutionJobHandler, JobOutcome};
use super::request::SetRemovalTimeRequest;
use super::seed_job::{execution_jobs, plan_jobs, SeedJobHandler};
use crate::config::RetentionConfig;
use crate::database::{BatchStore, HistoryReader, RemovalTimeWriters};
use crate::error::{Result, RetentionError, ValidationError};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::log_batch;
use crate::models::{
    AuditLogEntry, Batch, BatchOperation, BatchProgress, ChunkSize, EntityId, QueuedJob,
    SeedJobConfiguration,
};
use crate::utils::Clock;

/// Outcome of a synchronous execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub root_count: usize,
    pub jobs_run: usize,
    /// Handler attempts, counting every chunk of a chunked job
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct RemovalTimeService {
    reader: Arc<dyn HistoryReader>,
    store: Arc<dyn BatchStore>,
    config: Arc<RetentionConfig>,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
    seed_handler: SeedJobHandler,
    execution_handler: ExecutionJobHandler,
    progress_tracker: BatchProgressTracker,
}

impl RemovalTimeService {
    pub fn new(
        reader: Arc<dyn HistoryReader>,
        writers: Arc<RemovalTimeWriters>,
        store: Arc<dyn BatchStore>,
        config: Arc<RetentionConfig>,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        let history = Arc::new(config.history.clone());
        if !writers.is_complete() {
            warn!(registered = ?writers.kinds(), "Not every record kind has a removal time writer");
        }

        Self {
            seed_handler: SeedJobHandler::new(
                reader.clone(),
                store.clone(),
                clock.clone(),
                config.worker.max_retries,
            ),
            execution_handler: ExecutionJobHandler::new(reader.clone(), writers, history.clone()),
            progress_tracker: BatchProgressTracker::new(
                store.clone(),
                history,
                clock.clone(),
                events.clone(),
            ),
            reader,
            store,
            config,
            clock,
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn BatchStore> {
        &self.store
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn seed_handler(&self) -> &SeedJobHandler {
        &self.seed_handler
    }

    pub fn execution_handler(&self) -> &ExecutionJobHandler {
        &self.execution_handler
    }

    pub fn progress_tracker(&self) -> &BatchProgressTracker {
        &self.progress_tracker
    }

    /// Explicit ids followed by query matches, without duplicates
    pub async fn resolve_roots(&self, request: &SetRemovalTimeRequest) -> Result<Vec<EntityId>> {
        let selection = &request.selection;
        if !selection.is_specified() {
            return Err(ValidationError::NoSelection.into());
        }

        let mut roots = selection.ids.clone().unwrap_or_default();
        if let Some(query) = &selection.query {
            let matched = self
                .reader
                .query_roots(request.batch_type.root_kind(), query)
                .await?;
            roots.extend(matched);
        }

        let mut seen = HashSet::with_capacity(roots.len());
        roots.retain(|id| seen.insert(id.clone()));
        Ok(roots)
    }

    /// Create the batch and its seed job
    #[instrument(skip(self, request), fields(batch_type = %request.batch_type))]
    pub async fn execute_async(&self, request: &SetRemovalTimeRequest) -> Result<Batch> {
        let configuration = self.seed_configuration(request).await?;
        let now = self.clock.now();

        let batch = Batch::new(
            request.batch_type,
            BatchOperation {
                mode: request.mode,
                hierarchical: request.hierarchical,
                instance_count: configuration.root_ids.len() as u32,
            },
            configuration.invocations_per_batch_job,
            configuration.chunk_size.map(|size| size.get()),
            now,
        );
        let seed_job = QueuedJob::seed(
            batch.batch_id,
            configuration,
            self.config.worker.max_retries,
            now,
        );
        self.store.create_batch(&batch, &seed_job).await?;

        log_batch!(info, "Batch created",
            batch_id: batch.batch_id,
            batch_type: batch.batch_type.as_str(),
            instance_count: batch.operation.instance_count,
            hierarchical: request.hierarchical
        );
        self.events.publish(LifecycleEvent::BatchCreated(batch.clone()));
        Ok(batch)
    }

    /// Run every planned job inline until done
    #[instrument(skip(self, request), fields(batch_type = %request.batch_type))]
    pub async fn execute_sync(&self, request: &SetRemovalTimeRequest) -> Result<SyncReport> {
        let configuration = self.seed_configuration(request).await?;
        let planner = ChunkPlanner::with_chunk_size(
            configuration.invocations_per_batch_job,
            configuration.chunk_size,
        );
        let plans = plan_jobs(self.reader.as_ref(), &planner, &configuration).await?;
        let jobs = execution_jobs(Uuid::new_v4(), configuration.batch_type, plans);

        let mut report = SyncReport {
            root_count: configuration.root_ids.len(),
            jobs_run: jobs.len(),
            attempts: 0,
        };
        for job in jobs {
            let mut current = job;
            loop {
                report.attempts += 1;
                match self.execution_handler.run(&current).await? {
                    JobOutcome::Done => break,
                    JobOutcome::Rescheduled(successor) => current = successor,
                }
            }
        }

        let entry = AuditLogEntry::set_removal_time(
            request.batch_type,
            None,
            &request.mode,
            request.hierarchical,
            report.root_count as u32,
            false,
            self.clock.now(),
        );
        self.store.record_audit_entry(&entry).await?;

        debug!(attempts = report.attempts, jobs = report.jobs_run, "Synchronous execution finished");
        Ok(report)
    }

    pub async fn batch_progress(&self, batch_id: Uuid) -> Result<BatchProgress> {
        self.store
            .batch_progress(batch_id)
            .await?
            .ok_or(RetentionError::BatchNotFound(batch_id))
    }

    async fn seed_configuration(&self, request: &SetRemovalTimeRequest) -> Result<SeedJobConfiguration> {
        let root_ids = self.resolve_roots(request).await?;
        if root_ids.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }

        Ok(SeedJobConfiguration {
            batch_type: request.batch_type,
            root_ids,
            mode: request.mode,
            hierarchical: request.hierarchical,
            chunk_size: self.chunk_size_for(request)?,
            invocations_per_batch_job: self
                .config
                .batch
                .invocations_per_batch_job_for(request.batch_type),
        })
    }

    fn chunk_size_for(&self, request: &SetRemovalTimeRequest) -> Result<Option<ChunkSize>> {
        if !request.is_chunked() {
            return Ok(None);
        }
        match request.chunk_size {
            Some(chunk_size) => Ok(Some(chunk_size)),
            None => Ok(Some(self.config.batch.chunk_size()?)),
        }
    }
}
