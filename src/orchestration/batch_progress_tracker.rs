//! # Batch Progress Tracker
//!
//! Counts execution jobs down and finalizes a batch once it drains. Several
//! workers may observe the drained state at once; the store's conditional
//! finalize lets exactly one of them archive the batch and write the audit entry.
//!
//! The countdown commits before finalization starts, so the job that drained
//! the batch is gone by then. A failed finalization therefore never fails that
//! job; the batch stays drained and [`BatchProgressTracker::finalize_drained`]
//! picks it up on the next idle poll.

use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::removal_time_strategy::RemovalTimeStrategy;
use crate::config::HistoryConfig;
use crate::constants::DRAINED_BATCH_SWEEP_LIMIT;
use crate::database::BatchStore;
use crate::error::{Result, RetentionError};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::log_batch;
use crate::models::{AuditLogEntry, BatchProgress, HistoricBatch, RemovalTimeMode};
use crate::utils::Clock;

#[derive(Debug, Clone)]
pub struct BatchProgressTracker {
    store: Arc<dyn BatchStore>,
    history: Arc<HistoryConfig>,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
}

impl BatchProgressTracker {
    pub fn new(
        store: Arc<dyn BatchStore>,
        history: Arc<HistoryConfig>,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            history,
            clock,
            events,
        }
    }

    /// Record a finished execution job; returns `None` if it was already counted
    #[instrument(skip(self))]
    pub async fn on_execution_job_finished(&self, job_id: Uuid) -> Result<Option<BatchProgress>> {
        let Some(progress) = self.store.complete_execution_job(job_id).await? else {
            debug!("Execution job already accounted for");
            return Ok(None);
        };

        if progress.is_drained() {
            self.finalize_or_defer(progress.batch_id).await;
        }
        Ok(Some(progress))
    }

    /// A seed job that planned no execution jobs leaves the batch drained
    pub async fn on_seed_completed(&self, progress: BatchProgress) -> Result<bool> {
        if progress.is_drained() {
            return Ok(self.finalize_or_defer(progress.batch_id).await);
        }
        Ok(false)
    }

    /// Finalize batches that drained without being archived; returns how many
    /// this caller won
    #[instrument(skip(self))]
    pub async fn finalize_drained(&self) -> Result<usize> {
        let mut finalized = 0;
        for batch_id in self.store.drained_batches(DRAINED_BATCH_SWEEP_LIMIT).await? {
            if self.finalize(batch_id).await? {
                finalized += 1;
            }
        }
        if finalized > 0 {
            debug!(finalized, "Finalized drained batches");
        }
        Ok(finalized)
    }

    async fn finalize_or_defer(&self, batch_id: Uuid) -> bool {
        match self.finalize(batch_id).await {
            Ok(won) => won,
            Err(e) => {
                warn!(%batch_id, error = %e, "Batch finalization failed, left for the drained batch sweep");
                false
            }
        }
    }

    /// Archive the batch if it is drained and not yet finalized; true for the winner
    #[instrument(skip(self))]
    pub async fn finalize(&self, batch_id: Uuid) -> Result<bool> {
        let batch = self
            .store
            .find_batch(batch_id)
            .await?
            .ok_or(RetentionError::BatchNotFound(batch_id))?;
        if batch.finalized_at.is_some() || !batch.progress().is_drained() {
            return Ok(false);
        }

        let now = self.clock.now();
        let strategy = RemovalTimeStrategy::new(self.history.removal_time_strategy);
        let historic = HistoricBatch {
            batch_id,
            batch_type: batch.batch_type,
            total_jobs: batch.total_jobs,
            start_time: batch.start_time,
            end_time: now,
            removal_time: strategy.compute(
                &RemovalTimeMode::Calculated,
                batch.start_time,
                Some(now),
                self.history.batch_time_to_live(batch.batch_type.as_str()),
            ),
        };
        let audit_entry = AuditLogEntry::set_removal_time(
            batch.batch_type,
            Some(batch_id),
            &batch.operation.mode,
            batch.operation.hierarchical,
            batch.operation.instance_count,
            true,
            now,
        );

        if !self.store.try_finalize(batch_id, &historic, &audit_entry).await? {
            debug!("Batch finalized by another worker");
            return Ok(false);
        }

        log_batch!(info, "Batch completed",
            batch_id: batch_id,
            batch_type: batch.batch_type.as_str(),
            total_jobs: batch.total_jobs
        );
        self.events.publish(LifecycleEvent::BatchCompleted(historic));
        Ok(true)
    }
}
