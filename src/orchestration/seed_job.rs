//! # Seed Job
//!
//! Expands a batch's root ids into execution jobs. The seed job runs once per
//! batch, but a crashed seed attempt is simply run again: execution job ids are
//! derived from the batch id and the plan position, so a rerun produces the
//! same rows and the store ignores the ones it already has.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::chunk_planner::{ChunkPlanner, JobPlan};
use crate::database::{BatchStore, HistoryReader};
use crate::error::Result;
use crate::log_batch;
use crate::models::{
    BatchProgress, BatchType, ChunkCursor, EntityId, EntityRef, ExecutionJob,
    ExecutionJobConfiguration, QueuedJob, SeedJobConfiguration,
};
use crate::utils::Clock;

/// Look up the owning deployment of every root and plan jobs for them
pub async fn plan_jobs(
    reader: &dyn HistoryReader,
    planner: &ChunkPlanner,
    configuration: &SeedJobConfiguration,
) -> Result<Vec<JobPlan>> {
    let root_kind = configuration.batch_type.root_kind();
    let mut roots: Vec<(EntityId, Option<String>)> = Vec::with_capacity(configuration.root_ids.len());
    for root_id in &configuration.root_ids {
        let deployment_id = reader
            .deployment_of(&EntityRef::new(root_kind, root_id.clone()))
            .await?;
        roots.push((root_id.clone(), deployment_id));
    }

    Ok(planner.plan(&roots, &configuration.mode, configuration.hierarchical))
}

/// Execution jobs for `plans`, with ids stable across reruns
pub fn execution_jobs(batch_id: Uuid, batch_type: BatchType, plans: Vec<JobPlan>) -> Vec<ExecutionJob> {
    plans
        .into_iter()
        .enumerate()
        .map(|(index, plan)| ExecutionJob {
            job_id: Uuid::new_v5(&batch_id, format!("execution:{index}").as_bytes()),
            batch_id,
            deployment_id: plan.deployment_id,
            configuration: ExecutionJobConfiguration {
                batch_type,
                root_ids: plan.root_ids,
                mode: plan.mode,
                hierarchical: plan.hierarchical,
                chunk_size: plan.chunk_size,
                cursor: ChunkCursor::default(),
            },
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SeedJobHandler {
    reader: Arc<dyn HistoryReader>,
    store: Arc<dyn BatchStore>,
    clock: Arc<dyn Clock>,
    job_retries: u32,
}

impl SeedJobHandler {
    pub fn new(
        reader: Arc<dyn HistoryReader>,
        store: Arc<dyn BatchStore>,
        clock: Arc<dyn Clock>,
        job_retries: u32,
    ) -> Self {
        Self {
            reader,
            store,
            clock,
            job_retries,
        }
    }

    /// Plan and persist the execution jobs, replacing the seed job
    #[instrument(skip(self, configuration), fields(root_count = configuration.root_ids.len()))]
    pub async fn run(
        &self,
        batch_id: Uuid,
        seed_job_id: Uuid,
        configuration: &SeedJobConfiguration,
    ) -> Result<BatchProgress> {
        let planner = ChunkPlanner::with_chunk_size(
            configuration.invocations_per_batch_job,
            configuration.chunk_size,
        );
        let plans = plan_jobs(self.reader.as_ref(), &planner, configuration).await?;
        debug!(plan_count = plans.len(), "Planned execution jobs");

        let now: DateTime<Utc> = self.clock.now();
        let jobs: Vec<QueuedJob> = execution_jobs(batch_id, configuration.batch_type, plans)
            .into_iter()
            .map(|job| QueuedJob::execution(job, self.job_retries, now))
            .collect();

        let progress = self.store.complete_seed(batch_id, seed_job_id, &jobs).await?;

        log_batch!(info, "Seed job completed",
            batch_id: batch_id,
            total_jobs: progress.total_jobs,
            chunked: configuration.chunk_size.is_some()
        );
        Ok(progress)
    }
}
