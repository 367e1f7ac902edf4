//! # Chunk Planner
//!
//! Partitions selected roots into execution jobs.
//!
//! 1. Roots are grouped by owning deployment, so a job never spans deployments.
//! 2. Each group is split into jobs of at most `invocations_per_job` roots.
//! 3. The chunk size travels with each plan and bounds the rows one attempt
//!    writes. Chunked plans carry exactly one root each.
//!
//! The chunk size is validated when the planner is built, before any job exists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ConfigurationError;
use crate::models::{ChunkSize, EntityId, RemovalTimeMode};

/// One future execution job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPlan {
    pub deployment_id: Option<String>,
    pub root_ids: Vec<EntityId>,
    pub mode: RemovalTimeMode,
    pub hierarchical: bool,
    pub chunk_size: Option<ChunkSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlanner {
    invocations_per_job: u32,
    chunk_size: Option<ChunkSize>,
}

impl ChunkPlanner {
    /// `chunk_size` is the raw requested value; `None` disables chunking
    pub fn new(invocations_per_job: u32, chunk_size: Option<i64>) -> Result<Self, ConfigurationError> {
        let chunk_size = chunk_size.map(ChunkSize::new).transpose()?;
        Ok(Self::with_chunk_size(invocations_per_job, chunk_size))
    }

    pub fn with_chunk_size(invocations_per_job: u32, chunk_size: Option<ChunkSize>) -> Self {
        Self {
            invocations_per_job,
            chunk_size,
        }
    }

    /// Roots per job after the chunked-update override
    pub fn effective_invocations_per_job(&self) -> usize {
        if self.chunk_size.is_some() {
            1
        } else {
            self.invocations_per_job.max(1) as usize
        }
    }

    pub fn chunk_size(&self) -> Option<ChunkSize> {
        self.chunk_size
    }

    /// Plan jobs for `roots`, given as `(root id, owning deployment)` pairs.
    ///
    /// Groups are emitted in deployment order (roots without a deployment
    /// first); roots keep their input order inside a group.
    pub fn plan(
        &self,
        roots: &[(EntityId, Option<String>)],
        mode: &RemovalTimeMode,
        hierarchical: bool,
    ) -> Vec<JobPlan> {
        let mut by_deployment: BTreeMap<Option<String>, Vec<EntityId>> = BTreeMap::new();
        for (root_id, deployment_id) in roots {
            by_deployment
                .entry(deployment_id.clone())
                .or_default()
                .push(root_id.clone());
        }

        let per_job = self.effective_invocations_per_job();
        by_deployment
            .into_iter()
            .flat_map(|(deployment_id, root_ids)| {
                root_ids
                    .chunks(per_job)
                    .map(|batch| JobPlan {
                        deployment_id: deployment_id.clone(),
                        root_ids: batch.to_vec(),
                        mode: *mode,
                        hierarchical,
                        chunk_size: self.chunk_size,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
