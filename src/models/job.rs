//! # Seed and Execution Jobs
//!
//! Persisted, retryable units of work. A batch owns exactly one seed job, which
//! expands into execution jobs; an execution job either finishes or is replaced
//! by a successor carrying an advanced [`ChunkCursor`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::batch::BatchType;
use super::hierarchy::{EntityId, EntityRef};
use super::removal_time::RemovalTimeMode;
use crate::config::ConfigurationError;
use crate::constants::MAX_CHUNK_SIZE;

/// Validated row limit for one chunked attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct ChunkSize(u32);

impl ChunkSize {
    /// Accepts `1..=MAX_CHUNK_SIZE`; zero, negative and oversized values share one error path
    pub fn new(value: i64) -> Result<Self, ConfigurationError> {
        if (1..=i64::from(MAX_CHUNK_SIZE)).contains(&value) {
            Ok(Self(value as u32))
        } else {
            Err(ConfigurationError::ChunkSizeOutOfRange {
                value,
                max: MAX_CHUNK_SIZE,
            })
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<i64> for ChunkSize {
    type Error = ConfigurationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChunkSize> for u32 {
    fn from(size: ChunkSize) -> Self {
        size.0
    }
}

/// Keyset position inside an execution job's write plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCursor {
    /// Rows written by all previous attempts of this job lineage
    pub rows_applied: u64,
    /// Last entity written; the next attempt resumes strictly after it
    pub last_written: Option<EntityRef>,
}

impl ChunkCursor {
    pub fn is_start(&self) -> bool {
        self.last_written.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedJobConfiguration {
    pub batch_type: BatchType,
    pub root_ids: Vec<EntityId>,
    pub mode: RemovalTimeMode,
    pub hierarchical: bool,
    /// Present when the request asked for chunked updates
    pub chunk_size: Option<ChunkSize>,
    pub invocations_per_batch_job: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionJobConfiguration {
    pub batch_type: BatchType,
    pub root_ids: Vec<EntityId>,
    pub mode: RemovalTimeMode,
    pub hierarchical: bool,
    pub chunk_size: Option<ChunkSize>,
    #[serde(default)]
    pub cursor: ChunkCursor,
}

/// Execution job as handed to the handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub job_id: Uuid,
    pub batch_id: Uuid,
    pub deployment_id: Option<String>,
    pub configuration: ExecutionJobConfiguration,
}

impl ExecutionJob {
    /// Successor that resumes after `cursor`; the id is derived from the
    /// predecessor so a retried replacement lands on the same row
    pub fn successor(&self, cursor: ChunkCursor) -> Self {
        let name = format!("{}:{}", self.job_id, cursor.rows_applied);
        Self {
            job_id: Uuid::new_v5(&self.batch_id, name.as_bytes()),
            batch_id: self.batch_id,
            deployment_id: self.deployment_id.clone(),
            configuration: ExecutionJobConfiguration {
                cursor,
                ..self.configuration.clone()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Seed(SeedJobConfiguration),
    Execution(ExecutionJobConfiguration),
}

impl JobPayload {
    pub fn is_seed(&self) -> bool {
        matches!(self, Self::Seed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker
    Pending,
    /// Claimed by a worker for the current attempt
    Claimed,
    /// Retries exhausted; kept as an incident
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Claimed => write!(f, "claimed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

/// Row in the shared job queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub batch_id: Uuid,
    pub deployment_id: Option<String>,
    pub payload: JobPayload,
    pub retries: u32,
    pub state: JobState,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// End of the current claim's lease; unset unless claimed
    #[serde(default)]
    pub lock_expires_at: Option<DateTime<Utc>>,
}

impl QueuedJob {
    pub fn seed(
        batch_id: Uuid,
        configuration: SeedJobConfiguration,
        retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v5(&batch_id, b"seed"),
            batch_id,
            deployment_id: None,
            payload: JobPayload::Seed(configuration),
            retries,
            state: JobState::Pending,
            last_error: None,
            created_at: now,
            lock_expires_at: None,
        }
    }

    pub fn execution(job: ExecutionJob, retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job.job_id,
            batch_id: job.batch_id,
            deployment_id: job.deployment_id,
            payload: JobPayload::Execution(job.configuration),
            retries,
            state: JobState::Pending,
            last_error: None,
            created_at: now,
            lock_expires_at: None,
        }
    }

    /// Whether a worker may claim this row at `now`
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Pending => true,
            JobState::Claimed => self.lock_expires_at.is_some_and(|expires| expires <= now),
            JobState::Failed => false,
        }
    }

    /// View of an execution row as the handler input
    pub fn as_execution_job(&self) -> Option<ExecutionJob> {
        match &self.payload {
            JobPayload::Execution(configuration) => Some(ExecutionJob {
                job_id: self.job_id,
                batch_id: self.batch_id,
                deployment_id: self.deployment_id.clone(),
                configuration: configuration.clone(),
            }),
            JobPayload::Seed(_) => None,
        }
    }
}
