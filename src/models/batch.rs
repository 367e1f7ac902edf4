//! # Batch
//!
//! One bulk set-removal-time request. The batch row is created together with its
//! seed job, receives its execution-job total from the seed job, counts down as
//! execution jobs finish, and is archived into a [`HistoricBatch`] exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::record_kind::RecordKind;
use super::removal_time::RemovalTimeMode;
use crate::constants::batch_types;

/// Removal-time batch variant, identified by its tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchType {
    ProcessSetRemovalTime,
    DecisionSetRemovalTime,
    BatchSetRemovalTime,
}

impl BatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessSetRemovalTime => batch_types::PROCESS_SET_REMOVAL_TIME,
            Self::DecisionSetRemovalTime => batch_types::DECISION_SET_REMOVAL_TIME,
            Self::BatchSetRemovalTime => batch_types::BATCH_SET_REMOVAL_TIME,
        }
    }

    /// Record kind of the roots this batch type selects
    pub fn root_kind(&self) -> RecordKind {
        match self {
            Self::ProcessSetRemovalTime => RecordKind::ProcessInstance,
            Self::DecisionSetRemovalTime => RecordKind::DecisionInstance,
            Self::BatchSetRemovalTime => RecordKind::Batch,
        }
    }

    /// Entity type recorded on the audit log entry
    pub fn audit_entity_type(&self) -> &'static str {
        match self {
            Self::ProcessSetRemovalTime => "ProcessInstance",
            Self::DecisionSetRemovalTime => "DecisionInstance",
            Self::BatchSetRemovalTime => "Batch",
        }
    }
}

impl fmt::Display for BatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            batch_types::PROCESS_SET_REMOVAL_TIME => Ok(Self::ProcessSetRemovalTime),
            batch_types::DECISION_SET_REMOVAL_TIME => Ok(Self::DecisionSetRemovalTime),
            batch_types::BATCH_SET_REMOVAL_TIME => Ok(Self::BatchSetRemovalTime),
            _ => Err(format!("Invalid batch type: {s}")),
        }
    }
}

/// Request-level settings kept on the batch for the completion audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub mode: RemovalTimeMode,
    pub hierarchical: bool,
    pub instance_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: Uuid,
    pub batch_type: BatchType,
    pub total_seed_jobs: u32,
    pub total_jobs: u32,
    pub completed_jobs: u32,
    pub remaining_jobs: u32,
    pub seed_completed: bool,
    pub invocations_per_batch_job: u32,
    /// Set when the request asked for chunked updates
    pub chunk_size: Option<u32>,
    pub operation: BatchOperation,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn new(
        batch_type: BatchType,
        operation: BatchOperation,
        invocations_per_batch_job: u32,
        chunk_size: Option<u32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            batch_type,
            total_seed_jobs: 1,
            total_jobs: 0,
            completed_jobs: 0,
            remaining_jobs: 0,
            seed_completed: false,
            invocations_per_batch_job,
            chunk_size,
            operation,
            created_at: now,
            start_time: now,
            finalized_at: None,
        }
    }

    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            batch_id: self.batch_id,
            total_jobs: self.total_jobs,
            completed_jobs: self.completed_jobs,
            remaining_jobs: self.remaining_jobs,
            seed_completed: self.seed_completed,
            finalized: self.finalized_at.is_some(),
        }
    }
}

/// Counter snapshot returned by the atomic decrement and by progress queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: Uuid,
    pub total_jobs: u32,
    pub completed_jobs: u32,
    pub remaining_jobs: u32,
    pub seed_completed: bool,
    pub finalized: bool,
}

impl BatchProgress {
    /// All execution jobs accounted for
    pub fn is_drained(&self) -> bool {
        self.seed_completed && self.remaining_jobs == 0
    }
}

/// Archive row written once a batch completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricBatch {
    pub batch_id: Uuid,
    pub batch_type: BatchType,
    pub total_jobs: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub removal_time: Option<DateTime<Utc>>,
}
