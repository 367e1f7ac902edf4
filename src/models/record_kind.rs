//! # Record Kinds
//!
//! Every historic table that carries a removal time. The declaration order of
//! [`RecordKind::WRITE_ORDER`] is the order in which an execution job touches the
//! tables: dependent rows first, owning records last.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    ActivityInstance,
    TaskInstance,
    VariableInstance,
    Detail,
    Incident,
    ExternalTaskLog,
    JobLog,
    OperationLog,
    IdentityLinkLog,
    Comment,
    Attachment,
    ByteArray,
    Authorization,
    DecisionInputInstance,
    DecisionOutputInstance,
    DecisionInstance,
    Batch,
    ProcessInstance,
}

impl RecordKind {
    /// Fixed write order. Owning kinds close the list so that a crash mid-job
    /// leaves the owner without a removal time.
    pub const WRITE_ORDER: [RecordKind; 18] = [
        RecordKind::ActivityInstance,
        RecordKind::TaskInstance,
        RecordKind::VariableInstance,
        RecordKind::Detail,
        RecordKind::Incident,
        RecordKind::ExternalTaskLog,
        RecordKind::JobLog,
        RecordKind::OperationLog,
        RecordKind::IdentityLinkLog,
        RecordKind::Comment,
        RecordKind::Attachment,
        RecordKind::ByteArray,
        RecordKind::Authorization,
        RecordKind::DecisionInputInstance,
        RecordKind::DecisionOutputInstance,
        RecordKind::DecisionInstance,
        RecordKind::Batch,
        RecordKind::ProcessInstance,
    ];

    /// Owning kinds may be selected as roots and have dependents of their own
    pub fn is_owner(&self) -> bool {
        matches!(
            self,
            Self::ProcessInstance | Self::DecisionInstance | Self::Batch
        )
    }

    /// Position in [`Self::WRITE_ORDER`]
    pub fn write_rank(&self) -> usize {
        Self::WRITE_ORDER
            .iter()
            .position(|kind| kind == self)
            .unwrap_or(Self::WRITE_ORDER.len())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActivityInstance => "activity_instance",
            Self::TaskInstance => "task_instance",
            Self::VariableInstance => "variable_instance",
            Self::Detail => "detail",
            Self::Incident => "incident",
            Self::ExternalTaskLog => "external_task_log",
            Self::JobLog => "job_log",
            Self::OperationLog => "operation_log",
            Self::IdentityLinkLog => "identity_link_log",
            Self::Comment => "comment",
            Self::Attachment => "attachment",
            Self::ByteArray => "byte_array",
            Self::Authorization => "authorization",
            Self::DecisionInputInstance => "decision_input_instance",
            Self::DecisionOutputInstance => "decision_output_instance",
            Self::DecisionInstance => "decision_instance",
            Self::Batch => "batch",
            Self::ProcessInstance => "process_instance",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::WRITE_ORDER
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Invalid record kind: {s}"))
    }
}
