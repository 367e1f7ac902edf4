//! # Historic Entities and Hierarchy Edges
//!
//! Read-only shapes produced by the execution engine and consumed by the
//! hierarchy resolver and the removal-time strategy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::record_kind::RecordKind;
use super::removal_time::TimeToLive;

/// Opaque id of a historic record
pub type EntityId = String;

/// A historic record addressed by kind and id.
///
/// Ordering is write order first, then id, which makes it usable as a keyset
/// cursor over a write plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: RecordKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: RecordKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn process_instance(id: impl Into<EntityId>) -> Self {
        Self::new(RecordKind::ProcessInstance, id)
    }

    pub fn decision_instance(id: impl Into<EntityId>) -> Self {
        Self::new(RecordKind::DecisionInstance, id)
    }

    pub fn batch(id: impl Into<EntityId>) -> Self {
        Self::new(RecordKind::Batch, id)
    }
}

impl PartialOrd for EntityRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.kind
            .write_rank()
            .cmp(&other.kind.write_rank())
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Relation carried by a [`HierarchyEdge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Super process instance called a sub process instance
    ProcessCall,
    /// Process instance evaluated a root decision
    ProcessEvaluatesDecision,
    /// Root decision evaluation triggered a required decision in the same evaluation
    DecisionNesting,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub kind: EdgeKind,
    pub parent: EntityRef,
    pub child: EntityRef,
}

impl HierarchyEdge {
    pub fn process_call(parent: impl Into<EntityId>, child: impl Into<EntityId>) -> Self {
        Self {
            kind: EdgeKind::ProcessCall,
            parent: EntityRef::process_instance(parent),
            child: EntityRef::process_instance(child),
        }
    }

    pub fn process_evaluates_decision(
        process_instance: impl Into<EntityId>,
        decision_instance: impl Into<EntityId>,
    ) -> Self {
        Self {
            kind: EdgeKind::ProcessEvaluatesDecision,
            parent: EntityRef::process_instance(process_instance),
            child: EntityRef::decision_instance(decision_instance),
        }
    }

    pub fn decision_nesting(root: impl Into<EntityId>, nested: impl Into<EntityId>) -> Self {
        Self {
            kind: EdgeKind::DecisionNesting,
            parent: EntityRef::decision_instance(root),
            child: EntityRef::decision_instance(nested),
        }
    }
}

/// What the strategy needs to know about a selected root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricRoot {
    pub entity: EntityRef,
    /// Partition key for deployment affinity; batches have none
    pub deployment_id: Option<String>,
    pub start_time: DateTime<Utc>,
    /// Unset while the entity is still running
    pub end_time: Option<DateTime<Utc>>,
    /// Time to live of the owning definition, if one is configured
    pub time_to_live: Option<TimeToLive>,
    /// Batch type tag of a historic batch root
    pub batch_type: Option<String>,
}
