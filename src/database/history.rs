//! # History Collaborators
//!
//! Read access to the historic hierarchy and per-record-kind removal-time
//! writers. The engine never sees SQL for historic tables; it talks to these
//! traits only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{Result, RetentionError};
use crate::models::{EntityId, EntityRef, HierarchyEdge, HistoricQuery, HistoricRoot, RecordKind};

/// Read side of the historic store
#[async_trait]
pub trait HistoryReader: Send + Sync + Debug {
    /// Ids of roots of `kind` matching `query`
    async fn query_roots(&self, kind: RecordKind, query: &HistoricQuery) -> Result<Vec<EntityId>>;

    /// Root metadata, `None` if the entity no longer exists
    async fn find_root(&self, entity: &EntityRef) -> Result<Option<HistoricRoot>>;

    /// Owning deployment of a root; `None` for batches and vanished roots
    async fn deployment_of(&self, entity: &EntityRef) -> Result<Option<String>>;

    /// Hierarchy edges whose parent is `entity`
    async fn child_edges(&self, entity: &EntityRef) -> Result<Vec<HierarchyEdge>>;

    /// Leaf records owned directly by `owner`; never other owning records
    async fn dependents_of(&self, owner: &EntityRef) -> Result<Vec<EntityRef>>;
}

/// Removal-time writer for one record kind
#[async_trait]
pub trait RecordWriter: Send + Sync + Debug {
    fn kind(&self) -> RecordKind;

    /// Set (or clear, with `None`) the removal time of `ids`; returns rows touched
    async fn write_removal_time(
        &self,
        ids: &[EntityId],
        removal_time: Option<DateTime<Utc>>,
    ) -> Result<u64>;
}

/// Writers keyed by record kind, iterated in write order
#[derive(Debug, Clone, Default)]
pub struct RemovalTimeWriters {
    writers: BTreeMap<usize, Arc<dyn RecordWriter>>,
}

impl RemovalTimeWriters {
    pub fn new(writers: impl IntoIterator<Item = Arc<dyn RecordWriter>>) -> Self {
        let writers = writers
            .into_iter()
            .map(|writer| (writer.kind().write_rank(), writer))
            .collect();
        Self { writers }
    }

    pub fn register(&mut self, writer: Arc<dyn RecordWriter>) {
        self.writers.insert(writer.kind().write_rank(), writer);
    }

    pub fn for_kind(&self, kind: RecordKind) -> Result<&Arc<dyn RecordWriter>> {
        self.writers.get(&kind.write_rank()).ok_or_else(|| {
            RetentionError::StoreError(format!("no removal time writer registered for {kind}"))
        })
    }

    /// Registered kinds in write order
    pub fn kinds(&self) -> Vec<RecordKind> {
        self.writers.values().map(|writer| writer.kind()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.writers.len() == RecordKind::WRITE_ORDER.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NoopWriter(RecordKind);

    #[async_trait]
    impl RecordWriter for NoopWriter {
        fn kind(&self) -> RecordKind {
            self.0
        }

        async fn write_removal_time(
            &self,
            ids: &[EntityId],
            _removal_time: Option<DateTime<Utc>>,
        ) -> Result<u64> {
            Ok(ids.len() as u64)
        }
    }

    #[test]
    fn test_writers_iterate_in_write_order() {
        let writers = RemovalTimeWriters::new([
            Arc::new(NoopWriter(RecordKind::ProcessInstance)) as Arc<dyn RecordWriter>,
            Arc::new(NoopWriter(RecordKind::VariableInstance)),
            Arc::new(NoopWriter(RecordKind::ActivityInstance)),
        ]);

        assert_eq!(
            writers.kinds(),
            vec![
                RecordKind::ActivityInstance,
                RecordKind::VariableInstance,
                RecordKind::ProcessInstance
            ]
        );
        assert!(!writers.is_complete());
        assert!(writers.for_kind(RecordKind::Comment).is_err());
    }
}
