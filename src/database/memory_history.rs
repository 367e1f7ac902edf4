//! # In-Memory History Store
//!
//! Historic tables held in concurrent maps. Implements [`HistoryReader`] and a
//! [`RecordWriter`] per record kind. Tests use it to seed hierarchies, inspect
//! stored removal times between job attempts and inject write failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use super::history::{HistoryReader, RecordWriter, RemovalTimeWriters};
use crate::error::{Result, RetentionError};
use crate::models::{EntityId, EntityRef, HierarchyEdge, HistoricQuery, HistoricRoot, RecordKind};

/// One call into a record writer, kept for ordering assertions
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub kind: RecordKind,
    pub ids: Vec<EntityId>,
    pub removal_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    /// Every row's current removal time
    rows: DashMap<EntityRef, Option<DateTime<Utc>>>,
    roots: DashMap<EntityRef, HistoricRoot>,
    dependents: DashMap<EntityRef, Vec<EntityRef>>,
    edges: DashMap<EntityRef, Vec<HierarchyEdge>>,
    failures: DashMap<RecordKind, usize>,
    write_log: Mutex<Vec<WriteRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an owning record with its metadata
    pub fn insert_root(&self, root: HistoricRoot) {
        self.rows.entry(root.entity.clone()).or_insert(None);
        self.roots.insert(root.entity.clone(), root);
    }

    /// Register a leaf record owned by `owner`
    pub fn insert_dependent(&self, owner: &EntityRef, dependent: EntityRef) {
        self.rows.entry(dependent.clone()).or_insert(None);
        self.dependents
            .entry(owner.clone())
            .or_default()
            .push(dependent);
    }

    pub fn insert_edge(&self, edge: HierarchyEdge) {
        self.edges.entry(edge.parent.clone()).or_default().push(edge);
    }

    /// Drop a record and everything it owns, as a concurrent history cleanup would
    pub fn delete_entity(&self, entity: &EntityRef) {
        self.rows.remove(entity);
        self.roots.remove(entity);
        self.edges.remove(entity);
        if let Some((_, dependents)) = self.dependents.remove(entity) {
            for dependent in dependents {
                self.rows.remove(&dependent);
            }
        }
    }

    /// `None` if the row does not exist, `Some(None)` if it has no removal time
    pub fn removal_time_of(&self, entity: &EntityRef) -> Option<Option<DateTime<Utc>>> {
        self.rows.get(entity).map(|row| *row.value())
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.rows.contains_key(entity)
    }

    /// Make the next `count` writes to `kind` fail
    pub fn fail_next_writes(&self, kind: RecordKind, count: usize) {
        self.failures.insert(kind, count);
    }

    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.write_log.lock().clone()
    }

    pub fn clear_write_log(&self) {
        self.write_log.lock().clear();
    }

    /// One writer per record kind, all backed by this store
    pub fn writers(self: &Arc<Self>) -> RemovalTimeWriters {
        RemovalTimeWriters::new(RecordKind::WRITE_ORDER.iter().map(|kind| {
            Arc::new(InMemoryRecordWriter {
                kind: *kind,
                store: Arc::clone(self),
            }) as Arc<dyn RecordWriter>
        }))
    }

    fn take_injected_failure(&self, kind: RecordKind) -> bool {
        match self.failures.get_mut(&kind) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn apply(
        &self,
        kind: RecordKind,
        ids: &[EntityId],
        removal_time: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        if self.take_injected_failure(kind) {
            return Err(RetentionError::StoreError(format!(
                "injected write failure for {kind}"
            )));
        }

        let mut touched = 0;
        for id in ids {
            if let Some(mut row) = self.rows.get_mut(&EntityRef::new(kind, id.clone())) {
                *row = removal_time;
                touched += 1;
            }
        }

        self.write_log.lock().push(WriteRecord {
            kind,
            ids: ids.to_vec(),
            removal_time,
        });
        Ok(touched)
    }
}

#[async_trait]
impl HistoryReader for InMemoryHistoryStore {
    async fn query_roots(&self, kind: RecordKind, query: &HistoricQuery) -> Result<Vec<EntityId>> {
        let mut ids: Vec<EntityId> = self
            .roots
            .iter()
            .filter(|entry| entry.key().kind == kind && query.matches(entry.value()))
            .map(|entry| entry.key().id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn find_root(&self, entity: &EntityRef) -> Result<Option<HistoricRoot>> {
        Ok(self.roots.get(entity).map(|root| root.value().clone()))
    }

    async fn deployment_of(&self, entity: &EntityRef) -> Result<Option<String>> {
        Ok(self
            .roots
            .get(entity)
            .and_then(|root| root.deployment_id.clone()))
    }

    async fn child_edges(&self, entity: &EntityRef) -> Result<Vec<HierarchyEdge>> {
        Ok(self
            .edges
            .get(entity)
            .map(|edges| edges.value().clone())
            .unwrap_or_default())
    }

    async fn dependents_of(&self, owner: &EntityRef) -> Result<Vec<EntityRef>> {
        Ok(self
            .dependents
            .get(owner)
            .map(|dependents| {
                dependents
                    .iter()
                    .filter(|dependent| self.rows.contains_key(*dependent))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Debug)]
pub struct InMemoryRecordWriter {
    kind: RecordKind,
    store: Arc<InMemoryHistoryStore>,
}

#[async_trait]
impl RecordWriter for InMemoryRecordWriter {
    fn kind(&self) -> RecordKind {
        self.kind
    }

    async fn write_removal_time(
        &self,
        ids: &[EntityId],
        removal_time: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        self.store.apply(self.kind, ids, removal_time)
    }
}
