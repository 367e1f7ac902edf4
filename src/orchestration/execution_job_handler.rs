//! # Execution Job Handler
//!
//! Applies removal times for the roots of one execution job.
//!
//! Every attempt re-resolves the hierarchy and builds a write plan in three
//! phases: dependent rows, then owning records reached through the hierarchy,
//! then the selected roots. Each phase is ordered by [`EntityRef`], which makes
//! the plan a keyset the [`ChunkCursor`] can resume from.
//!
//! Without a chunk size the whole plan is written in one attempt. With one, an
//! attempt writes at most `chunk_size` rows and never mixes dependent rows with
//! owners in the same window; when rows remain, the job is replaced by a
//! successor resuming after the last row written. A selected root therefore
//! only receives its removal time once everything attached to it has one.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::hierarchy_resolver::{HierarchyResolver, TargetRole, TargetSet};
use super::removal_time_strategy::RemovalTimeStrategy;
use crate::config::HistoryConfig;
use crate::database::{HistoryReader, RemovalTimeWriters};
use crate::error::Result;
use crate::log_job;
use crate::models::{ChunkCursor, EntityRef, ExecutionJob};

/// Result of one execution job attempt
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Nothing left to write for this job
    Done,
    /// Rows remain; the successor resumes after the last row written
    Rescheduled(ExecutionJob),
}

impl JobOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PlannedWrite {
    phase: TargetRole,
    entity: EntityRef,
    removal_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ExecutionJobHandler {
    resolver: HierarchyResolver,
    writers: Arc<RemovalTimeWriters>,
    strategy: RemovalTimeStrategy,
    history: Arc<HistoryConfig>,
}

impl ExecutionJobHandler {
    pub fn new(
        reader: Arc<dyn HistoryReader>,
        writers: Arc<RemovalTimeWriters>,
        history: Arc<HistoryConfig>,
    ) -> Self {
        Self {
            resolver: HierarchyResolver::new(reader, history.enable_historic_instance_permissions),
            writers,
            strategy: RemovalTimeStrategy::new(history.removal_time_strategy),
            history,
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, batch_id = %job.batch_id))]
    pub async fn run(&self, job: &ExecutionJob) -> Result<JobOutcome> {
        let configuration = &job.configuration;
        let root_kind = configuration.batch_type.root_kind();
        let roots: Vec<EntityRef> = configuration
            .root_ids
            .iter()
            .map(|id| EntityRef::new(root_kind, id.clone()))
            .collect();

        let targets = self.resolver.resolve(&roots, configuration.hierarchical).await?;
        if targets.is_empty() {
            debug!("No targets left for execution job");
            return Ok(JobOutcome::Done);
        }

        let plan = self.write_plan(job, &targets);
        let remaining = remaining_after(plan, &configuration.cursor, &targets);
        if remaining.is_empty() {
            return Ok(JobOutcome::Done);
        }

        let window = match configuration.chunk_size {
            Some(chunk_size) => chunk_window(&remaining, chunk_size.as_usize()),
            None => remaining.len(),
        };
        let rows_touched = self.apply(&remaining[..window]).await?;

        let rows_applied = configuration.cursor.rows_applied + window as u64;
        log_job!(debug, "Applied removal time window",
            job_id: job.job_id,
            rows_planned: window,
            rows_touched: rows_touched,
            rows_applied: rows_applied
        );

        if window == remaining.len() {
            return Ok(JobOutcome::Done);
        }

        let cursor = ChunkCursor {
            rows_applied,
            last_written: Some(remaining[window - 1].entity.clone()),
        };
        Ok(JobOutcome::Rescheduled(job.successor(cursor)))
    }

    /// Full ordered plan; every entity inherits the removal time of its root
    fn write_plan(&self, job: &ExecutionJob, targets: &TargetSet) -> Vec<PlannedWrite> {
        let mode = &job.configuration.mode;
        let mut plan = Vec::with_capacity(targets.len());

        for root_targets in &targets.roots {
            let removal_time = self
                .strategy
                .compute_for_root(mode, &root_targets.root, &self.history);

            plan.extend(root_targets.entities().map(|(phase, entity)| PlannedWrite {
                phase,
                entity: entity.clone(),
                removal_time,
            }));
        }

        plan.sort_by(|a, b| (a.phase, &a.entity).cmp(&(b.phase, &b.entity)));
        plan
    }

    /// Write `window` as consecutive runs sharing kind and value
    async fn apply(&self, window: &[PlannedWrite]) -> Result<u64> {
        let mut rows = 0;
        let runs = window
            .chunk_by(|a, b| a.entity.kind == b.entity.kind && a.removal_time == b.removal_time);
        for run in runs {
            let kind = run[0].entity.kind;
            let ids: Vec<_> = run.iter().map(|write| write.entity.id.clone()).collect();
            rows += self
                .writers
                .for_kind(kind)?
                .write_removal_time(&ids, run[0].removal_time)
                .await?;
        }
        Ok(rows)
    }
}

/// Plan entries strictly after the cursor position
fn remaining_after(
    plan: Vec<PlannedWrite>,
    cursor: &ChunkCursor,
    targets: &TargetSet,
) -> Vec<PlannedWrite> {
    let Some(last_written) = &cursor.last_written else {
        return plan;
    };

    let roots: HashSet<&EntityRef> = targets.roots.iter().map(|root| &root.root.entity).collect();
    let last_phase = if roots.contains(last_written) {
        TargetRole::Root
    } else if last_written.kind.is_owner() {
        TargetRole::Owner
    } else {
        TargetRole::Dependent
    };

    plan.into_iter()
        .filter(|write| (write.phase, &write.entity) > (last_phase, last_written))
        .collect()
}

/// Number of leading entries one chunked attempt writes
fn chunk_window(remaining: &[PlannedWrite], chunk_size: usize) -> usize {
    let limit = chunk_size.min(remaining.len());
    if remaining[0].phase != TargetRole::Dependent {
        return limit;
    }
    remaining[..limit]
        .iter()
        .position(|write| write.phase != TargetRole::Dependent)
        .unwrap_or(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryHistoryStore;
    use crate::models::{
        BaseTimeStrategy, BatchType, ChunkSize, ExecutionJobConfiguration, HierarchyEdge,
        HistoricRoot, RecordKind, RemovalTimeMode, TimeToLive,
    };
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn process_root(id: &str, ttl: u32) -> HistoricRoot {
        HistoricRoot {
            entity: EntityRef::process_instance(id),
            deployment_id: Some("dep".to_string()),
            start_time: start(),
            end_time: Some(start() + Duration::hours(1)),
            time_to_live: Some(TimeToLive::days(ttl)),
            batch_type: None,
        }
    }

    /// pi-root owns a-1, v-1..v-3 and calls pi-sub, which owns t-1
    fn seeded_store() -> Arc<InMemoryHistoryStore> {
        let store = InMemoryHistoryStore::new();
        let root = EntityRef::process_instance("pi-root");
        let sub = EntityRef::process_instance("pi-sub");
        store.insert_root(process_root("pi-root", 5));
        store.insert_root(process_root("pi-sub", 5));
        store.insert_edge(HierarchyEdge::process_call("pi-root", "pi-sub"));

        store.insert_dependent(&root, EntityRef::new(RecordKind::ActivityInstance, "a-1"));
        for id in ["v-3", "v-1", "v-2"] {
            store.insert_dependent(&root, EntityRef::new(RecordKind::VariableInstance, id));
        }
        store.insert_dependent(&sub, EntityRef::new(RecordKind::TaskInstance, "t-1"));
        store
    }

    fn handler(store: &Arc<InMemoryHistoryStore>, base_time: BaseTimeStrategy) -> ExecutionJobHandler {
        let history = HistoryConfig {
            removal_time_strategy: base_time,
            ..Default::default()
        };
        ExecutionJobHandler::new(store.clone(), Arc::new(store.writers()), Arc::new(history))
    }

    fn job(root_ids: &[&str], mode: RemovalTimeMode, chunk_size: Option<u32>) -> ExecutionJob {
        ExecutionJob {
            job_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            deployment_id: Some("dep".to_string()),
            configuration: ExecutionJobConfiguration {
                batch_type: BatchType::ProcessSetRemovalTime,
                root_ids: root_ids.iter().map(|id| id.to_string()).collect(),
                mode,
                hierarchical: true,
                chunk_size: chunk_size.map(|size| ChunkSize::new(i64::from(size)).unwrap()),
                cursor: ChunkCursor::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_unchunked_job_writes_root_last() {
        let store = seeded_store();
        let handler = handler(&store, BaseTimeStrategy::Start);

        let outcome = handler
            .run(&job(&["pi-root"], RemovalTimeMode::Calculated, None))
            .await
            .unwrap();
        assert!(outcome.is_done());

        let expected = Some(start() + Duration::days(5));
        for entity in [
            EntityRef::process_instance("pi-root"),
            EntityRef::process_instance("pi-sub"),
            EntityRef::new(RecordKind::TaskInstance, "t-1"),
            EntityRef::new(RecordKind::VariableInstance, "v-2"),
        ] {
            assert_eq!(store.removal_time_of(&entity), Some(expected), "{entity}");
        }

        let log = store.write_log();
        let last = log.last().unwrap();
        assert_eq!(last.kind, RecordKind::ProcessInstance);
        assert_eq!(last.ids, vec!["pi-sub".to_string(), "pi-root".to_string()]);
    }

    #[tokio::test]
    async fn test_chunked_job_resumes_from_cursor() {
        let store = seeded_store();
        let handler = handler(&store, BaseTimeStrategy::End);
        let root = EntityRef::process_instance("pi-root");
        let mut current = job(&["pi-root"], RemovalTimeMode::Calculated, Some(2));

        let mut windows = Vec::new();
        loop {
            store.clear_write_log();
            let outcome = handler.run(&current).await.unwrap();
            windows.push(
                store
                    .write_log()
                    .into_iter()
                    .flat_map(|record| record.ids)
                    .collect::<Vec<_>>(),
            );
            match outcome {
                JobOutcome::Done => break,
                JobOutcome::Rescheduled(successor) => {
                    // Root stays untouched until the final window
                    assert_eq!(store.removal_time_of(&root), Some(None));
                    assert_eq!(successor.configuration.cursor.rows_applied, {
                        let written: usize = windows.iter().map(Vec::len).sum();
                        written as u64
                    });
                    current = successor;
                }
            }
        }

        assert_eq!(
            windows,
            vec![
                vec!["a-1".to_string(), "t-1".to_string()],
                vec!["v-1".to_string(), "v-2".to_string()],
                vec!["v-3".to_string()],
                vec!["pi-sub".to_string(), "pi-root".to_string()],
            ]
        );
        assert_eq!(
            store.removal_time_of(&root),
            Some(Some(start() + Duration::hours(1) + Duration::days(5)))
        );
    }

    #[tokio::test]
    async fn test_each_root_keeps_its_own_removal_time() {
        let store = InMemoryHistoryStore::new();
        store.insert_root(process_root("pi-a", 1));
        store.insert_root(process_root("pi-b", 9));
        store.insert_dependent(
            &EntityRef::process_instance("pi-a"),
            EntityRef::new(RecordKind::VariableInstance, "v-a"),
        );
        store.insert_dependent(
            &EntityRef::process_instance("pi-b"),
            EntityRef::new(RecordKind::VariableInstance, "v-b"),
        );
        let handler = handler(&store, BaseTimeStrategy::Start);

        handler
            .run(&job(&["pi-a", "pi-b"], RemovalTimeMode::Calculated, None))
            .await
            .unwrap();

        assert_eq!(
            store.removal_time_of(&EntityRef::new(RecordKind::VariableInstance, "v-a")),
            Some(Some(start() + Duration::days(1)))
        );
        assert_eq!(
            store.removal_time_of(&EntityRef::new(RecordKind::VariableInstance, "v-b")),
            Some(Some(start() + Duration::days(9)))
        );
    }

    #[tokio::test]
    async fn test_missing_roots_complete_without_writes() {
        let store = seeded_store();
        let handler = handler(&store, BaseTimeStrategy::End);

        let outcome = handler
            .run(&job(&["pi-deleted"], RemovalTimeMode::Cleared, Some(10)))
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Done);
        assert!(store.write_log().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let store = seeded_store();
        store.fail_next_writes(RecordKind::VariableInstance, 1);
        let handler = handler(&store, BaseTimeStrategy::End);

        let result = handler
            .run(&job(&["pi-root"], RemovalTimeMode::Cleared, None))
            .await;
        assert!(result.is_err());
        assert_eq!(
            store.removal_time_of(&EntityRef::process_instance("pi-root")),
            Some(None)
        );
    }

    #[test]
    fn test_window_stops_before_owners() {
        let write = |phase, kind, id: &str| PlannedWrite {
            phase,
            entity: EntityRef::new(kind, id),
            removal_time: None,
        };
        let remaining = vec![
            write(TargetRole::Dependent, RecordKind::Detail, "d-1"),
            write(TargetRole::Owner, RecordKind::DecisionInstance, "di-1"),
            write(TargetRole::Root, RecordKind::ProcessInstance, "pi-1"),
        ];

        assert_eq!(chunk_window(&remaining, 10), 1);
        assert_eq!(chunk_window(&remaining[1..], 10), 2);
    }
}
