//! Shared fixtures for integration tests.
//!
//! Every test assembles its own engine over fresh in-memory stores, so tests
//! never share state and can run in parallel.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use tasker_retention::config::RetentionConfig;
use tasker_retention::database::{InMemoryBatchStore, InMemoryHistoryStore};
use tasker_retention::events::EventPublisher;
use tasker_retention::execution::{JobWorker, WorkerPool};
use tasker_retention::models::{
    BaseTimeStrategy, EntityRef, HierarchyEdge, HistoricRoot, RecordKind, TimeToLive,
};
use tasker_retention::orchestration::RemovalTimeService;
use tasker_retention::utils::FixedClock;

pub fn ts(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

/// Start of every seeded root
pub fn started() -> DateTime<Utc> {
    ts(2024, 1, 10, 9)
}

/// End of every finished seeded root
pub fn ended() -> DateTime<Utc> {
    ts(2024, 1, 12, 17)
}

pub fn root(entity: EntityRef, deployment: Option<&str>, ttl_days: Option<u32>) -> HistoricRoot {
    HistoricRoot {
        entity,
        deployment_id: deployment.map(str::to_string),
        start_time: started(),
        end_time: Some(ended()),
        time_to_live: ttl_days.map(TimeToLive::days),
        batch_type: None,
    }
}

pub fn leaf(kind: RecordKind, id: &str) -> EntityRef {
    EntityRef::new(kind, id)
}

pub fn config_with(base_time: BaseTimeStrategy) -> RetentionConfig {
    let mut config = RetentionConfig::default();
    config.history.removal_time_strategy = base_time;
    config
}

pub struct TestEngine {
    pub history: Arc<InMemoryHistoryStore>,
    pub store: Arc<InMemoryBatchStore>,
    pub clock: Arc<FixedClock>,
    pub events: EventPublisher,
    pub service: RemovalTimeService,
    pub worker: JobWorker,
}

impl TestEngine {
    pub fn new(config: RetentionConfig) -> Self {
        let history = InMemoryHistoryStore::new();
        let store = InMemoryBatchStore::new();
        let clock = Arc::new(FixedClock::new(ts(2024, 6, 1, 12)));
        let events = EventPublisher::new(256);

        let service = RemovalTimeService::new(
            history.clone(),
            Arc::new(history.writers()),
            store.clone(),
            Arc::new(config),
            clock.clone(),
            events.clone(),
        );
        let worker = JobWorker::for_service(&service, clock.clone());

        Self {
            history,
            store,
            clock,
            events,
            service,
            worker,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RetentionConfig::default())
    }

    pub fn pool(&self) -> WorkerPool {
        WorkerPool::new(self.worker.clone(), self.service.config().worker.clone())
    }

    /// Run jobs one at a time until the queue is empty; returns attempts made
    pub async fn drain(&self) -> usize {
        let mut attempts = 0;
        while self.worker.run_next().await.unwrap() {
            attempts += 1;
        }
        attempts
    }

    pub fn removal_time(&self, entity: &EntityRef) -> Option<DateTime<Utc>> {
        self.history
            .removal_time_of(entity)
            .unwrap_or_else(|| panic!("{entity} does not exist"))
    }
}

/// Canonical process hierarchy:
///
/// ```text
/// pi-root (dep-a, ttl 5)  variable v-root, comment c-root, byte array ba-root, authorization auth-root
/// └── pi-sub (ttl 10)     task t-sub, job log jl-sub
///     └── di-root         decision input din-1, decision output dout-1
///         └── di-nested   decision output dout-2
/// ```
pub fn seed_process_hierarchy(history: &InMemoryHistoryStore) {
    let pi_root = EntityRef::process_instance("pi-root");
    let pi_sub = EntityRef::process_instance("pi-sub");
    let di_root = EntityRef::decision_instance("di-root");
    let di_nested = EntityRef::decision_instance("di-nested");

    history.insert_root(root(pi_root.clone(), Some("dep-a"), Some(5)));
    history.insert_root(root(pi_sub.clone(), Some("dep-b"), Some(10)));
    history.insert_root(root(di_root.clone(), Some("dep-dmn"), Some(30)));
    history.insert_root(root(di_nested.clone(), Some("dep-dmn"), Some(30)));

    history.insert_dependent(&pi_root, leaf(RecordKind::VariableInstance, "v-root"));
    history.insert_dependent(&pi_root, leaf(RecordKind::Comment, "c-root"));
    history.insert_dependent(&pi_root, leaf(RecordKind::ByteArray, "ba-root"));
    history.insert_dependent(&pi_root, leaf(RecordKind::Authorization, "auth-root"));
    history.insert_dependent(&pi_sub, leaf(RecordKind::TaskInstance, "t-sub"));
    history.insert_dependent(&pi_sub, leaf(RecordKind::JobLog, "jl-sub"));
    history.insert_dependent(&di_root, leaf(RecordKind::DecisionInputInstance, "din-1"));
    history.insert_dependent(&di_root, leaf(RecordKind::DecisionOutputInstance, "dout-1"));
    history.insert_dependent(&di_nested, leaf(RecordKind::DecisionOutputInstance, "dout-2"));

    history.insert_edge(HierarchyEdge::process_call("pi-root", "pi-sub"));
    history.insert_edge(HierarchyEdge::process_evaluates_decision("pi-sub", "di-root"));
    history.insert_edge(HierarchyEdge::decision_nesting("di-root", "di-nested"));
}

/// Every entity of the canonical hierarchy except the authorization row
pub fn hierarchy_entities() -> Vec<EntityRef> {
    vec![
        EntityRef::process_instance("pi-root"),
        EntityRef::process_instance("pi-sub"),
        EntityRef::decision_instance("di-root"),
        EntityRef::decision_instance("di-nested"),
        leaf(RecordKind::VariableInstance, "v-root"),
        leaf(RecordKind::Comment, "c-root"),
        leaf(RecordKind::ByteArray, "ba-root"),
        leaf(RecordKind::TaskInstance, "t-sub"),
        leaf(RecordKind::JobLog, "jl-sub"),
        leaf(RecordKind::DecisionInputInstance, "din-1"),
        leaf(RecordKind::DecisionOutputInstance, "dout-1"),
        leaf(RecordKind::DecisionOutputInstance, "dout-2"),
    ]
}

/// A flat process instance with `count` variables `v-01`, `v-02`, ...
pub fn seed_flat_process(history: &InMemoryHistoryStore, id: &str, count: usize) -> Vec<EntityRef> {
    let owner = EntityRef::process_instance(id);
    history.insert_root(root(owner.clone(), Some("dep-flat"), Some(7)));
    (1..=count)
        .map(|index| {
            let variable = leaf(RecordKind::VariableInstance, &format!("{id}-v-{index:02}"));
            history.insert_dependent(&owner, variable.clone());
            variable
        })
        .collect()
}
