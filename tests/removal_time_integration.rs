//! End-to-end set-removal-time runs against the in-memory stores.

mod common;

use chrono::Duration;

use common::{
    config_with, ended, hierarchy_entities, leaf, root, seed_process_hierarchy, started, ts,
    TestEngine,
};
use tasker_retention::constants::{audit, events};
use tasker_retention::database::BatchRepository;
use tasker_retention::models::{
    BaseTimeStrategy, BatchType, EntityRef, HistoricQuery, HistoricRoot, RecordKind,
};
use tasker_retention::orchestration::SetRemovalTimeRequest;

fn process_request() -> tasker_retention::orchestration::SetRemovalTimeRequestBuilder {
    SetRemovalTimeRequest::builder(BatchType::ProcessSetRemovalTime)
}

#[tokio::test]
async fn test_hierarchical_calculated_cascade() {
    let engine = TestEngine::new(config_with(BaseTimeStrategy::End));
    seed_process_hierarchy(&engine.history);

    let request = process_request()
        .by_ids(["pi-root"])
        .calculated_removal_time()
        .unwrap()
        .hierarchical()
        .build()
        .unwrap();
    let batch = engine.service.execute_async(&request).await.unwrap();
    engine.drain().await;

    // Every record inherits the root's value, including the sub-process's own TTL
    let expected = Some(ended() + Duration::days(5));
    for entity in hierarchy_entities() {
        assert_eq!(engine.removal_time(&entity), expected, "{entity}");
    }
    let authorization = leaf(RecordKind::Authorization, "auth-root");
    assert_eq!(engine.removal_time(&authorization), None);

    let progress = engine.service.batch_progress(batch.batch_id).await.unwrap();
    assert!(progress.finalized);
    assert_eq!(progress.remaining_jobs, 0);
    assert!(engine
        .store
        .historic_batch(batch.batch_id)
        .await
        .unwrap()
        .is_some());

    let entries = engine.store.audit_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.batch_id, Some(batch.batch_id));
    assert_eq!(entry.entity_type, "ProcessInstance");
    let value = |name: &str| entry.property(name).unwrap().new_value.clone();
    assert_eq!(value(audit::PROPERTY_MODE).as_deref(), Some(audit::MODE_CALCULATED));
    assert_eq!(value(audit::PROPERTY_REMOVAL_TIME), None);
    assert_eq!(value(audit::PROPERTY_HIERARCHICAL).as_deref(), Some("true"));
    assert_eq!(value(audit::PROPERTY_NR_OF_INSTANCES).as_deref(), Some("1"));
    assert_eq!(value(audit::PROPERTY_ASYNC).as_deref(), Some("true"));
}

#[tokio::test]
async fn test_non_hierarchical_touches_only_direct_dependents() {
    let engine = TestEngine::with_defaults();
    seed_process_hierarchy(&engine.history);
    let removal_time = ts(2031, 3, 1, 0);

    let request = process_request()
        .by_ids(["pi-root"])
        .absolute_removal_time(removal_time)
        .unwrap()
        .build()
        .unwrap();
    engine.service.execute_async(&request).await.unwrap();
    engine.drain().await;

    for entity in [
        EntityRef::process_instance("pi-root"),
        leaf(RecordKind::VariableInstance, "v-root"),
        leaf(RecordKind::Comment, "c-root"),
        leaf(RecordKind::ByteArray, "ba-root"),
    ] {
        assert_eq!(engine.removal_time(&entity), Some(removal_time), "{entity}");
    }
    for entity in [
        EntityRef::process_instance("pi-sub"),
        leaf(RecordKind::TaskInstance, "t-sub"),
        EntityRef::decision_instance("di-root"),
        leaf(RecordKind::DecisionOutputInstance, "dout-2"),
    ] {
        assert_eq!(engine.removal_time(&entity), None, "{entity}");
    }

    let entry = &engine.store.audit_entries().await.unwrap()[0];
    let expected_millis = removal_time.timestamp_millis().to_string();
    assert_eq!(
        entry.property(audit::PROPERTY_REMOVAL_TIME).unwrap().new_value.as_deref(),
        Some(expected_millis.as_str())
    );
    assert_eq!(
        entry.property(audit::PROPERTY_MODE).unwrap().new_value.as_deref(),
        Some(audit::MODE_ABSOLUTE)
    );
}

#[tokio::test]
async fn test_calculated_from_start_adds_time_to_live() {
    let engine = TestEngine::new(config_with(BaseTimeStrategy::Start));
    engine.history.insert_root(HistoricRoot {
        end_time: None,
        ..root(EntityRef::process_instance("pi-running"), Some("dep-a"), Some(5))
    });

    let request = process_request()
        .by_ids(["pi-running"])
        .calculated_removal_time()
        .unwrap()
        .build()
        .unwrap();
    engine.service.execute_sync(&request).await.unwrap();

    assert_eq!(
        engine.removal_time(&EntityRef::process_instance("pi-running")),
        Some(started() + Duration::days(5))
    );
}

#[tokio::test]
async fn test_calculated_from_end_leaves_unfinished_roots_unset() {
    let engine = TestEngine::new(config_with(BaseTimeStrategy::End));
    engine.history.insert_root(HistoricRoot {
        end_time: None,
        ..root(EntityRef::process_instance("pi-running"), Some("dep-a"), Some(5))
    });
    engine.history.insert_root(root(
        EntityRef::process_instance("pi-no-ttl"),
        Some("dep-a"),
        None,
    ));

    let request = process_request()
        .by_ids(["pi-running", "pi-no-ttl"])
        .calculated_removal_time()
        .unwrap()
        .build()
        .unwrap();
    engine.service.execute_sync(&request).await.unwrap();

    assert_eq!(engine.removal_time(&EntityRef::process_instance("pi-running")), None);
    assert_eq!(engine.removal_time(&EntityRef::process_instance("pi-no-ttl")), None);
}

#[tokio::test]
async fn test_none_strategy_clears_existing_removal_time() {
    let engine = TestEngine::new(config_with(BaseTimeStrategy::None));
    seed_process_hierarchy(&engine.history);
    let pi_root = EntityRef::process_instance("pi-root");

    let absolute = process_request()
        .by_ids(["pi-root"])
        .absolute_removal_time(ts(2030, 1, 1, 0))
        .unwrap()
        .build()
        .unwrap();
    engine.service.execute_sync(&absolute).await.unwrap();
    assert!(engine.removal_time(&pi_root).is_some());

    let calculated = process_request()
        .by_ids(["pi-root"])
        .calculated_removal_time()
        .unwrap()
        .build()
        .unwrap();
    engine.service.execute_sync(&calculated).await.unwrap();
    assert_eq!(engine.removal_time(&pi_root), None);
    assert_eq!(
        engine.removal_time(&leaf(RecordKind::VariableInstance, "v-root")),
        None
    );
}

#[tokio::test]
async fn test_cleared_mode_unsets_whole_hierarchy() {
    let engine = TestEngine::with_defaults();
    seed_process_hierarchy(&engine.history);

    let absolute = process_request()
        .by_ids(["pi-root"])
        .absolute_removal_time(ts(2030, 1, 1, 0))
        .unwrap()
        .hierarchical()
        .build()
        .unwrap();
    engine.service.execute_sync(&absolute).await.unwrap();

    let cleared = process_request()
        .by_ids(["pi-root"])
        .clear_removal_time()
        .unwrap()
        .hierarchical()
        .build()
        .unwrap();
    engine.service.execute_async(&cleared).await.unwrap();
    engine.drain().await;

    for entity in hierarchy_entities() {
        assert_eq!(engine.removal_time(&entity), None, "{entity}");
    }
}

#[tokio::test]
async fn test_authorizations_follow_when_permissions_enabled() {
    let mut config = config_with(BaseTimeStrategy::End);
    config.history.enable_historic_instance_permissions = true;
    let engine = TestEngine::new(config);
    seed_process_hierarchy(&engine.history);

    let request = process_request()
        .by_ids(["pi-root"])
        .calculated_removal_time()
        .unwrap()
        .build()
        .unwrap();
    engine.service.execute_sync(&request).await.unwrap();

    assert_eq!(
        engine.removal_time(&leaf(RecordKind::Authorization, "auth-root")),
        Some(ended() + Duration::days(5))
    );
}

#[tokio::test]
async fn test_decision_roots_selected_by_query() {
    let engine = TestEngine::new(config_with(BaseTimeStrategy::End));
    seed_process_hierarchy(&engine.history);

    let request = SetRemovalTimeRequest::builder(BatchType::DecisionSetRemovalTime)
        .by_query(HistoricQuery::new().deployment_id("dep-dmn"))
        .calculated_removal_time()
        .unwrap()
        .hierarchical()
        .build()
        .unwrap();
    let roots = engine.service.resolve_roots(&request).await.unwrap();
    assert_eq!(roots, vec!["di-nested".to_string(), "di-root".to_string()]);

    let batch = engine.service.execute_async(&request).await.unwrap();
    assert_eq!(batch.operation.instance_count, 2);
    engine.drain().await;

    let expected = Some(ended() + Duration::days(30));
    for entity in [
        EntityRef::decision_instance("di-root"),
        EntityRef::decision_instance("di-nested"),
        leaf(RecordKind::DecisionInputInstance, "din-1"),
        leaf(RecordKind::DecisionOutputInstance, "dout-1"),
        leaf(RecordKind::DecisionOutputInstance, "dout-2"),
    ] {
        assert_eq!(engine.removal_time(&entity), expected, "{entity}");
    }
    // Process side of the hierarchy is never reached from a decision root
    assert_eq!(engine.removal_time(&EntityRef::process_instance("pi-sub")), None);

    let entry = &engine.store.audit_entries().await.unwrap()[0];
    assert_eq!(entry.entity_type, "DecisionInstance");
}

#[tokio::test]
async fn test_batch_roots_use_configured_batch_ttl() {
    let mut config = config_with(BaseTimeStrategy::End);
    config
        .history
        .batch_operations_for_history_cleanup
        .insert("instance-migration".to_string(), "3".parse().unwrap());
    let engine = TestEngine::new(config);

    let historic = EntityRef::batch("hb-1");
    engine.history.insert_root(HistoricRoot {
        batch_type: Some("instance-migration".to_string()),
        ..root(historic.clone(), None, None)
    });
    engine
        .history
        .insert_dependent(&historic, leaf(RecordKind::JobLog, "hb-1-log"));

    let request = SetRemovalTimeRequest::builder(BatchType::BatchSetRemovalTime)
        .by_ids(["hb-1"])
        .calculated_removal_time()
        .unwrap()
        .build()
        .unwrap();
    engine.service.execute_async(&request).await.unwrap();
    engine.drain().await;

    let expected = Some(ended() + Duration::days(3));
    assert_eq!(engine.removal_time(&historic), expected);
    assert_eq!(engine.removal_time(&leaf(RecordKind::JobLog, "hb-1-log")), expected);
}

#[tokio::test]
async fn test_sync_execution_records_audit_without_batch() {
    let engine = TestEngine::with_defaults();
    seed_process_hierarchy(&engine.history);

    let request = process_request()
        .by_ids(["pi-root"])
        .by_query(HistoricQuery::new().deployment_id("dep-b"))
        .absolute_removal_time(ts(2029, 12, 24, 0))
        .unwrap()
        .build()
        .unwrap();
    let report = engine.service.execute_sync(&request).await.unwrap();

    assert_eq!(report.root_count, 2);
    assert_eq!(report.jobs_run, 2);
    assert_eq!(engine.store.job_count(), 0);
    assert_eq!(
        engine.removal_time(&leaf(RecordKind::TaskInstance, "t-sub")),
        Some(ts(2029, 12, 24, 0))
    );

    let entries = engine.store.audit_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].batch_id, None);
    assert_eq!(
        entries[0].property(audit::PROPERTY_ASYNC).unwrap().new_value.as_deref(),
        Some("false")
    );
    assert_eq!(
        entries[0]
            .property(audit::PROPERTY_NR_OF_INSTANCES)
            .unwrap()
            .new_value
            .as_deref(),
        Some("2")
    );
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let engine = TestEngine::with_defaults();
    seed_process_hierarchy(&engine.history);
    let mut receiver = engine.events.subscribe();

    let request = process_request()
        .by_ids(["pi-root"])
        .clear_removal_time()
        .unwrap()
        .build()
        .unwrap();
    let batch = engine.service.execute_async(&request).await.unwrap();
    engine.drain().await;

    let mut names = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec![
            events::BATCH_CREATED,
            events::BATCH_SEEDED,
            events::JOB_COMPLETED,
            events::BATCH_COMPLETED,
        ]
    );

    let historic = engine
        .store
        .historic_batch(batch.batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(historic.total_jobs, 1);
    assert_eq!(historic.batch_type, BatchType::ProcessSetRemovalTime);
}
