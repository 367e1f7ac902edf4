//! Request validation: rejected requests never create a batch.

mod common;

use proptest::prelude::*;

use common::{seed_process_hierarchy, ts, TestEngine};
use tasker_retention::error::{RetentionError, ValidationError};
use tasker_retention::models::{BatchType, HistoricQuery};
use tasker_retention::orchestration::{SetRemovalTimeRequest, SetRemovalTimeRequestBuilder};

fn builder() -> SetRemovalTimeRequestBuilder {
    SetRemovalTimeRequest::builder(BatchType::ProcessSetRemovalTime)
}

#[test]
fn test_empty_selection_creates_no_batch() {
    let engine = TestEngine::with_defaults();
    seed_process_hierarchy(&engine.history);

    let request = builder()
        .by_query(HistoricQuery::new().deployment_id("dep-unknown"))
        .calculated_removal_time()
        .unwrap()
        .build()
        .unwrap();

    let err = tokio_test::block_on(engine.service.execute_async(&request)).unwrap_err();
    assert!(matches!(
        err,
        RetentionError::Validation(ValidationError::EmptySelection)
    ));
    assert_eq!(err.to_string(), "Validation error: selection is empty");
    assert_eq!(engine.store.job_count(), 0);

    let err = tokio_test::block_on(engine.service.execute_sync(&request)).unwrap_err();
    assert!(matches!(
        err,
        RetentionError::Validation(ValidationError::EmptySelection)
    ));
    assert!(engine.history.write_log().is_empty());
}

#[test]
fn test_missing_selection_or_mode() {
    assert_eq!(
        builder().calculated_removal_time().unwrap().build().unwrap_err(),
        ValidationError::NoSelection
    );
    assert_eq!(
        builder().by_ids(["pi-1"]).build().unwrap_err(),
        ValidationError::NoRemovalTimeMode
    );
}

#[test]
fn test_removal_time_modes_are_mutually_exclusive() {
    let absolute = ts(2030, 1, 1, 0);

    let pairs: Vec<(&str, Result<SetRemovalTimeRequestBuilder, ValidationError>)> = vec![
        (
            "calculated then absolute",
            builder()
                .calculated_removal_time()
                .and_then(|b| b.absolute_removal_time(absolute)),
        ),
        (
            "calculated then cleared",
            builder()
                .calculated_removal_time()
                .and_then(|b| b.clear_removal_time()),
        ),
        (
            "absolute then calculated",
            builder()
                .absolute_removal_time(absolute)
                .and_then(|b| b.calculated_removal_time()),
        ),
        (
            "cleared then absolute",
            builder()
                .clear_removal_time()
                .and_then(|b| b.absolute_removal_time(absolute)),
        ),
        (
            "cleared twice",
            builder()
                .clear_removal_time()
                .and_then(|b| b.clear_removal_time()),
        ),
    ];

    for (label, result) in pairs {
        let err = result.expect_err(label);
        assert!(
            matches!(err, ValidationError::ModesMutuallyExclusive { .. }),
            "{label}: {err}"
        );
    }
}

#[test]
fn test_ids_and_query_are_combined() {
    let engine = TestEngine::with_defaults();
    seed_process_hierarchy(&engine.history);

    let request = builder()
        .by_ids(["pi-sub", "pi-extra"])
        .by_query(HistoricQuery::new().finished())
        .clear_removal_time()
        .unwrap()
        .build()
        .unwrap();

    let roots = tokio_test::block_on(engine.service.resolve_roots(&request)).unwrap();
    assert_eq!(roots, vec!["pi-sub", "pi-extra", "pi-root"]);
}

proptest! {
    #[test]
    fn prop_chunk_size_accepts_exactly_one_to_five_hundred(size in -1_000i64..1_000) {
        let result = builder().chunk_size(size);
        prop_assert_eq!(result.is_ok(), (1..=500).contains(&size));
        if let Ok(builder) = result {
            let request = builder
                .by_ids(["pi-1"])
                .clear_removal_time()
                .unwrap()
                .build()
                .unwrap();
            prop_assert!(request.is_chunked());
            prop_assert_eq!(request.chunk_size.map(|chunk| i64::from(chunk.get())), Some(size));
        }
    }
}
