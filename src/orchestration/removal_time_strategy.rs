//! # Removal Time Strategy
//!
//! Pure computation of the removal time for one root. No I/O and no clock:
//! the same inputs always produce the same output, which is what makes a
//! retried job attempt rewrite identical values.
//!
//! Day arithmetic is done on UTC timestamps in whole 24-hour days.

use chrono::{DateTime, Duration, Utc};

use crate::config::HistoryConfig;
use crate::models::{BaseTimeStrategy, HistoricRoot, RecordKind, RemovalTimeMode, TimeToLive};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalTimeStrategy {
    base_time: BaseTimeStrategy,
}

impl RemovalTimeStrategy {
    pub fn new(base_time: BaseTimeStrategy) -> Self {
        Self { base_time }
    }

    pub fn base_time(&self) -> BaseTimeStrategy {
        self.base_time
    }

    /// Removal time for an entity with the given defining times
    pub fn compute(
        &self,
        mode: &RemovalTimeMode,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        time_to_live: Option<TimeToLive>,
    ) -> Option<DateTime<Utc>> {
        match mode {
            RemovalTimeMode::Cleared => None,
            RemovalTimeMode::Absolute(removal_time) => Some(*removal_time),
            RemovalTimeMode::Calculated => {
                let base = match self.base_time {
                    BaseTimeStrategy::None => return None,
                    BaseTimeStrategy::Start => start_time,
                    BaseTimeStrategy::End => end_time?,
                };
                add_days(base, time_to_live?)
            }
        }
    }

    /// Removal time for a selected root.
    ///
    /// Process and decision roots carry their definition's time to live; batch
    /// roots take theirs from the history configuration by batch type.
    pub fn compute_for_root(
        &self,
        mode: &RemovalTimeMode,
        root: &HistoricRoot,
        history: &HistoryConfig,
    ) -> Option<DateTime<Utc>> {
        let time_to_live = match root.entity.kind {
            RecordKind::Batch => root
                .batch_type
                .as_deref()
                .and_then(|batch_type| history.batch_time_to_live(batch_type)),
            _ => root.time_to_live,
        };
        self.compute(mode, root.start_time, root.end_time, time_to_live)
    }
}

fn add_days(base: DateTime<Utc>, time_to_live: TimeToLive) -> Option<DateTime<Utc>> {
    base.checked_add_signed(Duration::days(i64::from(time_to_live.as_days())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityRef;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 27, 13, 45, 0).unwrap()
    }

    #[test]
    fn test_cleared_is_always_unset() {
        for base_time in [BaseTimeStrategy::Start, BaseTimeStrategy::End, BaseTimeStrategy::None] {
            let strategy = RemovalTimeStrategy::new(base_time);
            assert_eq!(
                strategy.compute(
                    &RemovalTimeMode::Cleared,
                    start(),
                    Some(start()),
                    Some(TimeToLive::days(5))
                ),
                None
            );
        }
    }

    #[test]
    fn test_absolute_ignores_entity_times() {
        let fixed = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        let strategy = RemovalTimeStrategy::new(BaseTimeStrategy::None);
        assert_eq!(
            strategy.compute(&RemovalTimeMode::Absolute(fixed), start(), None, None),
            Some(fixed)
        );
    }

    #[test]
    fn test_calculated_start_adds_whole_days() {
        let strategy = RemovalTimeStrategy::new(BaseTimeStrategy::Start);
        let computed = strategy.compute(
            &RemovalTimeMode::Calculated,
            start(),
            None,
            Some(TimeToLive::days(5)),
        );
        // Crosses the leap day
        assert_eq!(
            computed,
            Some(Utc.with_ymd_and_hms(2024, 3, 3, 13, 45, 0).unwrap())
        );
    }

    #[test]
    fn test_calculated_end_requires_end_time_and_ttl() {
        let strategy = RemovalTimeStrategy::new(BaseTimeStrategy::End);
        let end = start() + Duration::hours(3);

        assert_eq!(
            strategy.compute(&RemovalTimeMode::Calculated, start(), None, Some(TimeToLive::days(1))),
            None
        );
        assert_eq!(
            strategy.compute(&RemovalTimeMode::Calculated, start(), Some(end), None),
            None
        );
        assert_eq!(
            strategy.compute(
                &RemovalTimeMode::Calculated,
                start(),
                Some(end),
                Some(TimeToLive::days(1))
            ),
            Some(end + Duration::days(1))
        );
    }

    #[test]
    fn test_batch_root_uses_batch_type_ttl() {
        let mut history = HistoryConfig {
            batch_operation_history_time_to_live: Some(TimeToLive::days(30)),
            ..Default::default()
        };
        history
            .batch_operations_for_history_cleanup
            .insert("instance-migration".to_string(), TimeToLive::days(3));

        let root = HistoricRoot {
            entity: EntityRef::batch("b-1"),
            deployment_id: None,
            start_time: start(),
            end_time: Some(start()),
            time_to_live: Some(TimeToLive::days(99)),
            batch_type: Some("instance-migration".to_string()),
        };

        let strategy = RemovalTimeStrategy::new(BaseTimeStrategy::End);
        assert_eq!(
            strategy.compute_for_root(&RemovalTimeMode::Calculated, &root, &history),
            Some(start() + Duration::days(3))
        );

        let other = HistoricRoot {
            batch_type: Some("modification".to_string()),
            ..root
        };
        assert_eq!(
            strategy.compute_for_root(&RemovalTimeMode::Calculated, &other, &history),
            Some(start() + Duration::days(30))
        );
    }

    fn any_strategy() -> impl Strategy<Value = BaseTimeStrategy> {
        prop_oneof![
            Just(BaseTimeStrategy::Start),
            Just(BaseTimeStrategy::End),
            Just(BaseTimeStrategy::None),
        ]
    }

    proptest! {
        #[test]
        fn prop_compute_is_deterministic(
            base_time in any_strategy(),
            start_secs in 0i64..4_000_000_000,
            duration_secs in proptest::option::of(0i64..10_000_000),
            ttl in proptest::option::of(0u32..3650),
        ) {
            let strategy = RemovalTimeStrategy::new(base_time);
            let start = Utc.timestamp_opt(start_secs, 0).unwrap();
            let end = duration_secs.map(|secs| start + Duration::seconds(secs));
            let ttl = ttl.map(TimeToLive::days);

            let first = strategy.compute(&RemovalTimeMode::Calculated, start, end, ttl);
            let second = strategy.compute(&RemovalTimeMode::Calculated, start, end, ttl);
            prop_assert_eq!(first, second);

            if base_time == BaseTimeStrategy::None {
                prop_assert!(first.is_none());
            }
            if let (BaseTimeStrategy::Start, Some(ttl)) = (base_time, ttl) {
                prop_assert_eq!(first, Some(start + Duration::days(i64::from(ttl.as_days()))));
            }
        }
    }
}
