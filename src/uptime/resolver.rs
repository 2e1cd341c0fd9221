//! Step-function status lookup over a store's observations.

use crate::db::{Observation, StoreStatus};

use chrono::{DateTime, Utc};

/// A store's observations ordered by time, ready for point lookups.
///
/// A store is assumed to keep its last reported status until a newer
/// observation supersedes it. Before the first observation it is inactive.
#[derive(Debug, Clone, Default)]
pub struct StatusTimeline {
    points: Vec<(DateTime<Utc>, StoreStatus)>,
}

impl StatusTimeline {
    /// Build a timeline from observations in ingestion order.
    ///
    /// Observations sharing a timestamp keep their relative order, so the
    /// last ingested one wins.
    pub fn new(observations: impl IntoIterator<Item = Observation>) -> Self {
        let mut points: Vec<_> = observations
            .into_iter()
            .map(|o| (o.timestamp, o.status))
            .collect();
        // stable sort
        points.sort_by_key(|(ts, _)| *ts);
        Self { points }
    }

    /// Status of the latest observation at or before `instant`.
    pub fn resolve(&self, instant: DateTime<Utc>) -> StoreStatus {
        let idx = self.points.partition_point(|(ts, _)| *ts <= instant);
        if idx == 0 {
            StoreStatus::Inactive
        } else {
            self.points[idx - 1].1
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn obs(ts: DateTime<Utc>, status: StoreStatus) -> Observation {
        Observation {
            store_id: "s".to_string(),
            timestamp: ts,
            status,
        }
    }

    #[test]
    fn test_empty_timeline_is_inactive() {
        let timeline = StatusTimeline::default();
        assert!(timeline.is_empty());
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(timeline.resolve(t), StoreStatus::Inactive);
    }

    #[test]
    fn test_single_observation_holds() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let timeline = StatusTimeline::new(vec![obs(t0, StoreStatus::Active)]);

        assert_eq!(timeline.resolve(t0 - Duration::seconds(1)), StoreStatus::Inactive);
        assert_eq!(timeline.resolve(t0), StoreStatus::Active);
        assert_eq!(timeline.resolve(t0 + Duration::days(30)), StoreStatus::Active);
    }

    #[test]
    fn test_step_function_not_interpolation() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let t1 = t0 + Duration::hours(4);
        // Given out of order
        let timeline = StatusTimeline::new(vec![
            obs(t1, StoreStatus::Inactive),
            obs(t0, StoreStatus::Active),
        ]);
        assert_eq!(timeline.len(), 2);

        assert_eq!(timeline.resolve(t0 + Duration::hours(2)), StoreStatus::Active);
        assert_eq!(
            timeline.resolve(t1 - Duration::nanoseconds(1)),
            StoreStatus::Active
        );
        assert_eq!(timeline.resolve(t1), StoreStatus::Inactive);
    }

    #[test]
    fn test_equal_timestamps_last_ingested_wins() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let timeline = StatusTimeline::new(vec![
            obs(t0, StoreStatus::Inactive),
            obs(t0, StoreStatus::Active),
        ]);
        assert_eq!(timeline.resolve(t0), StoreStatus::Active);

        let timeline = StatusTimeline::new(vec![
            obs(t0, StoreStatus::Active),
            obs(t0, StoreStatus::Inactive),
        ]);
        assert_eq!(timeline.resolve(t0), StoreStatus::Inactive);
    }
}
