use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::memory::clock::Clock;
use crate::memory::error::MemoryError;
use crate::memory::store::{MemoryReviewStore, MemoryUnitStore, UnitSummary};
use crate::memory::types::{ItemType, MasteryLevel, MemoryReview, MemoryUnit, ReviewOutcome};

pub const DEFAULT_WINDOW_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub new_learned: u64,
    pub review_count: u64,
    pub correct_count: u64,
    pub study_secs: f64,
    pub mastered_count: u64,
    pub retention_rate: f64,
    /// Mean hours since the same unit's previous review in the window.
    pub average_review_interval_hours: f64,
}

impl DailyBucket {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            new_learned: 0,
            review_count: 0,
            correct_count: 0,
            study_secs: 0.0,
            mastered_count: 0,
            retention_rate: 0.0,
            average_review_interval_hours: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub owner_id: String,
    pub item_type: ItemType,
    pub generated_at: DateTime<Utc>,
    pub window_days: u32,
    pub total_learned: u64,
    pub mastered_count: u64,
    pub need_review_count: u64,
    pub total_study_secs: f64,
    pub level_histogram: BTreeMap<MasteryLevel, u64>,
    /// Mean unit retention rate per item type.
    pub retention_by_type: BTreeMap<ItemType, f64>,
    pub daily: Vec<DailyBucket>,
}

pub struct StatsAggregator {
    units: Arc<dyn MemoryUnitStore>,
    reviews: Arc<dyn MemoryReviewStore>,
    clock: Arc<dyn Clock>,
    local_offset: FixedOffset,
}

impl StatsAggregator {
    pub fn new(
        units: Arc<dyn MemoryUnitStore>,
        reviews: Arc<dyn MemoryReviewStore>,
        clock: Arc<dyn Clock>,
        local_offset: FixedOffset,
    ) -> Self {
        Self {
            units,
            reviews,
            clock,
            local_offset,
        }
    }

    pub async fn compute_stats(
        &self,
        owner_id: &str,
        item_type: ItemType,
        window_days: u32,
    ) -> Result<MemoryStats, MemoryError> {
        let now = self.clock.now();
        let window_start = now - Duration::days(i64::from(window_days));

        let units = self.units.list_by_owner_and_type(owner_id, item_type).await?;
        let reviews = self
            .reviews
            .list_by_owner_and_time_range(owner_id, window_start, now)
            .await?;

        Ok(self.build(owner_id, item_type, window_days, now, &units, reviews))
    }

    /// Cheap counters straight from the store.
    pub async fn summary(
        &self,
        owner_id: &str,
        item_type: ItemType,
    ) -> Result<UnitSummary, MemoryError> {
        let now = self.clock.now();
        Ok(self.units.get_stats(owner_id, item_type, now).await?)
    }

    fn build(
        &self,
        owner_id: &str,
        item_type: ItemType,
        window_days: u32,
        now: DateTime<Utc>,
        units: &[MemoryUnit],
        reviews: Vec<MemoryReview>,
    ) -> MemoryStats {
        let mut level_histogram: BTreeMap<MasteryLevel, u64> =
            MasteryLevel::ALL.iter().map(|level| (*level, 0)).collect();
        for unit in units {
            *level_histogram.entry(unit.mastery_level).or_insert(0) += 1;
        }

        let mut retention_by_type = BTreeMap::new();
        if !units.is_empty() {
            let mean = units.iter().map(|u| u.retention_rate).sum::<f64>() / units.len() as f64;
            retention_by_type.insert(item_type, mean);
        }

        let unit_ids: HashSet<Uuid> = units.iter().map(|u| u.id).collect();
        let reviews: Vec<MemoryReview> = reviews
            .into_iter()
            .filter(|r| unit_ids.contains(&r.unit_id))
            .collect();

        let window_start = now - Duration::days(i64::from(window_days));
        let created_in_window = units
            .iter()
            .filter(|u| u.created_at >= window_start && u.created_at <= now);

        MemoryStats {
            owner_id: owner_id.to_string(),
            item_type,
            generated_at: now,
            window_days,
            total_learned: units.len() as u64,
            mastered_count: units.iter().filter(|u| u.mastery_level.is_mastered()).count() as u64,
            need_review_count: units.iter().filter(|u| u.is_due(now)).count() as u64,
            total_study_secs: units.iter().map(|u| u.study_duration_secs).sum(),
            level_histogram,
            retention_by_type,
            daily: self.daily_buckets(created_in_window, &reviews),
        }
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.local_offset).date_naive()
    }

    fn daily_buckets<'a>(
        &self,
        created: impl Iterator<Item = &'a MemoryUnit>,
        reviews: &[MemoryReview],
    ) -> Vec<DailyBucket> {
        let mut buckets: BTreeMap<NaiveDate, DailyBucket> = BTreeMap::new();
        let mut interval_sums: HashMap<NaiveDate, (f64, u64)> = HashMap::new();

        for unit in created {
            let date = self.local_date(unit.created_at);
            buckets
                .entry(date)
                .or_insert_with(|| DailyBucket::empty(date))
                .new_learned += 1;
        }

        let mut previous: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        let mut ordered: Vec<&MemoryReview> = reviews.iter().collect();
        ordered.sort_by_key(|r| r.reviewed_at);

        for review in ordered {
            let date = self.local_date(review.reviewed_at);
            let bucket = buckets
                .entry(date)
                .or_insert_with(|| DailyBucket::empty(date));

            bucket.review_count += 1;
            if review.outcome == ReviewOutcome::Correct {
                bucket.correct_count += 1;
            }
            bucket.study_secs += review.response_time_ms.max(0) as f64 / 1000.0;
            if !review.mastery_before.is_mastered() && review.mastery_after.is_mastered() {
                bucket.mastered_count += 1;
            }

            if let Some(prev) = previous.insert(review.unit_id, review.reviewed_at) {
                let gap_hours = (review.reviewed_at - prev).num_milliseconds() as f64 / 3_600_000.0;
                let entry = interval_sums.entry(date).or_insert((0.0, 0));
                entry.0 += gap_hours;
                entry.1 += 1;
            }
        }

        buckets
            .into_values()
            .map(|mut bucket| {
                if bucket.review_count > 0 {
                    bucket.retention_rate = bucket.correct_count as f64 / bucket.review_count as f64;
                }
                if let Some((sum, count)) = interval_sums.get(&bucket.date) {
                    if *count > 0 {
                        bucket.average_review_interval_hours = sum / *count as f64;
                    }
                }
                bucket
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::clock::ManualClock;
    use crate::memory::store::{InMemoryStore, StoreError};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn aggregator(store: Arc<InMemoryStore>, offset_hours: i32) -> StatsAggregator {
        StatsAggregator::new(
            store.clone(),
            store,
            Arc::new(ManualClock::new(now())),
            FixedOffset::east_opt(offset_hours * 3600).unwrap(),
        )
    }

    fn review(
        unit: &MemoryUnit,
        outcome: ReviewOutcome,
        ms: i64,
        before: MasteryLevel,
        after: MasteryLevel,
        at: DateTime<Utc>,
    ) -> MemoryReview {
        let mut entry = MemoryReview::new(unit, outcome, ms, before, at);
        entry.mastery_after = after;
        entry
    }

    #[tokio::test]
    async fn totals_and_histogram() {
        let store = Arc::new(InMemoryStore::new());
        let levels = [
            MasteryLevel::Unlearned,
            MasteryLevel::Beginner,
            MasteryLevel::Mastered,
            MasteryLevel::Expert,
        ];
        for (i, level) in levels.iter().enumerate() {
            let mut unit = MemoryUnit::new("alice", ItemType::Word, format!("w{i}"), now() - Duration::days(90));
            unit.mastery_level = *level;
            unit.study_duration_secs = 10.0;
            unit.next_review_at = now() + Duration::hours(i as i64 - 1);
            store.insert_unit(unit);
        }
        store.insert_unit(MemoryUnit::new("alice", ItemType::Character, "c", now()));
        store.insert_unit(MemoryUnit::new("bob", ItemType::Word, "w", now()));

        let stats = aggregator(store, 0)
            .compute_stats("alice", ItemType::Word, DEFAULT_WINDOW_DAYS)
            .await
            .unwrap();

        assert_eq!(stats.total_learned, 4);
        assert_eq!(stats.mastered_count, 2);
        assert_eq!(stats.need_review_count, 2);
        assert_eq!(stats.total_study_secs, 40.0);
        assert_eq!(stats.level_histogram.len(), 5);
        assert_eq!(stats.level_histogram[&MasteryLevel::Familiar], 0);
        assert_eq!(stats.level_histogram[&MasteryLevel::Expert], 1);
        assert!(stats.daily.is_empty());
    }

    #[tokio::test]
    async fn daily_buckets_sorted_with_retention() {
        let store = Arc::new(InMemoryStore::new());
        let mut unit = MemoryUnit::new("alice", ItemType::Word, "w", now() - Duration::days(3));
        unit.retention_rate = 0.5;
        store.insert_unit(unit.clone());

        let day1 = now() - Duration::days(2);
        let day2 = now() - Duration::days(1);
        let entries = [
            review(&unit, ReviewOutcome::Correct, 2000, MasteryLevel::Unlearned, MasteryLevel::Beginner, day2),
            review(&unit, ReviewOutcome::Wrong, 1000, MasteryLevel::Beginner, MasteryLevel::Beginner, day2 + Duration::hours(2)),
            review(&unit, ReviewOutcome::Correct, 3000, MasteryLevel::Familiar, MasteryLevel::Mastered, day1),
            review(&unit, ReviewOutcome::Skip, 500, MasteryLevel::Beginner, MasteryLevel::Beginner, day2 + Duration::hours(4)),
        ];
        for entry in &entries {
            store.create(entry).await.unwrap();
        }

        let stats = aggregator(store, 0)
            .compute_stats("alice", ItemType::Word, 30)
            .await
            .unwrap();

        let dates: Vec<NaiveDate> = stats.daily.iter().map(|b| b.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(stats.daily.len(), 3);

        let created = &stats.daily[0];
        assert_eq!(created.new_learned, 1);
        assert_eq!(created.review_count, 0);
        assert_eq!(created.retention_rate, 0.0);

        let first = &stats.daily[1];
        assert_eq!(first.review_count, 1);
        assert_eq!(first.mastered_count, 1);
        assert_eq!(first.retention_rate, 1.0);
        assert_eq!(first.average_review_interval_hours, 0.0);

        let second = &stats.daily[2];
        assert_eq!(second.review_count, 3);
        assert_eq!(second.correct_count, 1);
        assert!((second.retention_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(second.study_secs, 3.5);
        assert!((second.average_review_interval_hours - 28.0 / 3.0).abs() < 1e-9);

        assert_eq!(stats.retention_by_type.get(&ItemType::Word), Some(&0.5));
        assert_eq!(stats.retention_by_type.len(), 1);
    }

    #[tokio::test]
    async fn reviews_outside_window_or_type_are_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let word = MemoryUnit::new("alice", ItemType::Word, "w", now() - Duration::days(100));
        let character = MemoryUnit::new("alice", ItemType::Character, "c", now() - Duration::days(100));
        store.insert_unit(word.clone());
        store.insert_unit(character.clone());

        store
            .create(&review(&word, ReviewOutcome::Correct, 0, MasteryLevel::Unlearned, MasteryLevel::Beginner, now() - Duration::days(31)))
            .await
            .unwrap();
        store
            .create(&review(&character, ReviewOutcome::Correct, 0, MasteryLevel::Unlearned, MasteryLevel::Beginner, now() - Duration::days(1)))
            .await
            .unwrap();

        let stats = aggregator(store, 0)
            .compute_stats("alice", ItemType::Word, 30)
            .await
            .unwrap();
        assert!(stats.daily.is_empty());
    }

    #[tokio::test]
    async fn local_offset_moves_day_boundary() {
        let store = Arc::new(InMemoryStore::new());
        let unit = MemoryUnit::new("alice", ItemType::Word, "w", now() - Duration::days(100));
        store.insert_unit(unit.clone());
        // 2024-06-14 20:00 UTC is already 2024-06-15 in UTC+8.
        let at = Utc.with_ymd_and_hms(2024, 6, 14, 20, 0, 0).unwrap();
        store
            .create(&review(&unit, ReviewOutcome::Correct, 0, MasteryLevel::Unlearned, MasteryLevel::Beginner, at))
            .await
            .unwrap();

        let utc = aggregator(store.clone(), 0)
            .compute_stats("alice", ItemType::Word, 30)
            .await
            .unwrap();
        let shifted = aggregator(store, 8)
            .compute_stats("alice", ItemType::Word, 30)
            .await
            .unwrap();

        assert_eq!(utc.daily[0].date, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
        assert_eq!(shifted.daily[0].date, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
    }

    #[tokio::test]
    async fn store_failure_returns_no_partial_report() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_unit(MemoryUnit::new("alice", ItemType::Word, "w", now()));
        store.set_fail_reads(true);

        let err = aggregator(store, 0)
            .compute_stats("alice", ItemType::Word, 30)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Infrastructure(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn summary_uses_store_aggregates() {
        let store = Arc::new(InMemoryStore::new());
        let mut unit = MemoryUnit::new("alice", ItemType::Word, "w", now() - Duration::days(1));
        unit.mastery_level = MasteryLevel::Mastered;
        unit.next_review_at = now() + Duration::days(2);
        unit.study_duration_secs = 12.5;
        store.insert_unit(unit);

        let summary = aggregator(store, 0).summary("alice", ItemType::Word).await.unwrap();
        assert_eq!(
            summary,
            UnitSummary {
                total: 1,
                mastered: 1,
                need_review: 0,
                total_study_secs: 12.5,
            }
        );
    }
}
