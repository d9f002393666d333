use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::memory::clock::Clock;
use crate::memory::error::MemoryError;
use crate::memory::review::{BatchOutcome, ReviewProcessor, ReviewSubmission};
use crate::memory::stats::{MemoryStats, StatsAggregator};
use crate::memory::store::{MemoryReviewStore, MemoryUnitStore, UnitSummary};
use crate::memory::types::{ItemType, MemoryUnit};

pub const DEFAULT_DUE_LIMIT: usize = 20;
pub const MAX_STATS_WINDOW_DAYS: u32 = 365;
const MAX_CONTENT_REF_LEN: usize = 256;

/// An item to start tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSeed {
    pub item_type: ItemType,
    pub content_ref: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueUnits {
    pub units: Vec<MemoryUnit>,
    pub has_more: bool,
    pub total_due: u64,
}

/// Entry point for the transport layer. Every call takes the owner
/// explicitly.
pub struct MemoryService {
    units: Arc<dyn MemoryUnitStore>,
    processor: ReviewProcessor,
    stats: StatsAggregator,
    clock: Arc<dyn Clock>,
    config: MemoryConfig,
}

impl MemoryService {
    pub fn new(
        units: Arc<dyn MemoryUnitStore>,
        reviews: Arc<dyn MemoryReviewStore>,
        clock: Arc<dyn Clock>,
        config: MemoryConfig,
    ) -> Self {
        let processor = ReviewProcessor::new(units.clone(), reviews.clone(), clock.clone())
            .with_max_batch_size(config.max_batch_size);
        let stats = StatsAggregator::new(
            units.clone(),
            reviews,
            clock.clone(),
            config.local_offset(),
        );

        Self {
            units,
            processor,
            stats,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Creates a unit for each distinct seed that has none yet and returns
    /// the unit ids in first-seen order.
    pub async fn initialize_units(
        &self,
        owner_id: &str,
        seeds: &[UnitSeed],
    ) -> Result<Vec<Uuid>, MemoryError> {
        let owner_id = validate_owner(owner_id)?;
        if seeds.len() > self.config.max_batch_size {
            return Err(MemoryError::Validation(format!(
                "items exceeds maximum size of {}",
                self.config.max_batch_size
            )));
        }

        let now = self.clock.now();
        let mut seen = HashSet::new();
        let mut fresh = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let content_ref = validate_content_ref(&seed.content_ref)?;
            if seen.insert((seed.item_type, content_ref.to_string())) {
                fresh.push(MemoryUnit::new(owner_id, seed.item_type, content_ref, now));
            }
        }

        let stored = self.units.create_batch(&fresh).await?;
        tracing::debug!(owner = %owner_id, requested = seeds.len(), stored = stored.len(), "memory units initialized");
        Ok(stored.into_iter().map(|unit| unit.id).collect())
    }

    pub async fn start_learning(
        &self,
        owner_id: &str,
        item_type: ItemType,
        content_ref: &str,
    ) -> Result<MemoryUnit, MemoryError> {
        let owner_id = validate_owner(owner_id)?;
        let content_ref = validate_content_ref(content_ref)?;
        let unit = self
            .units
            .get_or_create(owner_id, item_type, content_ref, self.clock.now())
            .await?;
        Ok(unit)
    }

    /// One unit, visible only to its owner.
    pub async fn get_unit(&self, owner_id: &str, unit_id: Uuid) -> Result<MemoryUnit, MemoryError> {
        let owner_id = validate_owner(owner_id)?;
        let unit = self
            .units
            .get_by_id(unit_id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(unit_id.to_string()))?;
        if unit.owner_id != owner_id {
            return Err(MemoryError::Forbidden(unit_id.to_string()));
        }
        Ok(unit)
    }

    /// Units due now, most overdue first.
    pub async fn list_due_for_review(
        &self,
        owner_id: &str,
        item_type: ItemType,
        limit: Option<usize>,
    ) -> Result<DueUnits, MemoryError> {
        let owner_id = validate_owner(owner_id)?;
        let max = self.config.due_limit_max.max(1);
        let limit = limit.unwrap_or(DEFAULT_DUE_LIMIT).clamp(1, max);
        let now = self.clock.now();

        let mut units = self
            .units
            .list_need_review(owner_id, item_type, now, limit + 1)
            .await?;
        let has_more = units.len() > limit;
        units.truncate(limit);

        let total_due = self.units.count_need_review(owner_id, item_type, now).await?;

        Ok(DueUnits {
            units,
            has_more,
            total_due,
        })
    }

    pub async fn submit_review_batch(
        &self,
        owner_id: &str,
        items: &[ReviewSubmission],
    ) -> Result<BatchOutcome, MemoryError> {
        let owner_id = validate_owner(owner_id)?;
        self.processor.submit_batch(owner_id, items).await
    }

    pub async fn get_stats(
        &self,
        owner_id: &str,
        item_type: ItemType,
        window_days: Option<u32>,
    ) -> Result<MemoryStats, MemoryError> {
        let owner_id = validate_owner(owner_id)?;
        let window_days = window_days.unwrap_or(self.config.stats_window_days);
        if window_days == 0 || window_days > MAX_STATS_WINDOW_DAYS {
            return Err(MemoryError::Validation(format!(
                "windowDays must be between 1 and {MAX_STATS_WINDOW_DAYS}"
            )));
        }
        self.stats.compute_stats(owner_id, item_type, window_days).await
    }

    pub async fn summary(
        &self,
        owner_id: &str,
        item_type: ItemType,
    ) -> Result<UnitSummary, MemoryError> {
        let owner_id = validate_owner(owner_id)?;
        self.stats.summary(owner_id, item_type).await
    }
}

fn validate_owner(owner_id: &str) -> Result<&str, MemoryError> {
    let trimmed = owner_id.trim();
    if trimmed.is_empty() {
        return Err(MemoryError::Validation("owner id is required".to_string()));
    }
    Ok(trimmed)
}

fn validate_content_ref(content_ref: &str) -> Result<&str, MemoryError> {
    let trimmed = content_ref.trim();
    if trimmed.is_empty() {
        return Err(MemoryError::Validation("contentRef is required".to_string()));
    }
    if trimmed.chars().count() > MAX_CONTENT_REF_LEN {
        return Err(MemoryError::Validation(format!(
            "contentRef exceeds {MAX_CONTENT_REF_LEN} characters"
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::clock::ManualClock;
    use crate::memory::review::BatchStatus;
    use crate::memory::store::InMemoryStore;
    use crate::memory::types::MasteryLevel;
    use chrono::{Duration, TimeZone, Utc};

    fn setup(config: MemoryConfig) -> (MemoryService, Arc<InMemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let service = MemoryService::new(store.clone(), store.clone(), clock.clone(), config);
        (service, store, clock)
    }

    fn seed(item_type: ItemType, content_ref: &str) -> UnitSeed {
        UnitSeed {
            item_type,
            content_ref: content_ref.to_string(),
        }
    }

    #[tokio::test]
    async fn initialize_dedupes_and_is_idempotent() {
        let (service, _, _) = setup(MemoryConfig::default());
        let seeds = vec![
            seed(ItemType::Word, "apple"),
            seed(ItemType::Word, " apple "),
            seed(ItemType::Character, "apple"),
        ];

        let first = service.initialize_units("u1", &seeds).await.unwrap();
        assert_eq!(first.len(), 2);

        let again = service.initialize_units("u1", &seeds).await.unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn initialize_rejects_blank_content() {
        let (service, _, _) = setup(MemoryConfig::default());
        let err = service
            .initialize_units("u1", &[seed(ItemType::Word, "  ")])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[tokio::test]
    async fn blank_owner_is_rejected() {
        let (service, _, _) = setup(MemoryConfig::default());
        let err = service.summary(" ", ItemType::Word).await.unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[tokio::test]
    async fn start_learning_returns_existing_unit() {
        let (service, _, _) = setup(MemoryConfig::default());
        let first = service.start_learning("u1", ItemType::Word, "pear").await.unwrap();
        let second = service.start_learning("u1", ItemType::Word, "pear").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.mastery_level, MasteryLevel::Unlearned);
    }

    #[tokio::test]
    async fn due_list_reports_has_more_and_total() {
        let config = MemoryConfig {
            due_limit_max: 2,
            ..MemoryConfig::default()
        };
        let (service, _, clock) = setup(config);
        let seeds: Vec<UnitSeed> = ["a", "b", "c"]
            .iter()
            .map(|c| seed(ItemType::Word, c))
            .collect();
        service.initialize_units("u1", &seeds).await.unwrap();
        clock.advance(Duration::minutes(1));

        let due = service
            .list_due_for_review("u1", ItemType::Word, Some(50))
            .await
            .unwrap();
        assert_eq!(due.units.len(), 2);
        assert!(due.has_more);
        assert_eq!(due.total_due, 3);

        let none = service
            .list_due_for_review("u1", ItemType::Character, None)
            .await
            .unwrap();
        assert!(none.units.is_empty());
        assert!(!none.has_more);
    }

    #[tokio::test]
    async fn reviewed_unit_leaves_due_list() {
        let (service, _, _) = setup(MemoryConfig::default());
        let ids = service
            .initialize_units("u1", &[seed(ItemType::Word, "kiwi")])
            .await
            .unwrap();

        let outcome = service
            .submit_review_batch(
                "u1",
                &[ReviewSubmission::new(ids[0].to_string(), "correct", 1500)],
            )
            .await
            .unwrap();
        assert_eq!(outcome.status(), BatchStatus::Succeeded);

        let due = service
            .list_due_for_review("u1", ItemType::Word, None)
            .await
            .unwrap();
        assert_eq!(due.total_due, 0);
    }

    #[tokio::test]
    async fn get_unit_checks_existence_and_owner() {
        let (service, _, _) = setup(MemoryConfig::default());
        let unit = service.start_learning("u1", ItemType::Word, "fig").await.unwrap();

        let loaded = service.get_unit("u1", unit.id).await.unwrap();
        assert_eq!(loaded.id, unit.id);

        let err = service.get_unit("u2", unit.id).await.unwrap_err();
        assert!(matches!(err, MemoryError::Forbidden(_)));

        let err = service.get_unit("u1", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn stats_window_is_validated() {
        let (service, _, _) = setup(MemoryConfig::default());
        let err = service
            .get_stats("u1", ItemType::Word, Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));

        let stats = service.get_stats("u1", ItemType::Word, None).await.unwrap();
        assert_eq!(stats.window_days, 30);
        assert_eq!(stats.total_learned, 0);
    }
}
