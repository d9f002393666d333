//! Persistence boundary of the memory core.
//!
//! `MemoryUnitStore` and `MemoryReviewStore` are implemented by the SQLite
//! layer in `crate::db` and by `InMemoryStore`, an in-process store used by
//! tests and embedders that do not need durability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::memory::types::{ItemType, MemoryReview, MemoryUnit};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
    #[error("version conflict on unit {unit_id}")]
    Conflict { unit_id: Uuid },
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Pre-aggregated counters for one owner and item type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSummary {
    pub total: u64,
    pub mastered: u64,
    pub need_review: u64,
    pub total_study_secs: f64,
}

#[async_trait]
pub trait MemoryUnitStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>, StoreError>;

    /// Returns the unit for `(owner, item_type, content_ref)`, creating a
    /// fresh one stamped with `now` if none exists.
    async fn get_or_create(
        &self,
        owner_id: &str,
        item_type: ItemType,
        content_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<MemoryUnit, StoreError>;

    async fn list_need_review(
        &self,
        owner_id: &str,
        item_type: ItemType,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MemoryUnit>, StoreError>;

    async fn list_by_owner_and_type(
        &self,
        owner_id: &str,
        item_type: ItemType,
    ) -> Result<Vec<MemoryUnit>, StoreError>;

    async fn count_need_review(
        &self,
        owner_id: &str,
        item_type: ItemType,
        before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Inserts the units, keeping the existing row on a key collision.
    /// Returns the stored unit for every input, in input order.
    async fn create_batch(&self, units: &[MemoryUnit]) -> Result<Vec<MemoryUnit>, StoreError>;

    /// Writes all units or none. Each unit's `version` must match the stored
    /// one; the stored version is bumped by one on success.
    async fn update_batch(&self, units: &[MemoryUnit]) -> Result<(), StoreError>;

    async fn get_stats(
        &self,
        owner_id: &str,
        item_type: ItemType,
        as_of: DateTime<Utc>,
    ) -> Result<UnitSummary, StoreError>;
}

#[async_trait]
pub trait MemoryReviewStore: Send + Sync {
    async fn create(&self, review: &MemoryReview) -> Result<(), StoreError>;

    /// Reviews with `start <= reviewed_at <= end`, oldest first.
    async fn list_by_owner_and_time_range(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MemoryReview>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    units: Mutex<HashMap<Uuid, MemoryUnit>>,
    reviews: Mutex<Vec<MemoryReview>>,
    fail_reads: AtomicBool,
    fail_updates: AtomicBool,
    fail_review_writes: AtomicBool,
    conflict_once: Mutex<Option<Uuid>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_unit(&self, unit: MemoryUnit) {
        self.units.lock().insert(unit.id, unit);
    }

    pub fn unit(&self, id: Uuid) -> Option<MemoryUnit> {
        self.units.lock().get(&id).cloned()
    }

    pub fn reviews(&self) -> Vec<MemoryReview> {
        self.reviews.lock().clone()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_review_writes(&self, fail: bool) {
        self.fail_review_writes.store(fail, Ordering::SeqCst);
    }

    /// Bumps the stored version of `unit_id` right before the next
    /// `update_batch`, as if another writer got there first.
    pub fn inject_conflict(&self, unit_id: Uuid) {
        *self.conflict_once.lock() = Some(unit_id);
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    fn owned_by(&self, owner_id: &str, item_type: ItemType) -> Vec<MemoryUnit> {
        let mut units: Vec<MemoryUnit> = self
            .units
            .lock()
            .values()
            .filter(|u| u.owner_id == owner_id && u.item_type == item_type)
            .cloned()
            .collect();
        units.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        units
    }
}

#[async_trait]
impl MemoryUnitStore for InMemoryStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>, StoreError> {
        self.check_reads()?;
        Ok(self.unit(id))
    }

    async fn get_or_create(
        &self,
        owner_id: &str,
        item_type: ItemType,
        content_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<MemoryUnit, StoreError> {
        self.check_reads()?;
        let mut units = self.units.lock();
        if let Some(existing) = units.values().find(|u| {
            u.owner_id == owner_id && u.item_type == item_type && u.content_ref == content_ref
        }) {
            return Ok(existing.clone());
        }
        let unit = MemoryUnit::new(owner_id, item_type, content_ref, now);
        units.insert(unit.id, unit.clone());
        Ok(unit)
    }

    async fn list_need_review(
        &self,
        owner_id: &str,
        item_type: ItemType,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MemoryUnit>, StoreError> {
        self.check_reads()?;
        let mut due: Vec<MemoryUnit> = self
            .owned_by(owner_id, item_type)
            .into_iter()
            .filter(|u| u.next_review_at <= before)
            .collect();
        due.sort_by(|a, b| a.next_review_at.cmp(&b.next_review_at).then(a.id.cmp(&b.id)));
        due.truncate(limit);
        Ok(due)
    }

    async fn list_by_owner_and_type(
        &self,
        owner_id: &str,
        item_type: ItemType,
    ) -> Result<Vec<MemoryUnit>, StoreError> {
        self.check_reads()?;
        Ok(self.owned_by(owner_id, item_type))
    }

    async fn count_need_review(
        &self,
        owner_id: &str,
        item_type: ItemType,
        before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check_reads()?;
        Ok(self
            .owned_by(owner_id, item_type)
            .iter()
            .filter(|u| u.next_review_at <= before)
            .count() as u64)
    }

    async fn create_batch(&self, units: &[MemoryUnit]) -> Result<Vec<MemoryUnit>, StoreError> {
        let mut stored = self.units.lock();
        let mut out = Vec::with_capacity(units.len());
        for unit in units {
            let existing = stored
                .values()
                .find(|u| {
                    u.owner_id == unit.owner_id
                        && u.item_type == unit.item_type
                        && u.content_ref == unit.content_ref
                })
                .cloned();
            match existing {
                Some(existing) => out.push(existing),
                None => {
                    stored.insert(unit.id, unit.clone());
                    out.push(unit.clone());
                }
            }
        }
        Ok(out)
    }

    async fn update_batch(&self, units: &[MemoryUnit]) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("updates disabled".to_string()));
        }

        let mut stored = self.units.lock();
        if let Some(unit_id) = self.conflict_once.lock().take() {
            if let Some(unit) = stored.get_mut(&unit_id) {
                unit.version += 1;
            }
        }

        for unit in units {
            match stored.get(&unit.id) {
                Some(current) if current.version == unit.version => {}
                _ => return Err(StoreError::Conflict { unit_id: unit.id }),
            }
        }
        for unit in units {
            let mut next = unit.clone();
            next.version += 1;
            stored.insert(next.id, next);
        }
        Ok(())
    }

    async fn get_stats(
        &self,
        owner_id: &str,
        item_type: ItemType,
        as_of: DateTime<Utc>,
    ) -> Result<UnitSummary, StoreError> {
        self.check_reads()?;
        let units = self.owned_by(owner_id, item_type);
        Ok(UnitSummary {
            total: units.len() as u64,
            mastered: units.iter().filter(|u| u.mastery_level.is_mastered()).count() as u64,
            need_review: units.iter().filter(|u| u.is_due(as_of)).count() as u64,
            total_study_secs: units.iter().map(|u| u.study_duration_secs).sum(),
        })
    }
}

#[async_trait]
impl MemoryReviewStore for InMemoryStore {
    async fn create(&self, review: &MemoryReview) -> Result<(), StoreError> {
        if self.fail_review_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("review writes disabled".to_string()));
        }
        self.reviews.lock().push(review.clone());
        Ok(())
    }

    async fn list_by_owner_and_time_range(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MemoryReview>, StoreError> {
        self.check_reads()?;
        let mut out: Vec<MemoryReview> = self
            .reviews
            .lock()
            .iter()
            .filter(|r| r.owner_id == owner_id && r.reviewed_at >= start && r.reviewed_at <= end)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.reviewed_at);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = InMemoryStore::new();
        let first = store
            .get_or_create("u1", ItemType::Word, "apple", now())
            .await
            .unwrap();
        let second = store
            .get_or_create("u1", ItemType::Word, "apple", now())
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let other_type = store
            .get_or_create("u1", ItemType::Character, "apple", now())
            .await
            .unwrap();
        assert_ne!(first.id, other_type.id);
    }

    #[tokio::test]
    async fn update_batch_rejects_stale_version_without_partial_write() {
        let store = InMemoryStore::new();
        let a = MemoryUnit::new("u1", ItemType::Word, "a", now());
        let b = MemoryUnit::new("u1", ItemType::Word, "b", now());
        store.insert_unit(a.clone());
        store.insert_unit(b.clone());

        let mut a_next = a.clone();
        a_next.review_count = 1;
        let mut b_stale = b.clone();
        b_stale.version = 7;

        let err = store.update_batch(&[a_next, b_stale]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { unit_id } if unit_id == b.id));
        assert_eq!(store.unit(a.id).unwrap().review_count, 0);
        assert_eq!(store.unit(a.id).unwrap().version, 0);
    }
}
