use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::memory::clock::Clock;
use crate::memory::error::{ItemError, ItemFailure, MemoryError, PartialBatchFailure};
use crate::memory::store::{MemoryReviewStore, MemoryUnitStore, StoreError};
use crate::memory::types::{MasteryLevel, MemoryReview, MemoryUnit, ReviewOutcome};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;
pub const MAX_RESPONSE_TIME_MS: i64 = 60 * 60 * 1000;

/// One review result as submitted by a caller, before validation.
///
/// Fields keep their raw JSON shape so a malformed item is rejected on its
/// own instead of failing the whole request body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct ReviewSubmission {
    pub unit_id: Value,
    pub outcome: Value,
    pub response_time_ms: Value,
}

impl ReviewSubmission {
    pub fn new(unit_id: impl Into<String>, outcome: impl Into<String>, response_time_ms: i64) -> Self {
        Self {
            unit_id: Value::String(unit_id.into()),
            outcome: Value::String(outcome.into()),
            response_time_ms: Value::from(response_time_ms),
        }
    }

    /// The unit id as reported back in a failure.
    pub fn unit_id_label(&self) -> String {
        match &self.unit_id {
            Value::String(raw) => raw.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl From<Value> for ReviewSubmission {
    fn from(value: Value) -> Self {
        let field = |name: &str| value.get(name).cloned().unwrap_or(Value::Null);
        Self {
            unit_id: field("unitId"),
            outcome: field("outcome"),
            response_time_ms: field("responseTimeMs"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum BatchStatus {
    Succeeded,
    Partial { failed: usize },
    Rejected { failed: usize },
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub updated: Vec<MemoryUnit>,
    pub partial: Option<PartialBatchFailure>,
}

impl BatchOutcome {
    pub fn status(&self) -> BatchStatus {
        match &self.partial {
            None => BatchStatus::Succeeded,
            Some(partial) if self.updated.is_empty() => BatchStatus::Rejected {
                failed: partial.len(),
            },
            Some(partial) => BatchStatus::Partial {
                failed: partial.len(),
            },
        }
    }
}

struct ParsedSubmission {
    unit_id: Uuid,
    outcome: ReviewOutcome,
    response_time_ms: i64,
}

struct AppliedReview {
    index: usize,
    unit_id: Uuid,
    outcome: ReviewOutcome,
    response_time_ms: i64,
    mastery_before: MasteryLevel,
}

pub struct ReviewProcessor {
    units: Arc<dyn MemoryUnitStore>,
    reviews: Arc<dyn MemoryReviewStore>,
    clock: Arc<dyn Clock>,
    max_batch_size: usize,
}

impl ReviewProcessor {
    pub fn new(
        units: Arc<dyn MemoryUnitStore>,
        reviews: Arc<dyn MemoryReviewStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            units,
            reviews,
            clock,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Applies a batch of review results for `owner_id`.
    ///
    /// Items that fail validation, reference a missing unit, belong to another
    /// owner or lose an optimistic-lock race are reported in
    /// `BatchOutcome::partial` and do not stop the rest of the batch. A store
    /// failure aborts the whole call and nothing from the batch is written.
    pub async fn submit_batch(
        &self,
        owner_id: &str,
        items: &[ReviewSubmission],
    ) -> Result<BatchOutcome, MemoryError> {
        if items.len() > self.max_batch_size {
            return Err(MemoryError::Validation(format!(
                "batch exceeds maximum size of {}",
                self.max_batch_size
            )));
        }

        let now = self.clock.now();
        let mut failures: Vec<ItemFailure> = Vec::new();
        let mut working: HashMap<Uuid, MemoryUnit> = HashMap::new();
        let mut rejected: HashMap<Uuid, ItemError> = HashMap::new();
        let mut order: Vec<Uuid> = Vec::new();
        let mut applied: Vec<AppliedReview> = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let parsed = match parse_submission(item) {
                Ok(parsed) => parsed,
                Err(error) => {
                    tracing::debug!(owner = %owner_id, index, %error, "review item rejected");
                    failures.push(ItemFailure {
                        index,
                        unit_id: item.unit_id_label(),
                        error,
                    });
                    continue;
                }
            };

            if let Some(error) = rejected.get(&parsed.unit_id) {
                failures.push(ItemFailure {
                    index,
                    unit_id: item.unit_id_label(),
                    error: error.clone(),
                });
                continue;
            }

            if !working.contains_key(&parsed.unit_id) {
                let lookup = match self.units.get_by_id(parsed.unit_id).await? {
                    None => Err(ItemError::NotFound),
                    Some(unit) if unit.owner_id != owner_id => Err(ItemError::Forbidden),
                    Some(unit) => Ok(unit),
                };
                match lookup {
                    Ok(unit) => {
                        order.push(unit.id);
                        working.insert(unit.id, unit);
                    }
                    Err(error) => {
                        tracing::debug!(owner = %owner_id, index, unit_id = %parsed.unit_id, %error, "review item skipped");
                        rejected.insert(parsed.unit_id, error.clone());
                        failures.push(ItemFailure {
                            index,
                            unit_id: item.unit_id_label(),
                            error,
                        });
                        continue;
                    }
                }
            }

            let Some(unit) = working.get_mut(&parsed.unit_id) else {
                continue;
            };
            let mastery_before = unit.mastery_level;
            unit.record_review(parsed.outcome, parsed.response_time_ms, now);
            applied.push(AppliedReview {
                index,
                unit_id: parsed.unit_id,
                outcome: parsed.outcome,
                response_time_ms: parsed.response_time_ms,
                mastery_before,
            });
        }

        let mut pending: Vec<MemoryUnit> = order
            .iter()
            .filter_map(|id| working.remove(id))
            .collect();

        while !pending.is_empty() {
            match self.units.update_batch(&pending).await {
                Ok(()) => break,
                Err(StoreError::Conflict { unit_id }) => {
                    if !pending.iter().any(|u| u.id == unit_id) {
                        return Err(MemoryError::Infrastructure(StoreError::Conflict { unit_id }));
                    }
                    tracing::debug!(owner = %owner_id, %unit_id, "memory unit changed since read, dropping from batch");
                    pending.retain(|u| u.id != unit_id);
                    for review in applied.iter().filter(|r| r.unit_id == unit_id) {
                        failures.push(ItemFailure {
                            index: review.index,
                            unit_id: unit_id.to_string(),
                            error: ItemError::Conflict,
                        });
                    }
                    applied.retain(|r| r.unit_id != unit_id);
                }
                Err(err) => {
                    tracing::error!(owner = %owner_id, error = %err, "memory unit batch update failed");
                    return Err(MemoryError::Infrastructure(err));
                }
            }
        }

        for unit in pending.iter_mut() {
            unit.version += 1;
        }

        self.append_review_log(&pending, &applied, now).await;

        failures.sort_by_key(|f| f.index);
        if !failures.is_empty() {
            tracing::info!(
                owner = %owner_id,
                updated = pending.len(),
                failed = failures.len(),
                "review batch partially applied"
            );
        }

        Ok(BatchOutcome {
            updated: pending,
            partial: (!failures.is_empty()).then_some(PartialBatchFailure { failures }),
        })
    }

    async fn append_review_log(
        &self,
        units: &[MemoryUnit],
        applied: &[AppliedReview],
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let by_id: HashMap<Uuid, &MemoryUnit> = units.iter().map(|u| (u.id, u)).collect();

        for (pos, review) in applied.iter().enumerate() {
            let Some(unit) = by_id.get(&review.unit_id) else {
                continue;
            };
            let mut entry = MemoryReview::new(
                unit,
                review.outcome,
                review.response_time_ms,
                review.mastery_before,
                now,
            );
            // A later item for the same unit started from this item's result.
            if let Some(next) = applied[pos + 1..].iter().find(|r| r.unit_id == review.unit_id) {
                entry.mastery_after = next.mastery_before;
            }

            if let Err(err) = self.reviews.create(&entry).await {
                tracing::warn!(error = %err, unit_id = %review.unit_id, "memory review log insert failed");
            }
        }
    }
}

fn parse_submission(item: &ReviewSubmission) -> Result<ParsedSubmission, ItemError> {
    let raw_id = item
        .unit_id
        .as_str()
        .ok_or_else(|| ItemError::Validation("unitId must be a string".to_string()))?;
    let unit_id = Uuid::parse_str(raw_id.trim())
        .map_err(|_| ItemError::Validation("invalid unit id".to_string()))?;

    let raw_outcome = item
        .outcome
        .as_str()
        .ok_or_else(|| ItemError::Validation("outcome must be a string".to_string()))?;
    let outcome = ReviewOutcome::parse(raw_outcome).ok_or_else(|| {
        ItemError::Validation(format!("unrecognized outcome: {raw_outcome}"))
    })?;

    let response_time_ms = match &item.response_time_ms {
        Value::Null => 0,
        value => value.as_i64().ok_or_else(|| {
            ItemError::Validation("responseTimeMs must be an integer".to_string())
        })?,
    };
    if !(0..=MAX_RESPONSE_TIME_MS).contains(&response_time_ms) {
        return Err(ItemError::Validation(
            "response time out of range".to_string(),
        ));
    }

    Ok(ParsedSubmission {
        unit_id,
        outcome,
        response_time_ms,
    })
}
