use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::{from_millis, to_millis, Database};
use crate::memory::store::{MemoryReviewStore, StoreError};
use crate::memory::types::{MasteryLevel, MemoryReview, ReviewOutcome};

fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, StoreError> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| StoreError::Corrupt(format!("{column} {raw}: {e}")))
}

fn parse_level(row: &SqliteRow, column: &str) -> Result<MasteryLevel, StoreError> {
    let raw: i64 = row.try_get(column)?;
    MasteryLevel::from_i64(raw)
        .ok_or_else(|| StoreError::Corrupt(format!("{column} out of range: {raw}")))
}

fn map_review_row(row: &SqliteRow) -> Result<MemoryReview, StoreError> {
    let outcome: String = row.try_get("outcome")?;
    Ok(MemoryReview {
        id: parse_uuid(row, "id")?,
        unit_id: parse_uuid(row, "unitId")?,
        owner_id: row.try_get("ownerId")?,
        outcome: ReviewOutcome::parse(&outcome)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown outcome {outcome}")))?,
        response_time_ms: row.try_get("responseTimeMs")?,
        mastery_before: parse_level(row, "masteryBefore")?,
        mastery_after: parse_level(row, "masteryAfter")?,
        reviewed_at: from_millis(row.try_get("reviewedAt")?)?,
        created_at: from_millis(row.try_get("createdAt")?)?,
    })
}

#[async_trait]
impl MemoryReviewStore for Database {
    async fn create(&self, review: &MemoryReview) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO "memory_reviews" (
                "id", "unitId", "ownerId", "outcome", "responseTimeMs",
                "masteryBefore", "masteryAfter", "reviewedAt", "createdAt"
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(review.id.to_string())
        .bind(review.unit_id.to_string())
        .bind(&review.owner_id)
        .bind(review.outcome.as_str())
        .bind(review.response_time_ms)
        .bind(review.mastery_before.as_i64())
        .bind(review.mastery_after.as_i64())
        .bind(to_millis(review.reviewed_at))
        .bind(to_millis(review.created_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn list_by_owner_and_time_range(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MemoryReview>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT "id", "unitId", "ownerId", "outcome", "responseTimeMs",
                   "masteryBefore", "masteryAfter", "reviewedAt", "createdAt"
            FROM "memory_reviews"
            WHERE "ownerId" = ? AND "reviewedAt" >= ? AND "reviewedAt" <= ?
            ORDER BY "reviewedAt" ASC, rowid ASC
            "#,
        )
        .bind(owner_id)
        .bind(to_millis(start))
        .bind(to_millis(end))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(map_review_row).collect()
    }
}
