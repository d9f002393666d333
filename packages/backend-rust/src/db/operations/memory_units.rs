use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use uuid::Uuid;

use crate::db::{from_millis, to_millis, Database};
use crate::memory::store::{MemoryUnitStore, StoreError, UnitSummary};
use crate::memory::types::{ItemType, MasteryLevel, MemoryUnit};

const UNIT_COLUMNS: &str = r#""id", "ownerId", "itemType", "contentRef", "masteryLevel",
    "reviewCount", "consecutiveCorrect", "consecutiveWrong", "studyDurationSecs",
    "retentionRate", "lastReviewedAt", "nextReviewAt", "version", "createdAt", "updatedAt""#;

fn map_unit_row(row: &SqliteRow) -> Result<MemoryUnit, StoreError> {
    let id: String = row.try_get("id")?;
    let item_type: String = row.try_get("itemType")?;
    let mastery: i64 = row.try_get("masteryLevel")?;

    Ok(MemoryUnit {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(format!("unit id {id}: {e}")))?,
        owner_id: row.try_get("ownerId")?,
        item_type: ItemType::parse(&item_type)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown item type {item_type}")))?,
        content_ref: row.try_get("contentRef")?,
        mastery_level: MasteryLevel::from_i64(mastery)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown mastery level {mastery}")))?,
        review_count: counter(row, "reviewCount")?,
        consecutive_correct: counter(row, "consecutiveCorrect")?,
        consecutive_wrong: counter(row, "consecutiveWrong")?,
        study_duration_secs: row.try_get("studyDurationSecs")?,
        retention_rate: row.try_get("retentionRate")?,
        last_reviewed_at: from_millis(row.try_get("lastReviewedAt")?)?,
        next_review_at: from_millis(row.try_get("nextReviewAt")?)?,
        version: row.try_get("version")?,
        created_at: from_millis(row.try_get("createdAt")?)?,
        updated_at: from_millis(row.try_get("updatedAt")?)?,
    })
}

fn counter(row: &SqliteRow, column: &str) -> Result<u32, StoreError> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

async fn insert_if_absent(
    tx: &mut Transaction<'_, Sqlite>,
    unit: &MemoryUnit,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO "memory_units" (
            "id", "ownerId", "itemType", "contentRef", "masteryLevel",
            "reviewCount", "consecutiveCorrect", "consecutiveWrong", "studyDurationSecs",
            "retentionRate", "lastReviewedAt", "nextReviewAt", "version", "createdAt", "updatedAt"
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT ("ownerId", "itemType", "contentRef") DO NOTHING
        "#,
    )
    .bind(unit.id.to_string())
    .bind(&unit.owner_id)
    .bind(unit.item_type.as_str())
    .bind(&unit.content_ref)
    .bind(unit.mastery_level.as_i64())
    .bind(i64::from(unit.review_count))
    .bind(i64::from(unit.consecutive_correct))
    .bind(i64::from(unit.consecutive_wrong))
    .bind(unit.study_duration_secs)
    .bind(unit.retention_rate)
    .bind(to_millis(unit.last_reviewed_at))
    .bind(to_millis(unit.next_review_at))
    .bind(unit.version)
    .bind(to_millis(unit.created_at))
    .bind(to_millis(unit.updated_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn fetch_by_key(
    tx: &mut Transaction<'_, Sqlite>,
    owner_id: &str,
    item_type: ItemType,
    content_ref: &str,
) -> Result<MemoryUnit, StoreError> {
    let sql = format!(
        r#"SELECT {UNIT_COLUMNS} FROM "memory_units"
        WHERE "ownerId" = ? AND "itemType" = ? AND "contentRef" = ? LIMIT 1"#
    );
    let row = sqlx::query(&sql)
        .bind(owner_id)
        .bind(item_type.as_str())
        .bind(content_ref)
        .fetch_one(&mut **tx)
        .await?;
    map_unit_row(&row)
}

#[async_trait]
impl MemoryUnitStore for Database {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>, StoreError> {
        let sql = format!(r#"SELECT {UNIT_COLUMNS} FROM "memory_units" WHERE "id" = ? LIMIT 1"#);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(map_unit_row).transpose()
    }

    async fn get_or_create(
        &self,
        owner_id: &str,
        item_type: ItemType,
        content_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<MemoryUnit, StoreError> {
        let fresh = MemoryUnit::new(owner_id, item_type, content_ref, now);
        let mut tx = self.pool().begin().await?;
        insert_if_absent(&mut tx, &fresh).await?;
        let unit = fetch_by_key(&mut tx, owner_id, item_type, content_ref).await?;
        tx.commit().await?;
        Ok(unit)
    }

    async fn list_need_review(
        &self,
        owner_id: &str,
        item_type: ItemType,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MemoryUnit>, StoreError> {
        let sql = format!(
            r#"SELECT {UNIT_COLUMNS} FROM "memory_units"
            WHERE "ownerId" = ? AND "itemType" = ? AND "nextReviewAt" <= ?
            ORDER BY "nextReviewAt" ASC, "id" ASC
            LIMIT ?"#
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .bind(item_type.as_str())
            .bind(to_millis(before))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(map_unit_row).collect()
    }

    async fn list_by_owner_and_type(
        &self,
        owner_id: &str,
        item_type: ItemType,
    ) -> Result<Vec<MemoryUnit>, StoreError> {
        let sql = format!(
            r#"SELECT {UNIT_COLUMNS} FROM "memory_units"
            WHERE "ownerId" = ? AND "itemType" = ?
            ORDER BY "createdAt" ASC, "id" ASC"#
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .bind(item_type.as_str())
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(map_unit_row).collect()
    }

    async fn count_need_review(
        &self,
        owner_id: &str,
        item_type: ItemType,
        before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM "memory_units"
            WHERE "ownerId" = ? AND "itemType" = ? AND "nextReviewAt" <= ?"#,
        )
        .bind(owner_id)
        .bind(item_type.as_str())
        .bind(to_millis(before))
        .fetch_one(self.pool())
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn create_batch(&self, units: &[MemoryUnit]) -> Result<Vec<MemoryUnit>, StoreError> {
        if units.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool().begin().await?;
        let mut stored = Vec::with_capacity(units.len());
        for unit in units {
            insert_if_absent(&mut tx, unit).await?;
            stored.push(fetch_by_key(&mut tx, &unit.owner_id, unit.item_type, &unit.content_ref).await?);
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn update_batch(&self, units: &[MemoryUnit]) -> Result<(), StoreError> {
        if units.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await?;
        for unit in units {
            let result = sqlx::query(
                r#"
                UPDATE "memory_units" SET
                    "masteryLevel" = ?,
                    "reviewCount" = ?,
                    "consecutiveCorrect" = ?,
                    "consecutiveWrong" = ?,
                    "studyDurationSecs" = ?,
                    "retentionRate" = ?,
                    "lastReviewedAt" = ?,
                    "nextReviewAt" = ?,
                    "updatedAt" = ?,
                    "version" = "version" + 1
                WHERE "id" = ? AND "version" = ?
                "#,
            )
            .bind(unit.mastery_level.as_i64())
            .bind(i64::from(unit.review_count))
            .bind(i64::from(unit.consecutive_correct))
            .bind(i64::from(unit.consecutive_wrong))
            .bind(unit.study_duration_secs)
            .bind(unit.retention_rate)
            .bind(to_millis(unit.last_reviewed_at))
            .bind(to_millis(unit.next_review_at))
            .bind(to_millis(unit.updated_at))
            .bind(unit.id.to_string())
            .bind(unit.version)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(StoreError::Conflict { unit_id: unit.id });
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_stats(
        &self,
        owner_id: &str,
        item_type: ItemType,
        as_of: DateTime<Utc>,
    ) -> Result<UnitSummary, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS "total",
                COALESCE(SUM(CASE WHEN "masteryLevel" >= ? THEN 1 ELSE 0 END), 0) AS "mastered",
                COALESCE(SUM(CASE WHEN "nextReviewAt" <= ? THEN 1 ELSE 0 END), 0) AS "needReview",
                COALESCE(SUM("studyDurationSecs"), 0.0) AS "studySecs"
            FROM "memory_units"
            WHERE "ownerId" = ? AND "itemType" = ?
            "#,
        )
        .bind(MasteryLevel::Mastered.as_i64())
        .bind(to_millis(as_of))
        .bind(owner_id)
        .bind(item_type.as_str())
        .fetch_one(self.pool())
        .await?;

        let total: i64 = row.try_get("total")?;
        let mastered: i64 = row.try_get("mastered")?;
        let need_review: i64 = row.try_get("needReview")?;
        let total_study_secs: f64 = row.try_get("studySecs")?;

        Ok(UnitSummary {
            total: total.max(0) as u64,
            mastered: mastered.max(0) as u64,
            need_review: need_review.max(0) as u64,
            total_study_secs,
        })
    }
}
