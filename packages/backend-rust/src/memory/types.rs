use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Character,
    Word,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Word => "word",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "character" => Some(Self::Character),
            "word" => Some(Self::Word),
            _ => None,
        }
    }
}

/// Ordinal summary of how well a unit is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MasteryLevel {
    Unlearned,
    Beginner,
    Familiar,
    Mastered,
    Expert,
}

impl MasteryLevel {
    pub const ALL: [MasteryLevel; 5] = [
        Self::Unlearned,
        Self::Beginner,
        Self::Familiar,
        Self::Mastered,
        Self::Expert,
    ];

    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Unlearned => 0,
            Self::Beginner => 1,
            Self::Familiar => 2,
            Self::Mastered => 3,
            Self::Expert => 4,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Unlearned),
            1 => Some(Self::Beginner),
            2 => Some(Self::Familiar),
            3 => Some(Self::Mastered),
            4 => Some(Self::Expert),
            _ => None,
        }
    }

    /// Mastered and Expert both count as "mastered" in reports.
    pub fn is_mastered(&self) -> bool {
        matches!(self, Self::Mastered | Self::Expert)
    }

    pub fn base_interval_hours(&self) -> f64 {
        match self {
            Self::Unlearned => 1.0,
            Self::Beginner => 4.0,
            Self::Familiar => 24.0,
            Self::Mastered => 72.0,
            Self::Expert => 168.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewOutcome {
    Correct,
    Wrong,
    Skip,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Wrong => "wrong",
            Self::Skip => "skip",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "correct" => Some(Self::Correct),
            "wrong" => Some(Self::Wrong),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// Learning state of one word or character for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUnit {
    pub id: Uuid,
    pub owner_id: String,
    pub item_type: ItemType,
    pub content_ref: String,
    pub mastery_level: MasteryLevel,
    pub review_count: u32,
    pub consecutive_correct: u32,
    pub consecutive_wrong: u32,
    pub study_duration_secs: f64,
    pub retention_rate: f64,
    pub last_reviewed_at: DateTime<Utc>,
    pub next_review_at: DateTime<Utc>,
    /// Optimistic-lock token; the store bumps it on every successful update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryUnit {
    pub fn new(
        owner_id: impl Into<String>,
        item_type: ItemType,
        content_ref: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            item_type,
            content_ref: content_ref.into(),
            mastery_level: MasteryLevel::Unlearned,
            review_count: 0,
            consecutive_correct: 0,
            consecutive_wrong: 0,
            study_duration_secs: 0.0,
            retention_rate: 0.0,
            last_reviewed_at: now,
            next_review_at: now,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }
}

/// Append-only log entry for one review event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReview {
    pub id: Uuid,
    pub unit_id: Uuid,
    pub owner_id: String,
    pub outcome: ReviewOutcome,
    pub response_time_ms: i64,
    pub mastery_before: MasteryLevel,
    pub mastery_after: MasteryLevel,
    pub reviewed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl MemoryReview {
    pub fn new(
        unit: &MemoryUnit,
        outcome: ReviewOutcome,
        response_time_ms: i64,
        mastery_before: MasteryLevel,
        reviewed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            unit_id: unit.id,
            owner_id: unit.owner_id.clone(),
            outcome,
            response_time_ms,
            mastery_before,
            mastery_after: unit.mastery_level,
            reviewed_at,
            created_at: reviewed_at,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.outcome == ReviewOutcome::Correct
    }
}
