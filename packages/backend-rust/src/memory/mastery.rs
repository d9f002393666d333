use chrono::{DateTime, Utc};

use crate::memory::scheduling::calculate_next_interval;
use crate::memory::types::{MasteryLevel, MemoryUnit, ReviewOutcome};

pub const BEGINNER_STREAK: u32 = 1;
pub const FAMILIAR_STREAK: u32 = 3;
pub const MASTERED_STREAK: u32 = 5;
pub const EXPERT_STREAK: u32 = 10;
pub const RESET_WRONG_STREAK: u32 = 3;

/// Next mastery level from the current streak counters.
///
/// A wrong streak of `RESET_WRONG_STREAK` wins over everything else. When no
/// threshold is met the current level is kept.
pub fn transition(
    current: MasteryLevel,
    consecutive_correct: u32,
    consecutive_wrong: u32,
) -> MasteryLevel {
    if consecutive_wrong >= RESET_WRONG_STREAK {
        return MasteryLevel::Unlearned;
    }

    if consecutive_correct >= EXPERT_STREAK {
        MasteryLevel::Expert
    } else if consecutive_correct >= MASTERED_STREAK {
        MasteryLevel::Mastered
    } else if consecutive_correct >= FAMILIAR_STREAK {
        MasteryLevel::Familiar
    } else if consecutive_correct >= BEGINNER_STREAK {
        MasteryLevel::Beginner
    } else {
        current
    }
}

pub fn retention_rate(consecutive_correct: u32, review_count: u32) -> f64 {
    if review_count == 0 {
        return 0.0;
    }
    (consecutive_correct as f64 / review_count as f64).clamp(0.0, 1.0)
}

impl MemoryUnit {
    /// Applies one review event in memory. Nothing is persisted here.
    pub fn record_review(
        &mut self,
        outcome: ReviewOutcome,
        response_time_ms: i64,
        now: DateTime<Utc>,
    ) {
        self.last_reviewed_at = now;
        self.review_count = self.review_count.saturating_add(1);
        self.study_duration_secs += response_time_ms.max(0) as f64 / 1000.0;

        match outcome {
            ReviewOutcome::Correct => {
                self.consecutive_correct = self.consecutive_correct.saturating_add(1);
                self.consecutive_wrong = 0;
            }
            ReviewOutcome::Wrong => {
                self.consecutive_wrong = self.consecutive_wrong.saturating_add(1);
                self.consecutive_correct = 0;
            }
            ReviewOutcome::Skip => {}
        }

        self.mastery_level = transition(
            self.mastery_level,
            self.consecutive_correct,
            self.consecutive_wrong,
        );
        self.retention_rate = retention_rate(self.consecutive_correct, self.review_count);
        self.next_review_at = now + calculate_next_interval(self);
        self.updated_at = now;
    }
}
