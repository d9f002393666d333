use chrono::Duration;

use crate::memory::types::{MasteryLevel, MemoryUnit};

const CORRECT_STREAK_FACTOR: f64 = 1.2;
const WRONG_STREAK_DIVISOR: f64 = 2.0;
const MS_PER_HOUR: f64 = 3_600_000.0;

/// Shortest allowed interval, equal to the Unlearned base.
pub const MIN_INTERVAL_HOURS: f64 = 1.0;
pub const MAX_INTERVAL_HOURS: f64 = 36_500.0 * 24.0;

/// Interval in hours for the given level and streak counters.
///
/// Both streak adjustments are applied if both counters are non-zero, even
/// though a unit mutated through `record_review` never has both set.
pub fn next_interval_hours(
    level: MasteryLevel,
    consecutive_correct: u32,
    consecutive_wrong: u32,
) -> f64 {
    let mut hours = level.base_interval_hours();

    if consecutive_correct > 0 {
        hours *= CORRECT_STREAK_FACTOR * consecutive_correct as f64;
    }
    if consecutive_wrong > 0 {
        hours /= WRONG_STREAK_DIVISOR * consecutive_wrong as f64;
    }

    hours.clamp(MIN_INTERVAL_HOURS, MAX_INTERVAL_HOURS)
}

pub fn calculate_next_interval(unit: &MemoryUnit) -> Duration {
    let hours = next_interval_hours(
        unit.mastery_level,
        unit.consecutive_correct,
        unit.consecutive_wrong,
    );
    Duration::milliseconds((hours * MS_PER_HOUR).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_intervals_by_level() {
        assert_eq!(next_interval_hours(MasteryLevel::Unlearned, 0, 0), 1.0);
        assert_eq!(next_interval_hours(MasteryLevel::Beginner, 0, 0), 4.0);
        assert_eq!(next_interval_hours(MasteryLevel::Familiar, 0, 0), 24.0);
        assert_eq!(next_interval_hours(MasteryLevel::Mastered, 0, 0), 72.0);
        assert_eq!(next_interval_hours(MasteryLevel::Expert, 0, 0), 168.0);
    }

    #[test]
    fn correct_streak_multiplies() {
        let hours = next_interval_hours(MasteryLevel::Beginner, 1, 0);
        assert!((hours - 4.8).abs() < 1e-9);

        let hours = next_interval_hours(MasteryLevel::Expert, 10, 0);
        assert!((hours - 2016.0).abs() < 1e-6);
    }

    #[test]
    fn wrong_streak_divides_but_never_below_floor() {
        let hours = next_interval_hours(MasteryLevel::Familiar, 0, 2);
        assert!((hours - 6.0).abs() < 1e-9);

        assert_eq!(next_interval_hours(MasteryLevel::Beginner, 0, 5), MIN_INTERVAL_HOURS);
        assert_eq!(next_interval_hours(MasteryLevel::Unlearned, 0, 1), MIN_INTERVAL_HOURS);
    }

    #[test]
    fn both_counters_applied_when_supplied() {
        // 72 * 1.2 * 5 / (2 * 2)
        let hours = next_interval_hours(MasteryLevel::Mastered, 5, 2);
        assert!((hours - 108.0).abs() < 1e-9);
    }

    #[test]
    fn huge_streaks_are_capped() {
        let hours = next_interval_hours(MasteryLevel::Expert, u32::MAX, 0);
        assert_eq!(hours, MAX_INTERVAL_HOURS);
    }

    #[test]
    fn duration_is_rounded_to_millis() {
        let mut unit = MemoryUnit::new("u1", crate::memory::ItemType::Word, "w1", chrono::Utc::now());
        unit.mastery_level = MasteryLevel::Expert;
        unit.consecutive_correct = 10;
        assert_eq!(calculate_next_interval(&unit), Duration::hours(2016));
    }
}
