//! Property tests for the memory core
//!
//! - Mastery is a pure function of the streak counters
//! - Three wrong answers in a row reset any level
//! - Retention stays equal to consecutive-correct / review-count, within [0, 1]
//! - Every review schedules the next one strictly after itself, within bounds

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use danci_memory::memory::mastery::{retention_rate, transition};
use danci_memory::memory::scheduling::{next_interval_hours, MAX_INTERVAL_HOURS, MIN_INTERVAL_HOURS};
use danci_memory::memory::{ItemType, MasteryLevel, MemoryUnit, ReviewOutcome};

fn arb_level() -> impl Strategy<Value = MasteryLevel> {
    prop::sample::select(MasteryLevel::ALL.to_vec())
}

fn arb_outcome() -> impl Strategy<Value = ReviewOutcome> {
    prop_oneof![
        Just(ReviewOutcome::Correct),
        Just(ReviewOutcome::Wrong),
        Just(ReviewOutcome::Skip),
    ]
}

fn expected_level(current: MasteryLevel, cc: u32, cw: u32) -> MasteryLevel {
    match (cc, cw) {
        (_, w) if w >= 3 => MasteryLevel::Unlearned,
        (c, _) if c >= 10 => MasteryLevel::Expert,
        (c, _) if c >= 5 => MasteryLevel::Mastered,
        (c, _) if c >= 3 => MasteryLevel::Familiar,
        (c, _) if c >= 1 => MasteryLevel::Beginner,
        _ => current,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn mastery_is_function_of_counters(
        current in arb_level(),
        cc in 0u32..40,
        cw in 0u32..10,
    ) {
        let level = transition(current, cc, cw);
        prop_assert_eq!(level, transition(current, cc, cw));
        prop_assert_eq!(level, expected_level(current, cc, cw));
    }

    #[test]
    fn three_wrong_resets_any_level(current in arb_level(), cc in 0u32..40) {
        prop_assert_eq!(transition(current, cc, 3), MasteryLevel::Unlearned);
    }

    #[test]
    fn interval_is_bounded(level in arb_level(), cc in any::<u32>(), cw in any::<u32>()) {
        let hours = next_interval_hours(level, cc, cw);
        prop_assert!(hours >= MIN_INTERVAL_HOURS);
        prop_assert!(hours <= MAX_INTERVAL_HOURS);
    }

    #[test]
    fn review_sequences_keep_invariants(
        outcomes in prop::collection::vec((arb_outcome(), -1000i64..20_000), 1..40),
    ) {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut unit = MemoryUnit::new("owner", ItemType::Word, "apple", start);
        let mut now = start;
        let mut study_secs = 0.0;

        for (outcome, latency) in outcomes {
            let before = unit.clone();
            unit.record_review(outcome, latency, now);
            study_secs += latency.max(0) as f64 / 1000.0;

            prop_assert_eq!(unit.review_count, before.review_count + 1);
            prop_assert!(unit.consecutive_correct == 0 || unit.consecutive_wrong == 0);
            prop_assert!(unit.consecutive_correct <= unit.review_count);
            prop_assert!((0.0..=1.0).contains(&unit.retention_rate));
            let expected = retention_rate(unit.consecutive_correct, unit.review_count);
            prop_assert!((unit.retention_rate - expected).abs() < 1e-12);
            prop_assert!(unit.next_review_at > unit.last_reviewed_at);
            prop_assert!((unit.study_duration_secs - study_secs).abs() < 1e-6);

            if outcome == ReviewOutcome::Skip {
                prop_assert_eq!(unit.consecutive_correct, before.consecutive_correct);
                prop_assert_eq!(unit.consecutive_wrong, before.consecutive_wrong);
            }

            now = now + Duration::minutes(30);
        }
    }
}

#[test]
fn monotonic_escalation_from_fresh_unit() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
    let mut unit = MemoryUnit::new("owner", ItemType::Character, "水", now);
    let mut reached = Vec::new();

    for step in 1..=10u32 {
        unit.record_review(ReviewOutcome::Correct, 1000, now);
        if matches!(step, 1 | 3 | 5 | 10) {
            reached.push(unit.mastery_level);
        }
    }

    assert_eq!(
        reached,
        vec![
            MasteryLevel::Beginner,
            MasteryLevel::Familiar,
            MasteryLevel::Mastered,
            MasteryLevel::Expert,
        ]
    );
    assert_eq!(unit.next_review_at - now, Duration::hours(2016));
}
