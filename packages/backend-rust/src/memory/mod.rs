//! Spaced-repetition memory core
//!
//! Contains:
//! - Mastery state machine driven by consecutive correct/wrong streaks
//! - Interval scheduling from mastery level and streaks
//! - ReviewProcessor - batch review submission with per-item failure tolerance
//! - StatsAggregator - point-in-time and daily progress reports
//! - Store traits consumed by all of the above

pub mod clock;
pub mod error;
pub mod mastery;
pub mod review;
pub mod scheduling;
pub mod stats;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ItemError, ItemFailure, MemoryError, PartialBatchFailure};
pub use review::{BatchOutcome, BatchStatus, ReviewProcessor, ReviewSubmission};
pub use scheduling::calculate_next_interval;
pub use stats::{DailyBucket, MemoryStats, StatsAggregator};
pub use store::{InMemoryStore, MemoryReviewStore, MemoryUnitStore, StoreError, UnitSummary};
pub use types::{ItemType, MasteryLevel, MemoryReview, MemoryUnit, ReviewOutcome};
