//! Revision scoring pipeline
//!
//! ```text
//! dump file -> DumpReader -> SamplingPolicy::sample -> score_text -> ScoredRevision
//!                                                                        |
//!            TsvWriter <- weighted sum <- ScoringCoordinator (single writer)
//! ```

pub mod adapter;
pub mod calendar;
pub mod coordinator;
pub mod progress;
pub mod resume;
pub mod strategy;
pub mod weights;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{score_text, ScoreOutcome, ScoringError};
pub use calendar::{thresholds, Granularity, ScoreAt, START_YEAR};
pub use coordinator::{RunError, ScoringCoordinator, ScoringCoordinatorBuilder};
pub use progress::{RunStats, ScoreProgress};
pub use resume::{build_watermarks, Watermarks};
pub use strategy::{PageScores, SamplingPolicy, ScoredRevision, ScoringContext};
pub use weights::{parse_override, ClassWeights, DEFAULT_CLASS_WEIGHTS};
