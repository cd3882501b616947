//! Per-strategy weight tables.

use catalog::model::Strategy;
use serde::{Deserialize, Serialize};

/// Named weighting constants attached to a strategy and echoed back in
/// result metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    /// Weight given to a question the user has never seen.
    pub unseen_weight: f64,
    /// Scale applied to the recency factor of a seen question.
    pub recent_weight: f64,
    /// Extra multiplier for questions last answered incorrectly
    /// (applied as `1 + accuracy_weight`).
    pub accuracy_weight: f64,
    /// Decay rate for spaced repetition: `exp(-time_decay_weight * |Δdays|)`.
    pub time_decay_weight: f64,
    /// Base multiplier applied to every weight.
    pub randomness: f64,
}

pub const UNSEEN_PRIORITY_WEIGHTS: WeightTable = WeightTable {
    unseen_weight: 1.0,
    recent_weight: 0.0,
    accuracy_weight: 0.0,
    time_decay_weight: 0.0,
    randomness: 1.0,
};

pub const RANDOM_WEIGHTED_WEIGHTS: WeightTable = WeightTable {
    unseen_weight: 3.0,
    recent_weight: 1.0,
    accuracy_weight: 0.5,
    time_decay_weight: 0.0,
    randomness: 1.0,
};

pub const SPACED_REPETITION_WEIGHTS: WeightTable = WeightTable {
    unseen_weight: 5.0,
    recent_weight: 1.0,
    accuracy_weight: 1.0,
    time_decay_weight: 0.1,
    randomness: 1.0,
};

pub const FALLBACK_RESHUFFLE_WEIGHTS: WeightTable = WeightTable {
    unseen_weight: 0.0,
    recent_weight: 0.0,
    accuracy_weight: 0.0,
    time_decay_weight: 0.0,
    randomness: 1.0,
};

pub const MISTAKE_REVIEW_WEIGHTS: WeightTable = WeightTable {
    unseen_weight: 0.0,
    recent_weight: 0.0,
    accuracy_weight: 1.0,
    time_decay_weight: 0.0,
    randomness: 1.0,
};

impl WeightTable {
    pub fn for_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::UnseenPriority => UNSEEN_PRIORITY_WEIGHTS,
            Strategy::RandomWeighted => RANDOM_WEIGHTED_WEIGHTS,
            Strategy::SpacedRepetition => SPACED_REPETITION_WEIGHTS,
            Strategy::FallbackReshuffle => FALLBACK_RESHUFFLE_WEIGHTS,
            Strategy::MistakeReview => MISTAKE_REVIEW_WEIGHTS,
        }
    }
}
