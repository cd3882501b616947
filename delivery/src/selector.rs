//! Selection policy: decide which sampling strategy serves a request.
//!
//! Pure and deterministic. The same inputs always give the same strategy.

use catalog::model::Strategy;

use crate::types::{DeliveryOptions, SessionType};

/// History coverage (percent of the pool) above which spaced repetition
/// takes over from random weighting.
pub const SPACED_REPETITION_COVERAGE_PCT: f64 = 80.0;

/// Inputs the decision table looks at, besides the options themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectorInputs {
    pub pool_size: usize,
    /// Distinct questions in the user's history.
    pub history_count: usize,
    pub unseen_count: usize,
    pub min_unseen_pool_size: usize,
}

impl SelectorInputs {
    /// `history_count / pool_size * 100`, or 0 for an empty pool.
    pub fn coverage_percentage(&self) -> f64 {
        if self.pool_size == 0 {
            return 0.0;
        }
        self.history_count as f64 / self.pool_size as f64 * 100.0
    }
}

/// Pick a strategy. An explicit override in `options` wins outright;
/// otherwise the first matching rule applies:
///
///   1. review_mistakes session        -> mistake_review
///   2. unseen_only session            -> unseen_priority, or fallback_reshuffle if nothing is unseen
///   3. unseen >= limit                -> unseen_priority
///   4. unseen < min_unseen_pool_size  -> fallback_reshuffle
///   5. coverage > 80%                 -> spaced_repetition
///   6. otherwise                      -> random_weighted
pub fn choose_strategy(options: &DeliveryOptions, inputs: &SelectorInputs) -> Strategy {
    if let Some(forced) = options.strategy_override {
        return forced;
    }

    match options.session_type {
        SessionType::ReviewMistakes => return Strategy::MistakeReview,
        SessionType::UnseenOnly => {
            return if inputs.unseen_count > 0 {
                Strategy::UnseenPriority
            } else {
                Strategy::FallbackReshuffle
            };
        }
        _ => {}
    }

    if inputs.unseen_count >= options.question_limit {
        return Strategy::UnseenPriority;
    }

    if inputs.unseen_count < inputs.min_unseen_pool_size {
        return Strategy::FallbackReshuffle;
    }

    if inputs.coverage_percentage() > SPACED_REPETITION_COVERAGE_PCT {
        return Strategy::SpacedRepetition;
    }

    Strategy::RandomWeighted
}
