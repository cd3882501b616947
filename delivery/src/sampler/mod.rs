//! Sampler: the five selection strategies and the primitives they share.
//!
//! Every strategy returns at most `limit` questions, never repeats one, and
//! fills up to exactly `limit` whenever the pool is big enough.

pub mod primitives;
pub mod strategies;
pub mod weights;

use catalog::model::{Question, Strategy};
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::history::HistoryIndex;
use weights::WeightTable;

/// Everything a strategy needs, borrowed from the call's snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SampleInput<'a> {
    pub pool: &'a [Question],
    pub history: &'a HistoryIndex,
    pub limit: usize,
    pub weights: WeightTable,
    pub now: DateTime<Utc>,
    pub unseen_threshold_days: u32,
}

/// Run `strategy` over `input`.
pub fn sample<R: Rng>(strategy: Strategy, input: &SampleInput<'_>, rng: &mut R) -> Vec<Question> {
    match strategy {
        Strategy::UnseenPriority => strategies::unseen_priority(input, rng),
        Strategy::RandomWeighted => strategies::random_weighted(input, rng),
        Strategy::SpacedRepetition => strategies::spaced_repetition(input, rng),
        Strategy::FallbackReshuffle => strategies::fallback_reshuffle(input, rng),
        Strategy::MistakeReview => strategies::mistake_review(input, rng),
    }
}
