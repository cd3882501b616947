use catalog::model::Question;
use rand::Rng;

use super::SampleInput;
use super::primitives::{shuffle, weighted_select};

/// Lower bound on the recency factor of a just-seen question.
const RECENCY_FLOOR: f64 = 0.1;

/// Upper bound (days) on the spaced-repetition interval for a correct answer.
const MAX_REVIEW_INTERVAL_DAYS: f64 = 30.0;

/// Bounds (days) on the interval for an incorrect answer.
const MISTAKE_INTERVAL_DAYS: (f64, f64) = (1.0, 7.0);

/// Extra priority for never-seen questions under spaced repetition.
const SPACED_UNSEEN_BOOST: f64 = 2.0;

/// Shuffle both partitions, then take `primary` before `backfill`.
fn primary_then_backfill<R: Rng>(
    mut primary: Vec<&Question>,
    mut backfill: Vec<&Question>,
    limit: usize,
    rng: &mut R,
) -> Vec<Question> {
    shuffle(&mut primary, rng);
    shuffle(&mut backfill, rng);

    primary
        .into_iter()
        .chain(backfill)
        .take(limit)
        .cloned()
        .collect()
}

/// Never seen, or not seen inside the threshold window, goes first.
pub fn unseen_priority<R: Rng>(input: &SampleInput<'_>, rng: &mut R) -> Vec<Question> {
    let (seen, unseen): (Vec<&Question>, Vec<&Question>) = input.pool.iter().partition(|q| {
        input
            .history
            .seen_within(q.id, input.unseen_threshold_days, input.now)
    });

    primary_then_backfill(unseen, seen, input.limit, rng)
}

/// Weight used by `random_weighted`.
///
/// `randomness * unseen_weight` for a never-seen question, otherwise
/// `randomness * recency * accuracy` where recency grows linearly with days
/// since last seen (capped at the threshold window, floored at 0.1) and
/// accuracy is `1 + accuracy_weight` if the last attempt was wrong.
pub fn random_weight(q: &Question, input: &SampleInput<'_>) -> f64 {
    let w = &input.weights;

    let Some(stat) = input.history.stat(q.id) else {
        return w.randomness * w.unseen_weight;
    };

    let window = f64::from(input.unseen_threshold_days.max(1));
    let days = input.history.days_since_seen(q.id, input.now).unwrap_or(0.0);
    let recency = (w.recent_weight * days.min(window) / window).max(RECENCY_FLOOR);

    let accuracy = if stat.last_correct {
        1.0
    } else {
        1.0 + w.accuracy_weight
    };

    w.randomness * recency * accuracy
}

pub fn random_weighted<R: Rng>(input: &SampleInput<'_>, rng: &mut R) -> Vec<Question> {
    let weighted: Vec<(&Question, f64)> = input
        .pool
        .iter()
        .map(|q| (q, random_weight(q, input)))
        .collect();

    weighted_select(weighted, input.limit, rng)
        .into_iter()
        .cloned()
        .collect()
}

/// Ideal gap (days) before showing a question again.
///
/// Correct: doubles every 7 elapsed days, capped at 30.
/// Incorrect: half the elapsed days, clamped to 1..=7.
pub fn optimal_interval_days(days_since_seen: f64, last_correct: bool) -> f64 {
    if last_correct {
        let blocks = (days_since_seen / 7.0).floor().clamp(0.0, 16.0);
        2f64.powf(blocks).min(MAX_REVIEW_INTERVAL_DAYS)
    } else {
        let (lo, hi) = MISTAKE_INTERVAL_DAYS;
        (days_since_seen * 0.5).clamp(lo, hi)
    }
}

/// Weight used by `spaced_repetition`.
///
/// Seen questions decay as `exp(-time_decay_weight * |days - optimal|)`;
/// mistakes get a further `1 + accuracy_weight` boost. Never-seen questions
/// take `unseen_weight * 2`.
pub fn spaced_weight(q: &Question, input: &SampleInput<'_>) -> f64 {
    let w = &input.weights;

    let Some(stat) = input.history.stat(q.id) else {
        return w.randomness * w.unseen_weight * SPACED_UNSEEN_BOOST;
    };

    let days = input.history.days_since_seen(q.id, input.now).unwrap_or(0.0);
    let optimal = optimal_interval_days(days, stat.last_correct);
    let mut weight = w.recent_weight * (-w.time_decay_weight * (days - optimal).abs()).exp();

    if !stat.last_correct {
        weight *= 1.0 + w.accuracy_weight;
    }

    w.randomness * weight
}

pub fn spaced_repetition<R: Rng>(input: &SampleInput<'_>, rng: &mut R) -> Vec<Question> {
    let weighted: Vec<(&Question, f64)> = input
        .pool
        .iter()
        .map(|q| (q, spaced_weight(q, input)))
        .collect();

    weighted_select(weighted, input.limit, rng)
        .into_iter()
        .cloned()
        .collect()
}

/// History is ignored entirely.
pub fn fallback_reshuffle<R: Rng>(input: &SampleInput<'_>, rng: &mut R) -> Vec<Question> {
    let mut all: Vec<&Question> = input.pool.iter().collect();
    shuffle(&mut all, rng);
    all.into_iter().take(input.limit).cloned().collect()
}

/// Questions the user has ever got wrong go first.
pub fn mistake_review<R: Rng>(input: &SampleInput<'_>, rng: &mut R) -> Vec<Question> {
    let (mistakes, others): (Vec<&Question>, Vec<&Question>) = input
        .pool
        .iter()
        .partition(|q| input.history.ever_incorrect(q.id));

    primary_then_backfill(mistakes, others, input.limit, rng)
}
