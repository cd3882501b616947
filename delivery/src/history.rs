//! History Aggregator: a user's past interactions at one difficulty, plus
//! the per-question recency/accuracy view the samplers work from.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use catalog::model::{Difficulty, InteractionRecord, QuestionId};
use catalog::store::HistoryReader;
use chrono::{DateTime, Utc};
use common::logger::warn_if_slow;
use tracing::{debug, instrument};

pub struct HistoryAggregator {
    reader: Arc<dyn HistoryReader>,
}

impl HistoryAggregator {
    pub fn new(reader: Arc<dyn HistoryReader>) -> Self {
        Self { reader }
    }

    /// Interactions for `user_id` at `difficulty`, most recent first.
    ///
    /// A user with no history gets an empty vec, not an error.
    #[instrument(skip(self), target = "history")]
    pub async fn get_history(
        &self,
        user_id: &str,
        difficulty: Difficulty,
    ) -> Result<Vec<InteractionRecord>> {
        let mut rows = warn_if_slow("history_fetch", Duration::from_millis(150), async {
            self.reader.fetch_interactions(user_id, difficulty).await
        })
        .await
        .context("history reader failed")?;

        // Stable: ties keep the reader's order.
        rows.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));

        debug!(records = rows.len(), "history loaded");
        Ok(rows)
    }
}

/// Latest known state of one question for one user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionStat {
    pub last_seen_at: DateTime<Utc>,
    /// Outcome of the most recent attempt.
    pub last_correct: bool,
}

/// Per-question view over a history snapshot.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
    latest: HashMap<QuestionId, QuestionStat>,
    ever_incorrect: HashSet<QuestionId>,
}

impl HistoryIndex {
    pub fn from_records(records: &[InteractionRecord]) -> Self {
        let mut latest: HashMap<QuestionId, QuestionStat> = HashMap::new();
        let mut ever_incorrect = HashSet::new();

        for r in records {
            if !r.is_correct {
                ever_incorrect.insert(r.question_id);
            }

            latest
                .entry(r.question_id)
                .and_modify(|stat| {
                    if r.last_seen_at > stat.last_seen_at {
                        stat.last_seen_at = r.last_seen_at;
                        stat.last_correct = r.is_correct;
                    }
                })
                .or_insert(QuestionStat {
                    last_seen_at: r.last_seen_at,
                    last_correct: r.is_correct,
                });
        }

        Self {
            latest,
            ever_incorrect,
        }
    }

    /// Number of distinct questions the user has interacted with.
    pub fn distinct_questions(&self) -> usize {
        self.latest.len()
    }

    pub fn stat(&self, id: QuestionId) -> Option<&QuestionStat> {
        self.latest.get(&id)
    }

    pub fn days_since_seen(&self, id: QuestionId, now: DateTime<Utc>) -> Option<f64> {
        self.latest.get(&id).map(|s| {
            let secs = (now - s.last_seen_at).num_seconds().max(0) as f64;
            secs / 86_400.0
        })
    }

    /// True if the latest interaction is strictly newer than `now - days`.
    pub fn seen_within(&self, id: QuestionId, days: u32, now: DateTime<Utc>) -> bool {
        let cutoff = now - chrono::Duration::days(i64::from(days));
        self.latest
            .get(&id)
            .is_some_and(|s| s.last_seen_at > cutoff)
    }

    /// Answered incorrectly at least once.
    pub fn ever_incorrect(&self, id: QuestionId) -> bool {
        self.ever_incorrect.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    fn rec(qid: QuestionId, correct: bool, at: DateTime<Utc>) -> InteractionRecord {
        InteractionRecord {
            user_id: "u".into(),
            question_id: qid,
            is_correct: correct,
            time_spent_secs: 12,
            difficulty: Difficulty::Medium,
            last_seen_at: at,
            created_at: at,
            session_id: None,
            flagged: false,
            notes: None,
        }
    }

    struct UnorderedReader(Vec<InteractionRecord>);

    #[async_trait]
    impl HistoryReader for UnorderedReader {
        async fn fetch_interactions(
            &self,
            _: &str,
            _: Difficulty,
        ) -> anyhow::Result<Vec<InteractionRecord>> {
            Ok(self.0.clone())
        }
    }

    struct FailingReader;

    #[async_trait]
    impl HistoryReader for FailingReader {
        async fn fetch_interactions(
            &self,
            _: &str,
            _: Difficulty,
        ) -> anyhow::Result<Vec<InteractionRecord>> {
            Err(anyhow::anyhow!("Database Offline"))
        }
    }

    #[tokio::test]
    async fn get_history_orders_most_recent_first() {
        let now = Utc::now();
        let reader = UnorderedReader(vec![
            rec(1, true, now - ChronoDuration::days(9)),
            rec(2, true, now - ChronoDuration::days(1)),
            rec(3, false, now - ChronoDuration::days(4)),
        ]);

        let agg = HistoryAggregator::new(Arc::new(reader));
        let rows = agg.get_history("u", Difficulty::Medium).await.unwrap();

        let ids: Vec<_> = rows.iter().map(|r| r.question_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn get_history_propagates_reader_errors() {
        let agg = HistoryAggregator::new(Arc::new(FailingReader));
        let err = agg.get_history("u", Difficulty::Easy).await.unwrap_err();

        let chain = format!("{:?}", err);
        assert!(chain.contains("Database Offline"), "got: {}", chain);
    }

    #[test]
    fn index_tracks_latest_attempt_and_mistakes() {
        let now = Utc::now();
        let records = vec![
            rec(1, true, now - ChronoDuration::days(1)),
            rec(1, false, now - ChronoDuration::days(5)),
            rec(2, false, now - ChronoDuration::days(2)),
        ];

        let idx = HistoryIndex::from_records(&records);

        assert_eq!(idx.distinct_questions(), 2);
        assert!(idx.stat(1).unwrap().last_correct);
        assert!(idx.ever_incorrect(1));
        assert!(!idx.stat(2).unwrap().last_correct);
        assert!(!idx.ever_incorrect(3));
    }

    #[test]
    fn seen_within_uses_strict_window() {
        let now = Utc::now();
        let records = vec![
            rec(31, true, now - ChronoDuration::days(31)),
            rec(29, true, now - ChronoDuration::days(29)),
        ];
        let idx = HistoryIndex::from_records(&records);

        assert!(!idx.seen_within(31, 30, now));
        assert!(idx.seen_within(29, 30, now));
        assert!(!idx.seen_within(404, 30, now));

        let d = idx.days_since_seen(29, now).unwrap();
        assert!((d - 29.0).abs() < 1e-6);
    }
}
