#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Notify;

use catalog::model::{DeliveryLogEntry, Difficulty, InteractionRecord, Question, QuestionType};
use catalog::store::memory_store::InMemoryStore;
use catalog::store::{CatalogReader, DeliveryLogger, HistoryReader, QuestionFilter, UnseenCounter};
use delivery::DeliveryService;
use delivery::config::DeliveryConfig;

/// Wraps an `InMemoryStore`, counting calls and failing on demand.
#[derive(Default)]
pub struct SpyStore {
    pub inner: InMemoryStore,

    pub catalog_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub unseen_calls: AtomicUsize,
    pub log_calls: AtomicUsize,

    pub fail_catalog: AtomicBool,
    pub fail_history: AtomicBool,
    pub fail_unseen: AtomicBool,
    pub fail_log: AtomicBool,

    /// Signalled after every delivery-log attempt, successful or not.
    pub log_attempted: Notify,
}

impl SpyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn total_reads(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
            + self.history_calls.load(Ordering::SeqCst)
            + self.unseen_calls.load(Ordering::SeqCst)
    }

    /// Wait (bounded) for the fire-and-forget log write to happen.
    pub async fn wait_for_log(&self) {
        tokio::time::timeout(std::time::Duration::from_secs(2), self.log_attempted.notified())
            .await
            .expect("delivery log was never attempted");
    }
}

#[async_trait]
impl CatalogReader for SpyStore {
    async fn fetch_questions(
        &self,
        difficulty: Difficulty,
        filter: &QuestionFilter,
    ) -> anyhow::Result<Vec<Question>> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_catalog.load(Ordering::SeqCst) {
            anyhow::bail!("catalog offline");
        }
        self.inner.fetch_questions(difficulty, filter).await
    }
}

#[async_trait]
impl HistoryReader for SpyStore {
    async fn fetch_interactions(
        &self,
        user_id: &str,
        difficulty: Difficulty,
    ) -> anyhow::Result<Vec<InteractionRecord>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_history.load(Ordering::SeqCst) {
            anyhow::bail!("progress service unavailable");
        }
        self.inner.fetch_interactions(user_id, difficulty).await
    }
}

#[async_trait]
impl UnseenCounter for SpyStore {
    async fn count_unseen(
        &self,
        user_id: &str,
        difficulty: Difficulty,
        days_threshold: u32,
    ) -> anyhow::Result<usize> {
        self.unseen_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_unseen.load(Ordering::SeqCst) {
            anyhow::bail!("unseen counter timed out");
        }
        self.inner
            .count_unseen(user_id, difficulty, days_threshold)
            .await
    }
}

#[async_trait]
impl DeliveryLogger for SpyStore {
    async fn append(&self, entry: &DeliveryLogEntry) -> anyhow::Result<()> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        let out = if self.fail_log.load(Ordering::SeqCst) {
            Err(anyhow::anyhow!("delivery_logs table is read-only"))
        } else {
            self.inner.append(entry).await
        };
        self.log_attempted.notify_one();
        out
    }
}

pub fn service(store: Arc<SpyStore>) -> DeliveryService {
    service_with(DeliveryConfig::default(), store)
}

pub fn service_with(cfg: DeliveryConfig, store: Arc<SpyStore>) -> DeliveryService {
    DeliveryService::from_store(cfg, store)
}

pub fn question(id: i64, difficulty: Difficulty, qtype: &str) -> Question {
    Question {
        id,
        difficulty,
        question_type: QuestionType::new(qtype),
        text: format!("Question #{}", id),
        options: [
            "Option A".to_string(),
            "Option B".to_string(),
            "Option C".to_string(),
            "Option D".to_string(),
        ],
        correct_index: (id % 4) as u8,
        explanation: String::from("See the reference material."),
        active: true,
    }
}

pub fn questions(ids: std::ops::Range<i64>, difficulty: Difficulty, qtype: &str) -> Vec<Question> {
    ids.map(|id| question(id, difficulty, qtype)).collect()
}

pub fn attempt(
    user: &str,
    question_id: i64,
    difficulty: Difficulty,
    correct: bool,
    days_ago: i64,
) -> InteractionRecord {
    let at = Utc::now() - Duration::days(days_ago);
    InteractionRecord {
        user_id: user.to_string(),
        question_id,
        is_correct: correct,
        time_spent_secs: 45,
        difficulty,
        last_seen_at: at,
        created_at: at,
        session_id: Some("session-1".into()),
        flagged: false,
        notes: None,
    }
}
