use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use super::{CatalogReader, DeliveryLogger, HistoryReader, QuestionFilter, UnseenCounter};
use crate::model::{DeliveryLogEntry, Difficulty, InteractionRecord, Question};

/// In-process store backing all four collaborator traits.
///
/// Cloning shares the underlying data, so a test can keep a handle and
/// inspect what the service appended.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    questions: Arc<Mutex<Vec<Question>>>,
    interactions: Arc<Mutex<Vec<InteractionRecord>>>,
    delivery_log: Arc<Mutex<Vec<DeliveryLogEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_questions(&self, questions: impl IntoIterator<Item = Question>) {
        self.questions.lock().await.extend(questions);
    }

    pub async fn record_interaction(&self, record: InteractionRecord) {
        self.interactions.lock().await.push(record);
    }

    /// Snapshot of everything appended through `DeliveryLogger`.
    pub async fn delivery_log(&self) -> Vec<DeliveryLogEntry> {
        self.delivery_log.lock().await.clone()
    }
}

#[async_trait]
impl CatalogReader for InMemoryStore {
    async fn fetch_questions(
        &self,
        difficulty: Difficulty,
        filter: &QuestionFilter,
    ) -> anyhow::Result<Vec<Question>> {
        let guard = self.questions.lock().await;
        Ok(guard
            .iter()
            .filter(|q| q.active && q.difficulty == difficulty && filter.matches(q))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HistoryReader for InMemoryStore {
    async fn fetch_interactions(
        &self,
        user_id: &str,
        difficulty: Difficulty,
    ) -> anyhow::Result<Vec<InteractionRecord>> {
        let mut rows: Vec<InteractionRecord> = self
            .interactions
            .lock()
            .await
            .iter()
            .filter(|r| r.user_id == user_id && r.difficulty == difficulty)
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(rows)
    }
}

#[async_trait]
impl UnseenCounter for InMemoryStore {
    async fn count_unseen(
        &self,
        user_id: &str,
        difficulty: Difficulty,
        days_threshold: u32,
    ) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_threshold));

        let recently_seen: HashSet<_> = self
            .interactions
            .lock()
            .await
            .iter()
            .filter(|r| r.user_id == user_id && r.difficulty == difficulty)
            .filter(|r| r.last_seen_at > cutoff)
            .map(|r| r.question_id)
            .collect();

        let guard = self.questions.lock().await;
        Ok(guard
            .iter()
            .filter(|q| q.active && q.difficulty == difficulty)
            .filter(|q| !recently_seen.contains(&q.id))
            .count())
    }
}

#[async_trait]
impl DeliveryLogger for InMemoryStore {
    async fn append(&self, entry: &DeliveryLogEntry) -> anyhow::Result<()> {
        self.delivery_log.lock().await.push(entry.clone());
        Ok(())
    }
}
