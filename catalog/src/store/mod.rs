//! Collaborator interfaces the delivery core reads from (and appends to).
//!
//! Implementations own transport and storage. Errors are returned as-is;
//! retrying is the implementation's business, not the caller's.

pub mod memory_store;
pub mod sqlite_store;

use async_trait::async_trait;

use crate::model::{DeliveryLogEntry, Difficulty, InteractionRecord, Question, QuestionId, QuestionType};

/// Optional narrowing applied by a catalog reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionFilter {
    /// Only questions whose type is in this list. `None` = any type.
    pub type_in: Option<Vec<QuestionType>>,
    /// Questions to leave out.
    pub id_not_in: Vec<QuestionId>,
}

impl QuestionFilter {
    pub fn matches(&self, q: &Question) -> bool {
        let type_ok = match &self.type_in {
            Some(types) => types.contains(&q.question_type),
            None => true,
        };
        type_ok && !self.id_not_in.contains(&q.id)
    }
}

#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// All active questions at `difficulty` passing `filter`.
    async fn fetch_questions(
        &self,
        difficulty: Difficulty,
        filter: &QuestionFilter,
    ) -> anyhow::Result<Vec<Question>>;
}

#[async_trait]
pub trait HistoryReader: Send + Sync {
    /// A user's interactions at `difficulty`, most recent first.
    async fn fetch_interactions(
        &self,
        user_id: &str,
        difficulty: Difficulty,
    ) -> anyhow::Result<Vec<InteractionRecord>>;
}

#[async_trait]
pub trait UnseenCounter: Send + Sync {
    /// Active questions at `difficulty` the user has not seen in the last
    /// `days_threshold` days.
    async fn count_unseen(
        &self,
        user_id: &str,
        difficulty: Difficulty,
        days_threshold: u32,
    ) -> anyhow::Result<usize>;
}

#[async_trait]
pub trait DeliveryLogger: Send + Sync {
    async fn append(&self, entry: &DeliveryLogEntry) -> anyhow::Result<()>;
}
