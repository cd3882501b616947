//! Request/response types for the delivery service.

use std::fmt;
use std::str::FromStr;

use catalog::model::{Difficulty, Question, QuestionId, QuestionType, Strategy};
use serde::{Deserialize, Serialize};

use crate::sampler::weights::WeightTable;

/// Tag stamped into every result so consumers can tell selection logic apart.
pub const ALGORITHM_VERSION: &str = "2.1.0";

/// Upper bound on `question_limit`.
pub const MAX_QUESTION_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Quick,
    Timed,
    Custom,
    ReviewMistakes,
    UnseenOnly,
    Simulation,
}

impl SessionType {
    pub const ALL: [SessionType; 6] = [
        SessionType::Quick,
        SessionType::Timed,
        SessionType::Custom,
        SessionType::ReviewMistakes,
        SessionType::UnseenOnly,
        SessionType::Simulation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Quick => "quick",
            SessionType::Timed => "timed",
            SessionType::Custom => "custom",
            SessionType::ReviewMistakes => "review_mistakes",
            SessionType::UnseenOnly => "unseen_only",
            SessionType::Simulation => "simulation",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid session type value: {}", s))
    }
}

/// A delivery request as it arrives from the service layer: loosely typed,
/// not yet validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub user_id: String,
    pub difficulty: String,
    pub session_type: String,
    pub question_limit: i64,
    #[serde(default)]
    pub topic_filter: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_ids: Option<Vec<QuestionId>>,
    #[serde(default)]
    pub strategy: Option<String>,
}

impl DeliveryRequest {
    pub fn new(
        user_id: impl Into<String>,
        difficulty: Difficulty,
        session_type: SessionType,
        question_limit: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            difficulty: difficulty.as_str().to_string(),
            session_type: session_type.as_str().to_string(),
            question_limit,
            ..Default::default()
        }
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topic_filter = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = QuestionId>) -> Self {
        self.exclude_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy.as_str().to_string());
        self
    }
}

/// A validated request. Only `validation::validate_request` builds these.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOptions {
    pub user_id: String,
    pub difficulty: Difficulty,
    pub session_type: SessionType,
    pub question_limit: usize,
    /// Deduplicated, never empty when present.
    pub topic_filter: Option<Vec<QuestionType>>,
    pub exclude_ids: Vec<QuestionId>,
    pub strategy_override: Option<Strategy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMetadata {
    pub total_pool_size: usize,
    pub unseen_pool_size: usize,
    /// Distinct questions in the user's history at this difficulty.
    pub history_size: usize,
    pub coverage_percentage: f64,
    pub algorithm_version: String,
    pub selection_time_ms: u64,
    pub weights: WeightTable,
    pub trace_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub questions: Vec<Question>,
    pub strategy: Strategy,
    pub metadata: DeliveryMetadata,
}

impl DeliveryResult {
    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.questions.iter().map(|q| q.id).collect()
    }
}

/// What the selector would do for a request, without sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPreview {
    pub strategy: Strategy,
    /// True when the caller forced the strategy.
    pub forced: bool,
    pub pool_size: usize,
    pub history_size: usize,
    pub unseen_count: usize,
    pub coverage_percentage: f64,
}
