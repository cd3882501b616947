use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type QuestionId = i64;

/// Number of answer options every catalog question carries.
pub const OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(anyhow::anyhow!("Invalid difficulty value: {}", other)),
        }
    }
}

/// Topic tag of a question ("math", "reading", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionType(pub String);

impl QuestionType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuestionType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub difficulty: Difficulty,
    pub question_type: QuestionType,
    pub text: String,
    pub options: [String; OPTION_COUNT],
    pub correct_index: u8,
    pub explanation: String,
    pub active: bool,
}

/// One attempt by one user at one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: String,
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub time_spent_secs: u32,
    pub difficulty: Difficulty,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,

    // Optional metadata
    pub session_id: Option<String>,
    pub flagged: bool,
    pub notes: Option<String>,
}

/// Name of a question selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    UnseenPriority,
    RandomWeighted,
    SpacedRepetition,
    FallbackReshuffle,
    MistakeReview,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::UnseenPriority,
        Strategy::RandomWeighted,
        Strategy::SpacedRepetition,
        Strategy::FallbackReshuffle,
        Strategy::MistakeReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::UnseenPriority => "unseen_priority",
            Strategy::RandomWeighted => "random_weighted",
            Strategy::SpacedRepetition => "spaced_repetition",
            Strategy::FallbackReshuffle => "fallback_reshuffle",
            Strategy::MistakeReview => "mistake_review",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid strategy value: {}", s))
    }
}

/// Audit row written after each delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub user_id: String,
    pub strategy: Strategy,
    pub question_ids: Vec<QuestionId>,
    pub pool_size: usize,
    pub unseen_size: usize,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}
