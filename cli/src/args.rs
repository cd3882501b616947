use clap::Parser;

use catalog::model::{Difficulty, Strategy};
use delivery::{DeliveryRequest, SessionType};

#[derive(Debug, Parser)]
#[clap(name = "deliver", version, about = "Select a batch of questions for a user")]
pub struct Cli {
    /// SQLite database holding questions, interactions and delivery logs
    #[clap(long, env = "DATABASE_URL", default_value = "sqlite://questions.db")]
    pub database_url: String,

    #[clap(long)]
    pub user: String,

    /// easy, medium or hard
    #[clap(long, default_value = "medium")]
    pub difficulty: String,

    /// quick, timed, custom, review_mistakes, unseen_only or simulation
    #[clap(long, default_value = "quick")]
    pub session_type: String,

    #[clap(long, default_value_t = 10)]
    pub limit: i64,

    /// Restrict to a question type (repeatable)
    #[clap(long = "topic")]
    pub topics: Vec<String>,

    /// Question id to leave out (repeatable)
    #[clap(long = "exclude")]
    pub exclude: Vec<i64>,

    /// Force a strategy instead of letting the selector choose
    #[clap(long)]
    pub strategy: Option<String>,

    /// Seed the sampler for a reproducible selection
    #[clap(long)]
    pub seed: Option<u64>,

    /// Only report the strategy that would be chosen
    #[clap(long)]
    pub preview: bool,

    #[clap(long)]
    pub json_logs: bool,
}

impl Cli {
    /// Strings pass through untouched; the service validates them.
    pub fn to_request(&self) -> DeliveryRequest {
        DeliveryRequest {
            user_id: self.user.clone(),
            difficulty: self.difficulty.clone(),
            session_type: self.session_type.clone(),
            question_limit: self.limit,
            topic_filter: (!self.topics.is_empty()).then(|| self.topics.clone()),
            exclude_ids: (!self.exclude.is_empty()).then(|| self.exclude.clone()),
            strategy: self.strategy.clone(),
        }
    }
}

/// Values accepted by `--difficulty`, `--session-type` and `--strategy`.
pub fn accepted_values() -> String {
    let list = |items: Vec<&str>| items.join(", ");
    format!(
        "difficulty: {}\nsession type: {}\nstrategy: {}",
        list(Difficulty::ALL.iter().map(|d| d.as_str()).collect()),
        list(SessionType::ALL.iter().map(|t| t.as_str()).collect()),
        list(Strategy::ALL.iter().map(|s| s.as_str()).collect()),
    )
}
