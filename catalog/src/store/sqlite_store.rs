//! SqliteStore
//! -----------
//! SQLite-backed implementation of the four collaborator traits. It holds
//! the question catalog, the per-user interaction log and the delivery audit
//! log, so a single database file is enough to run the delivery service end
//! to end (the CLI does exactly that).
//!
//! Timestamps are stored as unix milliseconds, matching the `*_ms` column
//! convention used across the workspace.
use std::str::FromStr;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{CatalogReader, DeliveryLogger, HistoryReader, QuestionFilter, UnseenCounter};
use crate::model::{
    DeliveryLogEntry, Difficulty, InteractionRecord, OPTION_COUNT, Question, QuestionType,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` (creating the file if needed) and ensure the schema exists.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite url '{}'", url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .context("failed to open sqlite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. A single connection, since every
    /// `:memory:` connection would otherwise see its own empty database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY,
                difficulty TEXT NOT NULL,
                question_type TEXT NOT NULL,
                text TEXT NOT NULL,
                options_json TEXT NOT NULL,
                correct_index INTEGER NOT NULL,
                explanation TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                question_id INTEGER NOT NULL,
                is_correct INTEGER NOT NULL,
                time_spent_secs INTEGER NOT NULL,
                difficulty TEXT NOT NULL,
                last_seen_at_ms INTEGER NOT NULL,
                created_at_ms INTEGER NOT NULL,
                session_id TEXT,
                flagged INTEGER NOT NULL DEFAULT 0,
                notes TEXT
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_interactions_user_difficulty
                ON interactions (user_id, difficulty, last_seen_at_ms DESC);
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delivery_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                strategy TEXT NOT NULL,
                question_ids_json TEXT NOT NULL,
                pool_size INTEGER NOT NULL,
                unseen_size INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                created_at_ms INTEGER NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or replace a catalog question.
    pub async fn upsert_question(&self, q: &Question) -> anyhow::Result<()> {
        let options_json = serde_json::to_string(&q.options)?;

        sqlx::query(
            r#"
            INSERT INTO questions (
                id, difficulty, question_type, text,
                options_json, correct_index, explanation, active
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                difficulty = excluded.difficulty,
                question_type = excluded.question_type,
                text = excluded.text,
                options_json = excluded.options_json,
                correct_index = excluded.correct_index,
                explanation = excluded.explanation,
                active = excluded.active;
        "#,
        )
        .bind(q.id)
        .bind(q.difficulty.as_str())
        .bind(q.question_type.as_str())
        .bind(&q.text)
        .bind(options_json)
        .bind(i64::from(q.correct_index))
        .bind(&q.explanation)
        .bind(q.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn record_interaction(&self, r: &InteractionRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interactions (
                user_id, question_id, is_correct, time_spent_secs, difficulty,
                last_seen_at_ms, created_at_ms, session_id, flagged, notes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
        "#,
        )
        .bind(&r.user_id)
        .bind(r.question_id)
        .bind(r.is_correct)
        .bind(i64::from(r.time_spent_secs))
        .bind(r.difficulty.as_str())
        .bind(r.last_seen_at.timestamp_millis())
        .bind(r.created_at.timestamp_millis())
        .bind(&r.session_id)
        .bind(r.flagged)
        .bind(&r.notes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent delivery log rows for a user, newest first.
    pub async fn recent_deliveries(
        &self,
        user_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<DeliveryLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, strategy, question_ids_json, pool_size,
                   unseen_size, duration_ms, created_at_ms
            FROM delivery_logs
            WHERE user_id = ?
            ORDER BY created_at_ms DESC, id DESC
            LIMIT ?;
        "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_log_entry).collect()
    }
}

fn ms_to_datetime(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {}", ms))
}

fn row_to_question(row: &SqliteRow) -> anyhow::Result<Question> {
    let difficulty_str: String = row.try_get("difficulty")?;
    let difficulty = Difficulty::from_str(&difficulty_str)?;

    let options_json: String = row.try_get("options_json")?;
    let options: Vec<String> = serde_json::from_str(&options_json)
        .map_err(|e| anyhow!("Invalid options JSON '{}': {}", options_json, e))?;
    let options: [String; OPTION_COUNT] = options.try_into().map_err(|v: Vec<String>| {
        anyhow!("expected {} options, found {}", OPTION_COUNT, v.len())
    })?;

    let correct_index: i64 = row.try_get("correct_index")?;
    let correct_index = u8::try_from(correct_index)
        .ok()
        .filter(|i| usize::from(*i) < OPTION_COUNT)
        .ok_or_else(|| anyhow!("correct_index out of range: {}", correct_index))?;

    Ok(Question {
        id: row.try_get("id")?,
        difficulty,
        question_type: QuestionType(row.try_get("question_type")?),
        text: row.try_get("text")?,
        options,
        correct_index,
        explanation: row.try_get("explanation")?,
        active: row.try_get("active")?,
    })
}

fn row_to_interaction(row: &SqliteRow) -> anyhow::Result<InteractionRecord> {
    let difficulty_str: String = row.try_get("difficulty")?;
    let time_spent: i64 = row.try_get("time_spent_secs")?;

    Ok(InteractionRecord {
        user_id: row.try_get("user_id")?,
        question_id: row.try_get("question_id")?,
        is_correct: row.try_get("is_correct")?,
        time_spent_secs: u32::try_from(time_spent).unwrap_or(u32::MAX),
        difficulty: Difficulty::from_str(&difficulty_str)?,
        last_seen_at: ms_to_datetime(row.try_get("last_seen_at_ms")?)?,
        created_at: ms_to_datetime(row.try_get("created_at_ms")?)?,
        session_id: row.try_get("session_id")?,
        flagged: row.try_get("flagged")?,
        notes: row.try_get("notes")?,
    })
}

fn row_to_log_entry(row: &SqliteRow) -> anyhow::Result<DeliveryLogEntry> {
    let strategy: String = row.try_get("strategy")?;
    let ids_json: String = row.try_get("question_ids_json")?;

    Ok(DeliveryLogEntry {
        user_id: row.try_get("user_id")?,
        strategy: strategy.parse()?,
        question_ids: serde_json::from_str(&ids_json)?,
        pool_size: row.try_get::<i64, _>("pool_size")? as usize,
        unseen_size: row.try_get::<i64, _>("unseen_size")? as usize,
        duration_ms: row.try_get::<i64, _>("duration_ms")? as u64,
        created_at: ms_to_datetime(row.try_get("created_at_ms")?)?,
    })
}

#[async_trait]
impl CatalogReader for SqliteStore {
    #[tracing::instrument(level = "debug", skip(self, filter))]
    async fn fetch_questions(
        &self,
        difficulty: Difficulty,
        filter: &QuestionFilter,
    ) -> anyhow::Result<Vec<Question>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, difficulty, question_type, text, options_json, \
             correct_index, explanation, active \
             FROM questions WHERE active = 1 AND difficulty = ",
        );
        qb.push_bind(difficulty.as_str());

        if let Some(types) = &filter.type_in {
            if types.is_empty() {
                return Ok(Vec::new());
            }
            qb.push(" AND question_type IN (");
            let mut sep = qb.separated(", ");
            for t in types {
                sep.push_bind(t.0.clone());
            }
            sep.push_unseparated(")");
        }

        if !filter.id_not_in.is_empty() {
            qb.push(" AND id NOT IN (");
            let mut sep = qb.separated(", ");
            for id in &filter.id_not_in {
                sep.push_bind(*id);
            }
            sep.push_unseparated(")");
        }

        qb.push(" ORDER BY id");

        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_question(&r) {
                Ok(q) => out.push(q),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the fetch
                    tracing::warn!(error = %e, "skipping malformed question row");
                }
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl HistoryReader for SqliteStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch_interactions(
        &self,
        user_id: &str,
        difficulty: Difficulty,
    ) -> anyhow::Result<Vec<InteractionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, question_id, is_correct, time_spent_secs, difficulty,
                   last_seen_at_ms, created_at_ms, session_id, flagged, notes
            FROM interactions
            WHERE user_id = ? AND difficulty = ?
            ORDER BY last_seen_at_ms DESC, id DESC;
        "#,
        )
        .bind(user_id)
        .bind(difficulty.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_interaction).collect()
    }
}

#[async_trait]
impl UnseenCounter for SqliteStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn count_unseen(
        &self,
        user_id: &str,
        difficulty: Difficulty,
        days_threshold: u32,
    ) -> anyhow::Result<usize> {
        let cutoff_ms = (Utc::now() - Duration::days(i64::from(days_threshold))).timestamp_millis();

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS unseen
            FROM questions q
            WHERE q.active = 1
              AND q.difficulty = ?
              AND q.id NOT IN (
                  SELECT i.question_id
                  FROM interactions i
                  WHERE i.user_id = ?
                    AND i.difficulty = ?
                    AND i.last_seen_at_ms > ?
              );
        "#,
        )
        .bind(difficulty.as_str())
        .bind(user_id)
        .bind(difficulty.as_str())
        .bind(cutoff_ms)
        .fetch_one(&self.pool)
        .await?;

        let unseen: i64 = row.try_get("unseen")?;
        Ok(unseen.max(0) as usize)
    }
}

#[async_trait]
impl DeliveryLogger for SqliteStore {
    #[tracing::instrument(level = "debug", skip_all, fields(user_id = %entry.user_id))]
    async fn append(&self, entry: &DeliveryLogEntry) -> anyhow::Result<()> {
        let ids_json = serde_json::to_string(&entry.question_ids)?;

        sqlx::query(
            r#"
            INSERT INTO delivery_logs (
                user_id, strategy, question_ids_json,
                pool_size, unseen_size, duration_ms, created_at_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?);
        "#,
        )
        .bind(&entry.user_id)
        .bind(entry.strategy.as_str())
        .bind(ids_json)
        .bind(entry.pool_size as i64)
        .bind(entry.unseen_size as i64)
        .bind(entry.duration_ms as i64)
        .bind(entry.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
