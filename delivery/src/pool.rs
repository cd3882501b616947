//! Pool Resolver: the eligible question set for one request.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use catalog::model::{Difficulty, Question, QuestionId, QuestionType};
use catalog::store::{CatalogReader, QuestionFilter};
use common::logger::warn_if_slow;
use rand::Rng;
use tracing::{debug, instrument};

use crate::sampler::primitives::shuffle;

pub struct PoolResolver {
    catalog: Arc<dyn CatalogReader>,
}

impl PoolResolver {
    pub fn new(catalog: Arc<dyn CatalogReader>) -> Self {
        Self { catalog }
    }

    /// Active questions at `difficulty`, minus `exclude_ids`.
    ///
    /// One topic narrows the pool to that type. Several topics ("mixed
    /// mode") narrow to their union and then type-balance it, see
    /// [`balance_by_type`]. An empty vec means the catalog genuinely has
    /// nothing to offer; callers decide whether that is fatal.
    #[instrument(
        skip(self, topic_filter, exclude_ids, rng),
        target = "pool",
        fields(
            topics = topic_filter.map_or(0, |t| t.len()),
            excluded = exclude_ids.len()
        )
    )]
    pub async fn resolve_pool<R: Rng + Send>(
        &self,
        difficulty: Difficulty,
        topic_filter: Option<&[QuestionType]>,
        exclude_ids: &[QuestionId],
        rng: &mut R,
    ) -> Result<Vec<Question>> {
        let single_topic = match topic_filter {
            Some([only]) => Some(only),
            _ => None,
        };

        // Mixed mode fetches every type: balancing may need to fall back
        // to the unfiltered pool.
        let filter = QuestionFilter {
            type_in: single_topic.map(|t| vec![t.clone()]),
            id_not_in: exclude_ids.to_vec(),
        };

        let fetched = warn_if_slow("catalog_fetch", Duration::from_millis(200), async {
            self.catalog.fetch_questions(difficulty, &filter).await
        })
        .await
        .context("catalog reader failed")?;

        let fetched_len = fetched.len();
        let pool = sanitize(fetched, difficulty, single_topic, exclude_ids);

        let pool = match topic_filter {
            Some(topics) if topics.len() > 1 => balance_by_type(pool, topics, rng),
            _ => pool,
        };

        debug!(fetched = fetched_len, resolved = pool.len(), "pool resolved");
        Ok(pool)
    }
}

/// Re-check what the reader was asked to enforce and drop duplicate ids, so
/// a sloppy reader cannot leak wrong-difficulty or excluded questions.
fn sanitize(
    fetched: Vec<Question>,
    difficulty: Difficulty,
    single_topic: Option<&QuestionType>,
    exclude_ids: &[QuestionId],
) -> Vec<Question> {
    let excluded: HashSet<QuestionId> = exclude_ids.iter().copied().collect();
    let mut seen = HashSet::with_capacity(fetched.len());

    fetched
        .into_iter()
        .filter(|q| q.active && q.difficulty == difficulty)
        .filter(|q| single_topic.is_none_or(|t| &q.question_type == t))
        .filter(|q| !excluded.contains(&q.id))
        .filter(|q| seen.insert(q.id))
        .collect()
}

/// Type-balance `pool` across `topics`.
///
/// Among the requested types that have at least one question, find the
/// smallest count `m`; take `m` shuffled questions of each such type,
/// concatenate and shuffle. If none of the types match, the pool comes back
/// unchanged rather than empty.
pub fn balance_by_type<R: Rng>(
    pool: Vec<Question>,
    topics: &[QuestionType],
    rng: &mut R,
) -> Vec<Question> {
    let mut groups: Vec<Vec<&Question>> = topics
        .iter()
        .map(|t| pool.iter().filter(|q| &q.question_type == t).collect::<Vec<_>>())
        .filter(|g| !g.is_empty())
        .collect();

    let Some(per_type) = groups.iter().map(Vec::len).min() else {
        debug!("no requested topic matched; using unfiltered pool");
        return pool;
    };

    let mut balanced: Vec<Question> = Vec::with_capacity(per_type * groups.len());
    for group in groups.iter_mut() {
        shuffle(group, rng);
        balanced.extend(group.iter().take(per_type).map(|q| (*q).clone()));
    }

    shuffle(&mut balanced, rng);
    balanced
}
