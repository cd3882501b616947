//! The delivery engine.
//!
//! For each request it:
//!   1. Validates the request (no IO on failure).
//!   2. Resolves the eligible pool via `pool`.
//!   3. Loads history and the unseen count concurrently.
//!   4. Uses `selector` to pick a strategy (unless the caller forced one).
//!   5. Runs the `sampler`.
//!   6. Fires a delivery-log write without waiting for it.
//!
//! The engine holds no per-user state. Each call works on its own snapshot
//! and its own RNG, so concurrent calls need no coordination. Dropping the
//! returned future cancels the call; wrap it in `tokio::time::timeout` to
//! bound it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use catalog::model::{DeliveryLogEntry, Question};
use catalog::store::{CatalogReader, DeliveryLogger, HistoryReader, UnseenCounter};
use chrono::Utc;
use common::logger::{TraceId, annotate_span, child_span, root_span};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::config::DeliveryConfig;
use crate::error::DeliveryError;
use crate::history::{HistoryAggregator, HistoryIndex};
use crate::pool::PoolResolver;
use crate::sampler::weights::WeightTable;
use crate::sampler::{self, SampleInput};
use crate::selector::{SelectorInputs, choose_strategy};
use crate::types::{
    ALGORITHM_VERSION, DeliveryMetadata, DeliveryOptions, DeliveryRequest, DeliveryResult,
    StrategyPreview,
};
use crate::validation::validate_request;

pub struct DeliveryService {
    cfg: DeliveryConfig,
    pool: PoolResolver,
    history: HistoryAggregator,
    unseen: Arc<dyn UnseenCounter>,
    logger: Arc<dyn DeliveryLogger>,
}

/// Pool, history and unseen count for one request.
struct Snapshot {
    pool: Vec<Question>,
    history: HistoryIndex,
    unseen_count: usize,
}

impl DeliveryService {
    pub fn new(
        cfg: DeliveryConfig,
        catalog: Arc<dyn CatalogReader>,
        history: Arc<dyn HistoryReader>,
        unseen: Arc<dyn UnseenCounter>,
        logger: Arc<dyn DeliveryLogger>,
    ) -> Self {
        Self {
            cfg,
            pool: PoolResolver::new(catalog),
            history: HistoryAggregator::new(history),
            unseen,
            logger,
        }
    }

    /// Build a service whose four collaborators are all `store`.
    pub fn from_store<S>(cfg: DeliveryConfig, store: Arc<S>) -> Self
    where
        S: CatalogReader + HistoryReader + UnseenCounter + DeliveryLogger + 'static,
    {
        Self::new(cfg, store.clone(), store.clone(), store.clone(), store)
    }

    /// Select questions for `req` using a freshly seeded RNG.
    pub async fn deliver(&self, req: &DeliveryRequest) -> Result<DeliveryResult, DeliveryError> {
        let (result, _log) = self.deliver_with_rng(req, StdRng::from_entropy()).await?;
        Ok(result)
    }

    /// Same as [`deliver`](Self::deliver) but reproducible: the same seed,
    /// request and collaborator data give the same questions in the same
    /// order.
    pub async fn deliver_seeded(
        &self,
        req: &DeliveryRequest,
        seed: u64,
    ) -> Result<DeliveryResult, DeliveryError> {
        let (result, _log) = self.deliver_with_rng(req, StdRng::seed_from_u64(seed)).await?;
        Ok(result)
    }

    /// Like [`deliver`](Self::deliver) (or [`deliver_seeded`](Self::deliver_seeded)
    /// when `seed` is set), but also hands back the background delivery-log
    /// write so a short-lived caller can wait for it before exiting.
    pub async fn deliver_with_log_handle(
        &self,
        req: &DeliveryRequest,
        seed: Option<u64>,
    ) -> Result<(DeliveryResult, JoinHandle<()>), DeliveryError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.deliver_with_rng(req, rng).await
    }

    async fn deliver_with_rng(
        &self,
        req: &DeliveryRequest,
        mut rng: StdRng,
    ) -> Result<(DeliveryResult, JoinHandle<()>), DeliveryError> {
        let trace_id = TraceId::new();
        let span = root_span("deliver", &trace_id);

        self.run(req, &mut rng, trace_id).instrument(span).await
    }

    async fn run(
        &self,
        req: &DeliveryRequest,
        rng: &mut StdRng,
        trace_id: TraceId,
    ) -> Result<(DeliveryResult, JoinHandle<()>), DeliveryError> {
        let opts = validate_request(req).inspect_err(|e| debug!(error = %e, "rejected request"))?;
        annotate_span(&opts.user_id, None);

        let started = Instant::now();

        let snap = self.snapshot(&opts, rng).await?;
        let inputs = self.selector_inputs(&snap);
        let strategy = choose_strategy(&opts, &inputs);
        annotate_span(&opts.user_id, Some(strategy.as_str()));

        let weights = WeightTable::for_strategy(strategy);
        let questions = {
            let _sample = child_span("sample").entered();
            let input = SampleInput {
                pool: &snap.pool,
                history: &snap.history,
                limit: opts.question_limit,
                weights,
                now: Utc::now(),
                unseen_threshold_days: self.cfg.unseen_threshold_days,
            };
            sampler::sample(strategy, &input, rng)
        };

        let elapsed = started.elapsed();
        let selection_time_ms = elapsed.as_millis() as u64;

        if elapsed > Duration::from_millis(self.cfg.selection_budget_ms) {
            warn!(
                target: "performance",
                elapsed_ms = selection_time_ms,
                budget_ms = self.cfg.selection_budget_ms,
                pool_size = snap.pool.len(),
                "question selection exceeded budget"
            );
        }

        if questions.len() < opts.question_limit {
            debug!(
                requested = opts.question_limit,
                delivered = questions.len(),
                "pool smaller than requested limit"
            );
        }

        let result = DeliveryResult {
            questions,
            strategy,
            metadata: DeliveryMetadata {
                total_pool_size: snap.pool.len(),
                unseen_pool_size: snap.unseen_count,
                history_size: snap.history.distinct_questions(),
                coverage_percentage: inputs.coverage_percentage(),
                algorithm_version: ALGORITHM_VERSION.to_string(),
                selection_time_ms,
                weights,
                trace_id: trace_id.to_string(),
            },
        };

        let log = self.spawn_delivery_log(&opts, &result);

        info!(
            strategy = %strategy,
            delivered = result.questions.len(),
            pool_size = result.metadata.total_pool_size,
            unseen = result.metadata.unseen_pool_size,
            elapsed_ms = selection_time_ms,
            "questions delivered"
        );

        Ok((result, log))
    }

    /// Report which strategy `req` would get, without sampling or logging.
    pub async fn preview_strategy(
        &self,
        req: &DeliveryRequest,
    ) -> Result<StrategyPreview, DeliveryError> {
        let opts = validate_request(req)?;
        let mut rng = StdRng::from_entropy();

        let snap = self.snapshot(&opts, &mut rng).await?;
        let inputs = self.selector_inputs(&snap);

        Ok(StrategyPreview {
            strategy: choose_strategy(&opts, &inputs),
            forced: opts.strategy_override.is_some(),
            pool_size: inputs.pool_size,
            history_size: inputs.history_count,
            unseen_count: inputs.unseen_count,
            coverage_percentage: inputs.coverage_percentage(),
        })
    }

    /// Steps 2 and 3: pool first (an empty pool is fatal before anything
    /// else is read), then history and unseen count concurrently.
    async fn snapshot(
        &self,
        opts: &DeliveryOptions,
        rng: &mut StdRng,
    ) -> Result<Snapshot, DeliveryError> {
        let pool = self
            .pool
            .resolve_pool(
                opts.difficulty,
                opts.topic_filter.as_deref(),
                &opts.exclude_ids,
                rng,
            )
            .await
            .map_err(|e| DeliveryError::upstream("fetch_questions", e))?;

        if pool.is_empty() {
            warn!(difficulty = %opts.difficulty, "no eligible questions");
            return Err(DeliveryError::InsufficientPool {
                difficulty: opts.difficulty,
            });
        }

        let history_fut = async {
            self.history
                .get_history(&opts.user_id, opts.difficulty)
                .await
                .map_err(|e| DeliveryError::upstream("fetch_interactions", e))
        };
        let unseen_fut = async {
            self.unseen
                .count_unseen(&opts.user_id, opts.difficulty, self.cfg.unseen_threshold_days)
                .await
                .map_err(|e| DeliveryError::upstream("count_unseen", e))
        };

        let (records, unseen_count) = futures::try_join!(history_fut, unseen_fut)?;

        debug!(
            pool_size = pool.len(),
            history_records = records.len(),
            unseen_count,
            "snapshot loaded"
        );

        Ok(Snapshot {
            pool,
            history: HistoryIndex::from_records(&records),
            unseen_count,
        })
    }

    fn selector_inputs(&self, snap: &Snapshot) -> SelectorInputs {
        SelectorInputs {
            pool_size: snap.pool.len(),
            history_count: snap.history.distinct_questions(),
            unseen_count: snap.unseen_count,
            min_unseen_pool_size: self.cfg.min_unseen_pool_size,
        }
    }

    /// Fire-and-forget. A failed write is logged and otherwise ignored.
    fn spawn_delivery_log(
        &self,
        opts: &DeliveryOptions,
        result: &DeliveryResult,
    ) -> JoinHandle<()> {
        let entry = DeliveryLogEntry {
            user_id: opts.user_id.clone(),
            strategy: result.strategy,
            question_ids: result.question_ids(),
            pool_size: result.metadata.total_pool_size,
            unseen_size: result.metadata.unseen_pool_size,
            duration_ms: result.metadata.selection_time_ms,
            created_at: Utc::now(),
        };

        let logger = Arc::clone(&self.logger);
        tokio::spawn(
            async move {
                if let Err(e) = logger.append(&entry).await {
                    warn!(
                        error = %e,
                        user_id = %entry.user_id,
                        strategy = %entry.strategy,
                        "failed to write delivery log; ignoring"
                    );
                }
            }
            .in_current_span(),
        )
    }
}

