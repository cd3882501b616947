use std::str::FromStr;

use tracing::warn;

/// Default recency window for the "unseen" partition.
pub const DEFAULT_UNSEEN_THRESHOLD_DAYS: u32 = 30;
pub const DEFAULT_MIN_UNSEEN_POOL_SIZE: usize = 10;
pub const DEFAULT_SELECTION_BUDGET_MS: u64 = 500;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryConfig {
    // =========================
    // Selection configuration
    // =========================
    /// A question counts as "seen" if the user's latest interaction with it
    /// is more recent than this many days. Older interactions fall back
    /// into the unseen partition.
    pub unseen_threshold_days: u32,

    /// When fewer unseen questions than this remain, the selector gives up
    /// on unseen-based strategies and reshuffles the whole pool.
    pub min_unseen_pool_size: usize,

    // =========================
    // Observability
    // =========================
    /// Wall-clock budget for one selection. Exceeding it logs a
    /// `performance` warning; it never aborts the call.
    pub selection_budget_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            unseen_threshold_days: DEFAULT_UNSEEN_THRESHOLD_DAYS,
            min_unseen_pool_size: DEFAULT_MIN_UNSEEN_POOL_SIZE,
            selection_budget_ms: DEFAULT_SELECTION_BUDGET_MS,
        }
    }
}

impl DeliveryConfig {
    /// Read `UNSEEN_THRESHOLD_DAYS`, `MIN_UNSEEN_POOL_SIZE` and
    /// `SELECTION_BUDGET_MS`, falling back to defaults when unset or invalid.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();

        let unseen_threshold_days = parse_or("UNSEEN_THRESHOLD_DAYS", &lookup, d.unseen_threshold_days);
        let unseen_threshold_days = if unseen_threshold_days == 0 {
            warn!("UNSEEN_THRESHOLD_DAYS must be positive; using default");
            d.unseen_threshold_days
        } else {
            unseen_threshold_days
        };

        Self {
            unseen_threshold_days,
            min_unseen_pool_size: parse_or("MIN_UNSEEN_POOL_SIZE", &lookup, d.min_unseen_pool_size),
            selection_budget_ms: parse_or("SELECTION_BUDGET_MS", &lookup, d.selection_budget_ms),
        }
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> T
where
    T: FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "invalid config value; using default");
            default
        }),
    }
}
