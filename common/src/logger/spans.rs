use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{Span, field};

use super::TraceId;

/// Create a root span for a single delivery request.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id,
        user_id = field::Empty,
        strategy = field::Empty
    )
}

/// Create a child span (inherits trace_id through the parent).
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!("child", name = %name, user_id = field::Empty)
}

/// Record the user (and optionally the chosen strategy) on the current span.
pub fn annotate_span(user_id: &str, strategy: Option<&str>) {
    let span = Span::current();
    span.record("user_id", field::display(user_id));
    if let Some(s) = strategy {
        span.record("strategy", field::display(s));
    }
}

/// Await `fut`, emitting a `performance` warning if it took longer than `max`.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = max.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
