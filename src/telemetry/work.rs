//! Work execution span helpers.
//!
//! Provides span creation and outcome recording for work items flowing
//! through the engine.

use tracing::Span;
use uuid::Uuid;

/// Start a span for work item execution.
///
/// The `work.outcome` field is declared empty and can be filled via
/// [`record_outcome`].
pub fn start_work_span(kind: &str, work_id: &Uuid) -> Span {
    tracing::info_span!(
        "work.execute",
        "work.kind" = kind,
        "work.id" = %work_id,
        "work.outcome" = tracing::field::Empty,
    )
}

/// Record a work item's reported outcome on its span.
///
/// Emits a tracing `info` event scoped to the given span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("work.outcome", outcome);
    span.in_scope(|| {
        tracing::info!(outcome = outcome, "work_outcome");
    });
}
