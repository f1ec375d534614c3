//! Watch loop span helpers.

use tracing::Span;

/// Start a span covering the classification of one delta batch.
///
/// `batch.events` is declared empty and filled by [`record_batch_events`].
pub fn start_batch_span(deltas: usize) -> Span {
    tracing::info_span!(
        "watch.batch",
        "batch.deltas" = deltas,
        "batch.events" = tracing::field::Empty,
    )
}

/// Record how many events the batch produced.
pub fn record_batch_events(span: &Span, events: usize) {
    span.record("batch.events", events);
}
