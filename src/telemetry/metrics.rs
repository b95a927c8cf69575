//! Metric instrument factories for autocrawl.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"autocrawl"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for autocrawl instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("autocrawl")
}

/// Counter: work items dispatched to a handler.
/// Labels: `kind`.
pub fn work_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("autocrawl.work.dispatched")
        .with_description("Number of work items dispatched")
        .build()
}

/// Counter: work items whose handler finished.
/// Labels: `kind`, `result` ("succeeded" | "failed" | "deferred").
pub fn work_finished() -> Counter<u64> {
    meter()
        .u64_counter("autocrawl.work.finished")
        .with_description("Number of work items finished")
        .build()
}

/// Counter: deferred table operations (insert, select, delete).
/// Labels: `operation`, `result`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("autocrawl.queue.operations")
        .with_description("Number of deferred queue operations")
        .build()
}

/// Counter: claim attempts against drained records.
/// Labels: `result` ("claimed" | "skipped").
pub fn deferred_claims() -> Counter<u64> {
    meter()
        .u64_counter("autocrawl.queue.claims")
        .with_description("Number of deferred record claim attempts")
        .build()
}

/// Counter: repository and commit upserts.
/// Labels: `record` ("repo" | "commit").
pub fn records_persisted() -> Counter<u64> {
    meter()
        .u64_counter("autocrawl.records.persisted")
        .with_description("Number of records upserted")
        .build()
}

/// Counter: remote API requests.
/// Labels: `http.response.status_code` or `error`.
pub fn api_requests() -> Counter<u64> {
    meter()
        .u64_counter("autocrawl.api.requests")
        .with_description("Number of remote API requests")
        .build()
}

/// Counter: replacement worker launches.
/// Labels: `result` ("ok" | "error").
pub fn workers_launched() -> Counter<u64> {
    meter()
        .u64_counter("autocrawl.workers.launched")
        .with_description("Number of worker launch attempts")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("autocrawl.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
