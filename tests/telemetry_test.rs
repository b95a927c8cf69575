//! Integration tests for telemetry initialization and span helpers.

use uuid::Uuid;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // Using try_init() in the implementation avoids panics if another
    // test already initialized a subscriber.
    let config = autocrawl::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "autocrawl-test".to_string(),
        log_level: "debug".to_string(),
        worker_id: "worker-test".to_string(),
    };
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let _guard = autocrawl::telemetry::init_telemetry(config);
}

#[test]
fn work_span_creates_and_records_outcome() {
    let id = Uuid::new_v4();
    let span = autocrawl::telemetry::work::start_work_span("FetchRepo", &id);
    autocrawl::telemetry::work::record_outcome(&span, "succeeded");
}

#[test]
fn metric_instruments_build_without_a_provider() {
    use autocrawl::telemetry::metrics;
    use opentelemetry::KeyValue;

    metrics::work_dispatched().add(1, &[KeyValue::new("kind", "FetchRepo")]);
    metrics::deferred_claims().add(1, &[KeyValue::new("result", "claimed")]);
    metrics::operation_duration_ms().record(1.5, &[KeyValue::new("operation", "test")]);
}
