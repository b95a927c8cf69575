//! Logging, tracing and metrics setup.
//!
//! Every worker logs to stderr. With an OTLP collector configured, spans,
//! metrics and log records are also exported, tagged with the worker id so
//! a fleet's output can be told apart.

pub mod metrics;
pub mod work;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::error::{Error, Result};

const TRACER_NAME: &str = "autocrawl";
const WORKER_ID_ATTRIBUTE: &str = "autocrawl.worker_id";

pub struct TelemetryConfig {
    /// OTLP collector, e.g. `http://localhost:4317`. `None` logs locally only.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub worker_id: String,
}

/// Flushes and shuts down the exporters when dropped. Hold it until exit.
pub struct TelemetryGuard {
    exporters: Option<Exporters>,
}

struct Exporters {
    traces: SdkTracerProvider,
    metrics: SdkMeterProvider,
    logs: SdkLoggerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(exporters) = self.exporters.take() {
            let _ = exporters.logs.shutdown();
            let _ = exporters.metrics.shutdown();
            let _ = exporters.traces.shutdown();
        }
    }
}

/// Install the global subscriber.
///
/// Fails if an exporter cannot be built or a subscriber is already set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let Some(endpoint) = config.endpoint else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(subscriber_error)?;
        return Ok(TelemetryGuard { exporters: None });
    };

    let resource = Resource::builder()
        .with_service_name(config.service_name)
        .with_attribute(KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")))
        .with_attribute(KeyValue::new(WORKER_ID_ATTRIBUTE, config.worker_id))
        .build();
    let exporters = Exporters::build(&endpoint, resource)?;

    opentelemetry::global::set_meter_provider(exporters.metrics.clone());
    let span_layer =
        tracing_opentelemetry::layer().with_tracer(exporters.traces.tracer(TRACER_NAME));
    let log_layer =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&exporters.logs);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(span_layer)
        .with(log_layer)
        .try_init()
        .map_err(subscriber_error)?;

    Ok(TelemetryGuard {
        exporters: Some(exporters),
    })
}

impl Exporters {
    fn build(endpoint: &str, resource: Resource) -> Result<Self> {
        let spans = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", e))?;
        let metrics = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", e))?;
        let logs = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", e))?;

        Ok(Self {
            traces: SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            metrics: SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            logs: SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        })
    }
}

fn exporter_error(signal: &str, err: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to create OTLP {signal} exporter: {err}"))
}

fn subscriber_error(err: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to init tracing subscriber: {err}"))
}
