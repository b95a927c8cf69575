//! End of process: hand the remaining backlog to freshly launched workers.

use opentelemetry::KeyValue;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use super::Engine;
use crate::error::Result;
use crate::model::work::WorkKind;
use crate::telemetry::metrics;
use crate::telemetry::work::{record_outcome, start_work_span};

/// Most workers launched by a single decision.
pub const MAX_LAUNCH_BURST: u64 = 2;

/// How many workers to launch when this process exits.
///
/// With no backlog nothing is launched. With the fleet already at or over
/// `max_workers` a single replacement is launched, keeping the fleet size
/// steady as this worker leaves. Otherwise the fleet grows by this worker's
/// replacement plus the free slots, up to [`MAX_LAUNCH_BURST`].
pub fn desired_new_workers(unfulfilled: u64, executing: u64, max_workers: u64) -> u64 {
    if unfulfilled == 0 {
        return 0;
    }
    if executing >= max_workers {
        return 1;
    }
    (1 + (max_workers - executing)).min(MAX_LAUNCH_BURST)
}

/// Result of the end-of-process sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shutdown {
    pub requested: u64,
    pub launched: u64,
    pub error: Option<String>,
}

impl Shutdown {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

pub(super) async fn end_process(engine: &Engine) -> Shutdown {
    let span = start_work_span(WorkKind::EndProcess.as_str(), &Uuid::new_v4());

    async {
        let mut shutdown = Shutdown::default();
        if let Err(e) = scale(engine, &mut shutdown).await {
            error!(
                requested = shutdown.requested,
                launched = shutdown.launched,
                error = %e,
                "end of process failed"
            );
            shutdown.error = Some(e.to_string());
        }

        engine.inner.store.close().await;
        record_outcome(
            &tracing::Span::current(),
            if shutdown.is_clean() { "succeeded" } else { "failed" },
        );
        info!(
            requested = shutdown.requested,
            launched = shutdown.launched,
            "process ended"
        );
        shutdown
    }
    .instrument(span)
    .await
}

/// Progress is recorded in `shutdown` as it happens, so a failure part way
/// through still reports what was launched.
async fn scale(engine: &Engine, shutdown: &mut Shutdown) -> Result<()> {
    let store = &engine.inner.store;
    let config = &engine.inner.config;

    let unfulfilled = store.unfulfilled().await?;
    store.deregister_worker(&config.worker_id).await?;
    let executing = store.executing().await?;

    let requested = desired_new_workers(
        u64::try_from(unfulfilled).unwrap_or(0),
        u64::try_from(executing).unwrap_or(0),
        config.max_workers,
    );
    info!(unfulfilled, executing, requested, "scaling decision");

    let env = config.launch.env();
    shutdown.requested = requested;

    for _ in 0..requested {
        let worker_id = Uuid::new_v4().to_string();
        let spec = config.launch.spec_for(&worker_id);

        if let Err(e) = engine.inner.launcher.launch(&spec, &env).await {
            metrics::workers_launched().add(1, &[KeyValue::new("result", "error")]);
            warn!(worker_id, error = %e, "worker launch failed");
            shutdown.error = Some(e.to_string());
            break;
        }

        metrics::workers_launched().add(1, &[KeyValue::new("result", "ok")]);
        store.register_worker(&worker_id).await?;
        shutdown.launched += 1;
        info!(worker_id, "worker launched");
    }

    Ok(())
}
