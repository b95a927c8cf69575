//! Crawl engine: work dispatch, completion signalling, capacity, refill and
//! end-of-process scaling.
//!
//! Every work item runs as its own tokio task. A handler may spawn children;
//! it does not reach cleanup until each child has emitted `{uuid}_DONE` and
//! its own audit write has emitted `{uuid}_LOGGED`. Cleanup feeds the
//! capacity gate, which either refills from the deferred queue, waits, or
//! ends the process.

pub mod autoscale;
pub mod capacity;
mod handlers;
mod scheduler;
pub mod signal;

pub use autoscale::{Shutdown, desired_new_workers};
pub use capacity::{CapacityGate, CapacityState, CleanupAction};
pub use signal::{Completion, Signal, SignalBus, wait_for_all};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use opentelemetry::KeyValue;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::audit::{ActionEntry, ActionLog};
use crate::config::Config;
use crate::db::Store;
use crate::error::Result;
use crate::fleet::{FleetLauncher, LaunchTemplate};
use crate::github::RemoteApi;
use crate::model::work::{Task, WorkItem, WorkKind};
use crate::queue::DeferredQueue;
use crate::telemetry::metrics;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// This process's slot in the shared `executing` tally.
    pub worker_id: String,
    /// Remote API base url, without a trailing slash.
    pub api_base: String,
    pub max_repos: u64,
    pub max_commits: u64,
    pub max_workers: u64,
    /// Deferred items this process may pull.
    pub quota: u64,
    pub launch: LaunchTemplate,
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_id: config.worker_id.clone(),
            api_base: config.github_api.trim_end_matches('/').to_string(),
            max_repos: config.max_repos,
            max_commits: config.max_commits,
            max_workers: config.max_workers,
            quota: config.max_computations,
            launch: LaunchTemplate::from_config(config),
        }
    }
}

/// The external systems the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub api: Arc<dyn RemoteApi>,
    pub audit: Arc<dyn ActionLog>,
    pub launcher: Arc<dyn FleetLauncher>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    store: Arc<dyn Store>,
    api: Arc<dyn RemoteApi>,
    audit: Arc<dyn ActionLog>,
    launcher: Arc<dyn FleetLauncher>,
    queue: DeferredQueue,
    bus: SignalBus,
    capacity: CapacityGate,
    ending: AtomicBool,
    shutdown: watch::Sender<Option<Shutdown>>,
}

impl Engine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let (shutdown, _) = watch::channel(None);
        let capacity = CapacityGate::new(config.quota);
        Self {
            inner: Arc::new(Inner {
                queue: DeferredQueue::new(Arc::clone(&collaborators.store)),
                store: collaborators.store,
                api: collaborators.api,
                audit: collaborators.audit,
                launcher: collaborators.launcher,
                bus: SignalBus::new(),
                capacity,
                ending: AtomicBool::new(false),
                shutdown,
                config,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn capacity(&self) -> &CapacityGate {
        &self.inner.capacity
    }

    pub fn bus(&self) -> &SignalBus {
        &self.inner.bus
    }

    /// Run as a worker process: register this worker, start the bootstrap
    /// refill, and wait for end of process.
    pub async fn run(&self) -> Result<Shutdown> {
        self.inner
            .store
            .register_worker(&self.inner.config.worker_id)
            .await?;
        info!(
            worker_id = %self.inner.config.worker_id,
            quota = self.inner.config.quota,
            "worker started"
        );

        self.start_refill();
        Ok(self.wait_for_shutdown().await)
    }

    /// Start `item` as live work.
    ///
    /// Anyone waiting on the item's done-signal must subscribe before this.
    pub fn dispatch(&self, item: WorkItem) {
        self.inner.capacity.start_work();
        metrics::work_dispatched().add(1, &[KeyValue::new("kind", item.kind().as_str())]);
        debug!(uuid = %item.uuid(), kind = %item.kind(), "dispatching work item");

        let engine = self.clone();
        tokio::spawn(async move { handlers::run(engine, item).await });
    }

    /// Wait until the end-of-process sequence has finished.
    pub async fn wait_for_shutdown(&self) -> Shutdown {
        let mut rx = self.inner.shutdown.subscribe();
        let finished = rx.wait_for(Option::is_some).await.map(|s| s.clone());
        match finished {
            Ok(Some(shutdown)) => shutdown,
            _ => Shutdown::aborted("shutdown channel closed"),
        }
    }

    /// Create a child item, subscribe to its done-signal, then dispatch it.
    fn spawn_child(&self, completion: &mut Completion, task: Task) {
        let child = WorkItem::new(task);
        completion.push(self.inner.bus.subscribe(signal::done(child.uuid())));
        self.dispatch(child);
    }

    /// Write `entry` to the audit log in the background. The returned signal
    /// fires once the write has returned, whether or not it succeeded.
    fn report(&self, entry: ActionEntry) -> Signal {
        let signal = self.inner.bus.subscribe(signal::logged(entry.uuid));
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.inner.audit.record(&entry).await {
                warn!(uuid = %entry.uuid, kind = %entry.kind, error = %e, "audit write failed");
            }
            engine.inner.bus.emit(&signal::logged(entry.uuid));
        });
        signal
    }

    /// An item finished; let the capacity gate decide what happens next.
    fn cleanup(&self) {
        let action = self.inner.capacity.on_cleanup();
        debug!(kind = %WorkKind::DoCleanup, ?action, "cleanup");
        match action {
            CleanupAction::Refill => self.spawn_refill(),
            CleanupAction::EndProcess => self.end_process(),
            CleanupAction::Wait => {}
        }
    }

    fn start_refill(&self) {
        if self.inner.capacity.begin_refill() {
            self.spawn_refill();
        }
    }

    fn spawn_refill(&self) {
        let engine = self.clone();
        tokio::spawn(async move { scheduler::refill(engine).await });
    }

    /// Start the end-of-process sequence. Only the first call has any effect.
    fn end_process(&self) {
        if self.inner.ending.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            let shutdown = autoscale::end_process(&engine).await;
            engine.inner.shutdown.send_replace(Some(shutdown));
        });
    }
}
