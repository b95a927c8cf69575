//! Shared fakes and builders for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autocrawl::audit::{ActionEntry, ActionLog, ActionStatus};
use autocrawl::config::FleetConfig;
use autocrawl::db::Store;
use autocrawl::db::memory::MemoryStore;
use autocrawl::engine::{Collaborators, Engine, EngineConfig};
use autocrawl::error::{Error, Result};
use autocrawl::fleet::{FleetLauncher, LaunchEnv, LaunchSpec, LaunchTemplate};
use autocrawl::github::{ApiResponse, RemoteApi};
use autocrawl::model::record::{CommitRecord, RepoRecord};
use autocrawl::model::work::{DeferredRecord, NewDeferred, WorkKind};
use serde_json::Value;
use tokio::sync::Semaphore;

pub const API: &str = "https://api.test";

// ---------------------------------------------------------------------------
// Remote API
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Route {
    Respond(ApiResponse),
    NameResolution,
    Held(Arc<Semaphore>, ApiResponse),
}

/// Scripted remote API. Unrouted urls answer 404.
#[derive(Default)]
pub struct FakeApi {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, path: &str, response: ApiResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{API}{path}"), Route::Respond(response));
    }

    pub fn route_json(&self, path: &str, body: Value) {
        self.route(path, ApiResponse::new(body));
    }

    /// Fail `path` with a DNS lookup error.
    pub fn fail_dns(&self, path: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{API}{path}"), Route::NameResolution);
    }

    /// Answer `path` only once the returned semaphore gets a permit.
    pub fn hold(&self, path: &str, response: ApiResponse) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.routes.lock().unwrap().insert(
            format!("{API}{path}"),
            Route::Held(Arc::clone(&gate), response),
        );
        gate
    }

    /// Requested urls with the base stripped, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|url| url.trim_start_matches(API).to_string())
            .collect()
    }

    pub fn requested(&self, path: &str) -> bool {
        self.requests().iter().any(|r| r == path)
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn get(&self, url: &str) -> Result<ApiResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        let route = self.routes.lock().unwrap().get(url).cloned();
        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::NameResolution) => Err(Error::NameResolution(format!(
                "{url}: dns error: Temporary failure in name resolution"
            ))),
            Some(Route::Held(gate, response)) => {
                let _permit = gate.acquire().await.unwrap();
                Ok(response)
            }
            None => Err(Error::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Fleet launcher
// ---------------------------------------------------------------------------

/// Records launch requests. Fails every launch after the first `succeed`.
#[derive(Default)]
pub struct RecordingLauncher {
    launches: Mutex<Vec<LaunchSpec>>,
    succeed: Option<usize>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(succeed: usize) -> Self {
        Self {
            succeed: Some(succeed),
            ..Self::default()
        }
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().unwrap().clone()
    }
}

#[async_trait]
impl FleetLauncher for RecordingLauncher {
    async fn launch(&self, spec: &LaunchSpec, _env: &LaunchEnv) -> Result<()> {
        let mut launches = self.launches.lock().unwrap();
        if self.succeed.is_some_and(|n| launches.len() >= n) {
            return Err(Error::Launch("capacity not available".into()));
        }
        launches.push(spec.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// Audit log whose writes block until released.
pub struct GatedLog {
    inner: Arc<MemoryStore>,
    gate: Semaphore,
}

impl GatedLog {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
        }
    }

    pub fn release(&self, writes: usize) {
        self.gate.add_permits(writes);
    }
}

#[async_trait]
impl ActionLog for GatedLog {
    async fn record(&self, entry: &ActionEntry) -> Result<()> {
        self.gate.acquire().await.unwrap().forget();
        self.inner.record(entry).await
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Yields to the scheduler around deferred-queue calls so concurrent
/// drainers interleave between select and delete.
pub struct YieldingStore(pub Arc<MemoryStore>);

#[async_trait]
impl Store for YieldingStore {
    async fn upsert_repo(&self, repo: &RepoRecord) -> Result<()> {
        self.0.upsert_repo(repo).await
    }

    async fn upsert_commit(&self, commit: &CommitRecord) -> Result<()> {
        self.0.upsert_commit(commit).await
    }

    async fn insert_deferred(&self, new: &NewDeferred) -> Result<bool> {
        self.0.insert_deferred(new).await
    }

    async fn select_deferred(&self, limit: u64) -> Result<Vec<DeferredRecord>> {
        let records = self.0.select_deferred(limit).await;
        tokio::task::yield_now().await;
        records
    }

    async fn delete_deferred(&self, id: i64) -> Result<u64> {
        tokio::task::yield_now().await;
        self.0.delete_deferred(id).await
    }

    async fn unfulfilled(&self) -> Result<i64> {
        self.0.unfulfilled().await
    }

    async fn executing(&self) -> Result<i64> {
        self.0.executing().await
    }

    async fn register_worker(&self, worker_id: &str) -> Result<()> {
        self.0.register_worker(worker_id).await
    }

    async fn deregister_worker(&self, worker_id: &str) -> Result<()> {
        self.0.deregister_worker(worker_id).await
    }

    async fn close(&self) {
        self.0.close().await
    }
}

/// Registers only `keep`; every other registration fails.
pub struct RegistrationFailingStore {
    pub inner: Arc<MemoryStore>,
    pub keep: String,
}

#[async_trait]
impl Store for RegistrationFailingStore {
    async fn upsert_repo(&self, repo: &RepoRecord) -> Result<()> {
        self.inner.upsert_repo(repo).await
    }

    async fn upsert_commit(&self, commit: &CommitRecord) -> Result<()> {
        self.inner.upsert_commit(commit).await
    }

    async fn insert_deferred(&self, new: &NewDeferred) -> Result<bool> {
        self.inner.insert_deferred(new).await
    }

    async fn select_deferred(&self, limit: u64) -> Result<Vec<DeferredRecord>> {
        self.inner.select_deferred(limit).await
    }

    async fn delete_deferred(&self, id: i64) -> Result<u64> {
        self.inner.delete_deferred(id).await
    }

    async fn unfulfilled(&self) -> Result<i64> {
        self.inner.unfulfilled().await
    }

    async fn executing(&self) -> Result<i64> {
        self.inner.executing().await
    }

    async fn register_worker(&self, worker_id: &str) -> Result<()> {
        if worker_id == self.keep {
            self.inner.register_worker(worker_id).await
        } else {
            Err(Error::Other(format!("cannot register {worker_id}")))
        }
    }

    async fn deregister_worker(&self, worker_id: &str) -> Result<()> {
        self.inner.deregister_worker(worker_id).await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn fleet_config() -> FleetConfig {
    FleetConfig {
        region: "us-west-2".into(),
        image_id: "ami-0123456789".into(),
        subnet_id: "subnet-42".into(),
        security_group_id: "sg-42".into(),
        iam_instance_arn: "arn:aws:iam::123456789012:instance-profile/crawler".into(),
        key_name: "crawler-key".into(),
        spot_price: "0.0035".into(),
        instance_type: "t2.micro".into(),
        dry_run: false,
        package_url: "https://packages.test/autocrawl".into(),
        launch_command: "/bin/true".into(),
    }
}

pub fn engine_config(quota: u64) -> EngineConfig {
    EngineConfig {
        worker_id: "worker-under-test".into(),
        api_base: API.into(),
        max_repos: 10,
        max_commits: 10,
        max_workers: 2,
        quota,
        launch: LaunchTemplate::new(
            fleet_config(),
            vec![("DATABASE_URL".into(), "postgres://crawler@db/crawl".into())],
        ),
    }
}

/// An engine over in-memory collaborators.
pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub api: Arc<FakeApi>,
    pub launcher: Arc<RecordingLauncher>,
}

impl Harness {
    pub fn new(config: EngineConfig, api: FakeApi) -> Self {
        Self::with_store(config, api, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: EngineConfig, api: FakeApi, store: Arc<MemoryStore>) -> Self {
        let audit: Arc<dyn ActionLog> = store.clone();
        Self::build(config, api, store, audit, RecordingLauncher::new())
    }

    pub fn build(
        config: EngineConfig,
        api: FakeApi,
        store: Arc<MemoryStore>,
        audit: Arc<dyn ActionLog>,
        launcher: RecordingLauncher,
    ) -> Self {
        let api = Arc::new(api);
        let launcher = Arc::new(launcher);
        let engine = Engine::new(
            config,
            Collaborators {
                store: store.clone(),
                api: api.clone(),
                audit,
                launcher: launcher.clone(),
            },
        );
        Self {
            engine,
            store,
            api,
            launcher,
        }
    }

    pub fn actions_of(&self, kind: WorkKind) -> Vec<ActionEntry> {
        self.store
            .actions()
            .into_iter()
            .filter(|a| a.kind == kind)
            .collect()
    }

    pub fn statuses_of(&self, kind: WorkKind) -> Vec<ActionStatus> {
        self.actions_of(kind).into_iter().map(|a| a.status).collect()
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Let every runnable task make progress.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
