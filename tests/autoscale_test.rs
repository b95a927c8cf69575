//! Scaling decision and the end-of-process sequence.

mod common;

use std::sync::Arc;

use autocrawl::audit::ActionLog;
use autocrawl::db::Store;
use autocrawl::db::memory::MemoryStore;
use autocrawl::engine::{Collaborators, Engine, desired_new_workers};
use common::{FakeApi, Harness, RecordingLauncher, RegistrationFailingStore, engine_config};

#[test]
fn desired_new_workers_boundary_values() {
    assert_eq!(desired_new_workers(1, 0, 1), 2);
    assert_eq!(desired_new_workers(0, 1, 1), 0);
    assert_eq!(desired_new_workers(403, 882, 10), 1);
}

#[test]
fn desired_new_workers_stays_within_burst() {
    for unfulfilled in 0..40 {
        for executing in 0..40 {
            for max in 0..15 {
                let n = desired_new_workers(unfulfilled, executing, max);
                assert!(n <= 2, "({unfulfilled}, {executing}, {max}) -> {n}");
                if unfulfilled == 0 {
                    assert_eq!(n, 0);
                } else {
                    assert!(n >= 1);
                }
            }
        }
    }
}

fn harness_with(
    store: Arc<MemoryStore>,
    max_workers: u64,
    launcher: RecordingLauncher,
) -> Harness {
    let mut config = engine_config(0);
    config.max_workers = max_workers;
    let audit: Arc<dyn ActionLog> = store.clone();
    Harness::build(config, FakeApi::new(), store, audit, launcher)
}

#[tokio::test]
async fn end_of_process_launches_and_registers_replacements() {
    let store = Arc::new(MemoryStore::new());
    store.set_counters(143, 17);
    let h = harness_with(store.clone(), 20, RecordingLauncher::new());

    let shutdown = h.engine.run().await.unwrap();

    assert_eq!(shutdown.requested, 2);
    assert_eq!(shutdown.launched, 2);
    assert!(shutdown.is_clean());

    let launches = h.launcher.launches();
    assert_eq!(launches.len(), 2);
    let workers = store.workers();
    assert_eq!(workers.len(), 2);
    assert!(!workers.contains(&"worker-under-test".to_string()));
    // 17 others, this worker left, two replacements joined.
    assert_eq!(store.executing().await.unwrap(), 19);

    for spec in &launches {
        let script = spec.user_data_script().unwrap();
        assert!(
            workers
                .iter()
                .any(|id| script.contains(&format!("export AUTOCRAWL_WORKER_ID='{id}'")))
        );
    }
    assert!(store.is_closed());
}

#[tokio::test]
async fn full_fleet_launches_a_single_replacement() {
    let store = Arc::new(MemoryStore::new());
    store.set_counters(403, 881);
    let h = harness_with(store.clone(), 10, RecordingLauncher::new());

    let shutdown = h.engine.run().await.unwrap();

    assert_eq!(shutdown.requested, 1);
    assert_eq!(h.launcher.launches().len(), 1);
}

#[tokio::test]
async fn launch_failure_stops_without_registering() {
    let store = Arc::new(MemoryStore::new());
    store.set_counters(50, 0);
    let h = harness_with(store.clone(), 5, RecordingLauncher::failing_after(0));

    let shutdown = h.engine.run().await.unwrap();

    assert_eq!(shutdown.requested, 2);
    assert_eq!(shutdown.launched, 0);
    assert!(!shutdown.is_clean());
    assert!(store.workers().is_empty());
    assert_eq!(store.executing().await.unwrap(), 0);
    assert!(store.is_closed());
}

#[tokio::test]
async fn partial_launch_failure_keeps_earlier_launches() {
    let store = Arc::new(MemoryStore::new());
    store.set_counters(50, 0);
    let h = harness_with(store.clone(), 5, RecordingLauncher::failing_after(1));

    let shutdown = h.engine.run().await.unwrap();

    assert_eq!(shutdown.launched, 1);
    assert_eq!(store.workers().len(), 1);
    assert!(shutdown.error.is_some());
}

#[tokio::test]
async fn no_backlog_launches_nothing() {
    let store = Arc::new(MemoryStore::new());
    store.set_counters(0, 3);
    let h = harness_with(store.clone(), 10, RecordingLauncher::new());

    let shutdown = h.engine.run().await.unwrap();

    assert_eq!(shutdown.requested, 0);
    assert!(h.launcher.launches().is_empty());
    assert_eq!(store.executing().await.unwrap(), 3);
}

#[tokio::test]
async fn registration_failure_after_launch_keeps_progress() {
    let memory = Arc::new(MemoryStore::new());
    memory.set_counters(50, 0);
    let launcher = Arc::new(RecordingLauncher::new());
    let mut config = engine_config(0);
    config.max_workers = 5;
    let engine = Engine::new(
        config,
        Collaborators {
            store: Arc::new(RegistrationFailingStore {
                inner: memory.clone(),
                keep: "worker-under-test".into(),
            }),
            api: Arc::new(FakeApi::new()),
            audit: memory.clone(),
            launcher: launcher.clone(),
        },
    );

    let shutdown = engine.run().await.unwrap();

    assert_eq!(shutdown.requested, 2);
    assert_eq!(shutdown.launched, 0);
    assert_eq!(launcher.launches().len(), 1);
    assert!(shutdown.error.as_deref().unwrap_or("").contains("cannot register"));
    assert!(memory.workers().is_empty());
    assert!(memory.is_closed());
}
