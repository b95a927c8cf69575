//! In-memory store for tests and dry runs.
//!
//! Implements [`Store`] and [`ActionLog`] over a single mutex.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: nothing survives the process
//! - **Single-process only**: counters and the deferred queue are not shared
//!   across process boundaries

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::Store;
use crate::audit::{ActionEntry, ActionLog};
use crate::error::Result;
use crate::model::record::{CommitRecord, RepoRecord};
use crate::model::work::{DeferredRecord, NewDeferred};

#[derive(Debug, Default)]
struct State {
    repos: HashMap<i64, RepoRecord>,
    commits: HashMap<String, CommitRecord>,
    deferred: BTreeMap<i64, (uuid::Uuid, DeferredRecord)>,
    next_deferred_id: i64,
    unfulfilled: i64,
    executing: i64,
    workers: HashSet<String>,
    actions: Vec<ActionEntry>,
    repo_writes: usize,
    commit_writes: usize,
    closed: bool,
}

/// Store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite both global counters.
    pub fn set_counters(&self, unfulfilled: i64, executing: i64) {
        let mut state = self.state();
        state.unfulfilled = unfulfilled;
        state.executing = executing;
    }

    pub fn repos(&self) -> Vec<RepoRecord> {
        let mut repos: Vec<_> = self.state().repos.values().cloned().collect();
        repos.sort_by_key(|r| r.id);
        repos
    }

    pub fn commits(&self) -> Vec<CommitRecord> {
        let mut commits: Vec<_> = self.state().commits.values().cloned().collect();
        commits.sort_by(|a, b| a.sha.cmp(&b.sha));
        commits
    }

    /// Number of upsert calls, including updates of existing rows.
    pub fn repo_writes(&self) -> usize {
        self.state().repo_writes
    }

    pub fn commit_writes(&self) -> usize {
        self.state().commit_writes
    }

    /// Deferred records currently queued, in queue id order.
    pub fn deferred(&self) -> Vec<DeferredRecord> {
        self.state()
            .deferred
            .values()
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn actions(&self) -> Vec<ActionEntry> {
        self.state().actions.clone()
    }

    pub fn workers(&self) -> Vec<String> {
        let mut workers: Vec<_> = self.state().workers.iter().cloned().collect();
        workers.sort();
        workers
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_repo(&self, repo: &RepoRecord) -> Result<()> {
        let mut state = self.state();
        state.repo_writes += 1;
        state.repos.insert(repo.id, repo.clone());
        Ok(())
    }

    async fn upsert_commit(&self, commit: &CommitRecord) -> Result<()> {
        let mut state = self.state();
        state.commit_writes += 1;
        state.commits.insert(commit.sha.clone(), commit.clone());
        Ok(())
    }

    async fn insert_deferred(&self, new: &NewDeferred) -> Result<bool> {
        let mut state = self.state();
        if state.deferred.values().any(|(uuid, _)| *uuid == new.uuid) {
            return Ok(false);
        }
        state.next_deferred_id += 1;
        let id = state.next_deferred_id;
        state.deferred.insert(
            id,
            (
                new.uuid,
                DeferredRecord {
                    id,
                    kind: new.kind.clone(),
                    payload: new.payload.clone(),
                },
            ),
        );
        state.unfulfilled += 1;
        Ok(true)
    }

    async fn select_deferred(&self, limit: u64) -> Result<Vec<DeferredRecord>> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(self
            .state()
            .deferred
            .values()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn delete_deferred(&self, id: i64) -> Result<u64> {
        let mut state = self.state();
        match state.deferred.remove(&id) {
            Some(_) => {
                state.unfulfilled = (state.unfulfilled - 1).max(0);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn unfulfilled(&self) -> Result<i64> {
        Ok(self.state().unfulfilled)
    }

    async fn executing(&self) -> Result<i64> {
        Ok(self.state().executing)
    }

    async fn register_worker(&self, worker_id: &str) -> Result<()> {
        let mut state = self.state();
        if state.workers.insert(worker_id.to_string()) {
            state.executing += 1;
        }
        Ok(())
    }

    async fn deregister_worker(&self, worker_id: &str) -> Result<()> {
        let mut state = self.state();
        if state.workers.remove(worker_id) {
            state.executing = (state.executing - 1).max(0);
        }
        Ok(())
    }

    async fn close(&self) {
        self.state().closed = true;
    }
}

#[async_trait]
impl ActionLog for MemoryStore {
    async fn record(&self, entry: &ActionEntry) -> Result<()> {
        self.state().actions.push(entry.clone());
        Ok(())
    }
}
