//! Persistence: connection pool, migrations, and the `Store` seam the
//! engine talks to.
//!
//! `Db` is the Postgres implementation. `memory::MemoryStore` backs tests
//! and dry runs.

pub mod audit;
pub mod backlog;
pub mod deferred;
pub mod memory;
pub mod records;

use crate::error::Result;
use crate::model::record::{CommitRecord, RepoRecord};
use crate::model::work::{DeferredRecord, NewDeferred};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Everything the engine needs from the relational store.
///
/// Counter updates must be atomic on the store side; the engine never
/// read-modify-writes them.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update a repository by id.
    async fn upsert_repo(&self, repo: &RepoRecord) -> Result<()>;

    /// Insert or update a commit by sha.
    async fn upsert_commit(&self, commit: &CommitRecord) -> Result<()>;

    /// Durably queue a deferred item. Returns false if a record with the same
    /// uuid is already queued.
    async fn insert_deferred(&self, new: &NewDeferred) -> Result<bool>;

    /// Read up to `limit` deferred records. No ordering guarantee.
    async fn select_deferred(&self, limit: u64) -> Result<Vec<DeferredRecord>>;

    /// Delete one deferred record by queue id, returning affected rows.
    async fn delete_deferred(&self, id: i64) -> Result<u64>;

    /// Global queue depth.
    async fn unfulfilled(&self) -> Result<i64>;

    /// Global count of registered workers.
    async fn executing(&self) -> Result<i64>;

    /// Add a worker to the executing tally. Idempotent per identity.
    async fn register_worker(&self, worker_id: &str) -> Result<()>;

    /// Remove a worker from the executing tally. Idempotent per identity.
    async fn deregister_worker(&self, worker_id: &str) -> Result<()>;

    /// Release the connection. Called once, at process end.
    async fn close(&self);
}

/// Database handle. Owns the connection pool for this process.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for Db {
    async fn upsert_repo(&self, repo: &RepoRecord) -> Result<()> {
        Db::upsert_repo(self, repo).await
    }

    async fn upsert_commit(&self, commit: &CommitRecord) -> Result<()> {
        Db::upsert_commit(self, commit).await
    }

    async fn insert_deferred(&self, new: &NewDeferred) -> Result<bool> {
        Db::insert_deferred(self, new).await
    }

    async fn select_deferred(&self, limit: u64) -> Result<Vec<DeferredRecord>> {
        Db::select_deferred(self, limit).await
    }

    async fn delete_deferred(&self, id: i64) -> Result<u64> {
        Db::delete_deferred(self, id).await
    }

    async fn unfulfilled(&self) -> Result<i64> {
        self.read_counter(backlog::UNFULFILLED).await
    }

    async fn executing(&self) -> Result<i64> {
        self.read_counter(backlog::EXECUTING).await
    }

    async fn register_worker(&self, worker_id: &str) -> Result<()> {
        Db::register_worker(self, worker_id).await
    }

    async fn deregister_worker(&self, worker_id: &str) -> Result<()> {
        Db::deregister_worker(self, worker_id).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
