//! Global backlog counters and the worker registry.
//!
//! Shared by every worker process. All updates are single SQL statements
//! (or one transaction), never read-modify-write from process memory.

use crate::error::Result;
use tracing::debug;

/// Counter row tracking deferred queue depth.
pub const UNFULFILLED: &str = "unfulfilled";
/// Counter row tracking registered workers.
pub const EXECUTING: &str = "executing";

impl super::Db {
    /// Read a counter row. A missing row reads as zero.
    pub async fn read_counter(&self, name: &str) -> Result<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM counters WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0).unwrap_or(0))
    }

    /// Register a worker identity. The executing counter only moves when
    /// the identity was not yet registered.
    pub async fn register_worker(&self, worker_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO workers (id) VALUES ($1) ON CONFLICT (id) DO NOTHING",
        )
        .bind(worker_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            sqlx::query("UPDATE counters SET value = value + 1 WHERE name = $1")
                .bind(EXECUTING)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(worker_id, registered = inserted == 1, "worker registration");
        Ok(())
    }

    /// Deregister a worker identity, releasing its executing slot.
    pub async fn deregister_worker(&self, worker_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM workers WHERE id = $1")
            .bind(worker_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 1 {
            sqlx::query("UPDATE counters SET value = GREATEST(value - 1, 0) WHERE name = $1")
                .bind(EXECUTING)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(worker_id, deregistered = deleted == 1, "worker deregistration");
        Ok(())
    }
}
