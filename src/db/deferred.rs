//! Deferred queue table operations via direct SQLx.
//!
//! Insert and claim-delete also move the shared `unfulfilled` counter in
//! the same transaction, so queue depth never drifts from the table.

use super::backlog::UNFULFILLED;
use crate::error::Result;
use crate::model::work::{DeferredRecord, NewDeferred};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

impl super::Db {
    /// Queue a deferred item. Returns false if its uuid is already queued.
    pub async fn insert_deferred(&self, new: &NewDeferred) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO deferred (uuid, kind, payload)
             VALUES ($1, $2, $3)
             ON CONFLICT (uuid) DO NOTHING
             RETURNING id",
        )
        .bind(new.uuid)
        .bind(&new.kind)
        .bind(&new.payload)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_some() {
            sqlx::query("UPDATE counters SET value = value + 1 WHERE name = $1")
                .bind(UNFULFILLED)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("operation", "insert"),
                KeyValue::new(
                    "result",
                    if inserted.is_some() { "ok" } else { "duplicate" },
                ),
            ],
        );
        Ok(inserted.is_some())
    }

    /// Read up to `limit` deferred records without claiming them.
    pub async fn select_deferred(&self, limit: u64) -> Result<Vec<DeferredRecord>> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, kind, payload FROM deferred LIMIT $1")
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?;

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("operation", "select"),
                KeyValue::new("result", if rows.is_empty() { "empty" } else { "ok" }),
            ],
        );

        Ok(rows
            .into_iter()
            .map(|(id, kind, payload)| DeferredRecord { id, kind, payload })
            .collect())
    }

    /// Delete one record by queue id. Exactly one affected row means the
    /// caller owns the record; zero means a concurrent drainer got it first.
    pub async fn delete_deferred(&self, id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query("DELETE FROM deferred WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if affected == 1 {
            sqlx::query("UPDATE counters SET value = GREATEST(value - 1, 0) WHERE name = $1")
                .bind(UNFULFILLED)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("operation", "delete"),
                KeyValue::new("result", if affected == 1 { "claimed" } else { "lost" }),
            ],
        );
        Ok(affected)
    }
}
