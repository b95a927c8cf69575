//! Postgres-backed action log.

use crate::audit::{ActionEntry, ActionLog};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
impl ActionLog for super::Db {
    async fn record(&self, entry: &ActionEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO action_log (uuid, kind, status, payload, error, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.uuid)
        .bind(entry.kind.as_str())
        .bind(entry.status.to_string())
        .bind(&entry.payload)
        .bind(&entry.error)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
