//! Deferred queue client.
//!
//! At-least-once store of work items that failed transiently. Several
//! worker processes drain the same table; a record belongs to whichever
//! drainer's delete affects it, so no record is ever delivered twice.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::Store;
use crate::error::Result;
use crate::model::work::{DeferredRecord, NewDeferred, WorkItem};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Outcome of one drain call.
#[derive(Debug, Default)]
pub struct Drain {
    /// Records the select returned, claimed or not.
    pub selected: usize,
    /// Records this drainer deleted and therefore owns.
    pub claimed: Vec<DeferredRecord>,
}

#[derive(Clone)]
pub struct DeferredQueue {
    store: Arc<dyn Store>,
}

impl DeferredQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Durably queue a work item under its correlation uuid. Returns false
    /// if that uuid was already queued.
    pub async fn enqueue(&self, item: &WorkItem) -> Result<bool> {
        let new = NewDeferred::from_item(item)?;
        let inserted = self.store.insert_deferred(&new).await?;
        if !inserted {
            warn!(uuid = %item.uuid(), kind = %item.kind(), "work item already deferred");
        }
        Ok(inserted)
    }

    /// Fetch up to `limit` records and claim each by deleting it.
    pub async fn drain(&self, limit: u64) -> Result<Drain> {
        if limit == 0 {
            return Ok(Drain::default());
        }

        let records = self.store.select_deferred(limit).await?;
        let selected = records.len();
        let mut claimed = Vec::with_capacity(selected);

        for record in records {
            if self.claim(&record).await? {
                claimed.push(record);
            }
        }

        debug!(limit, selected, claimed = claimed.len(), "drained deferred queue");
        Ok(Drain { selected, claimed })
    }

    /// Claim a single record. Only an affected-row count of exactly one
    /// makes the caller its owner.
    pub async fn claim(&self, record: &DeferredRecord) -> Result<bool> {
        let affected = self.store.delete_deferred(record.id).await?;
        let owned = affected == 1;
        metrics::deferred_claims().add(
            1,
            &[KeyValue::new("result", if owned { "claimed" } else { "skipped" })],
        );
        if !owned {
            debug!(id = record.id, affected, "deferred record claimed elsewhere");
        }
        Ok(owned)
    }
}
