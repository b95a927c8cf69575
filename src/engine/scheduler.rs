//! Refill loop: pull deferred items into this process while quota lasts.

use serde_json::json;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use super::Engine;
use super::capacity::RefillEnd;
use super::signal::{self, Completion};
use crate::audit::{ActionEntry, ActionStatus};
use crate::error::Result;
use crate::model::work::{DeferredRecord, WorkKind};
use crate::telemetry::work::start_work_span;

/// Run drain passes until the gate says stop. The caller must have claimed
/// the refill loop on the capacity gate.
pub(super) async fn refill(engine: Engine) {
    loop {
        drain_pass(&engine).await;
        match engine.inner.capacity.end_refill() {
            RefillEnd::Again => continue,
            RefillEnd::Idle => {
                info!("no work left in flight, ending process");
                engine.end_process();
                return;
            }
            RefillEnd::Busy => return,
        }
    }
}

/// Drain rounds while quota remains and the queue keeps yielding records.
async fn drain_pass(engine: &Engine) {
    loop {
        let asked = engine.inner.capacity.remaining();
        if asked == 0 {
            debug!("refill quota exhausted");
            return;
        }
        match round(engine, asked).await {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "refill round failed");
                return;
            }
        }
    }
}

/// One drain of up to `asked` records. The round is itself audited, and it
/// completes once every replayed item is done and its own report is logged.
/// Returns how many records the queue offered.
async fn round(engine: &Engine, asked: u64) -> Result<usize> {
    let round_id = Uuid::new_v4();
    let span = start_work_span(WorkKind::DeferredTask.as_str(), &round_id);

    async {
        let mut completion = Completion::new();
        let drained = engine.inner.queue.drain(asked).await;

        let (entry, result) = match drained {
            Ok(drain) => {
                let got = drain.claimed.len();
                engine.inner.capacity.consume(got as u64);
                for record in &drain.claimed {
                    replay(engine, record, &mut completion);
                }
                info!(asked, selected = drain.selected, got, "refill round");
                let entry = ActionEntry::new(
                    round_id,
                    WorkKind::DeferredTask,
                    ActionStatus::Succeeded,
                    json!({ "asked": asked, "got": got }),
                );
                (entry, Ok(drain.selected))
            }
            Err(e) => {
                let entry = ActionEntry::new(
                    round_id,
                    WorkKind::DeferredTask,
                    ActionStatus::Failed,
                    json!({ "asked": asked, "got": 0 }),
                )
                .with_error(e.to_string());
                (entry, Err(e))
            }
        };

        completion.push(engine.report(entry));
        completion.wait().await;
        result
    }
    .instrument(span)
    .await
}

/// Turn a claimed record back into live work under its original uuid.
///
/// An undecodable record has already been removed from the queue; it is
/// logged and dropped.
pub(super) fn replay(engine: &Engine, record: &DeferredRecord, completion: &mut Completion) -> bool {
    match record.decode() {
        Ok(item) => {
            completion.push(engine.inner.bus.subscribe(signal::done(item.uuid())));
            engine.dispatch(item);
            true
        }
        Err(e) => {
            warn!(id = record.id, kind = %record.kind, error = %e, "dropping undecodable deferred record");
            false
        }
    }
}
