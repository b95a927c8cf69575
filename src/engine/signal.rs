//! Process-local one-shot signals.
//!
//! A signal is a named event delivered to whoever subscribed before it was
//! emitted. Nothing is buffered: an emit with no subscribers is dropped, so a
//! waiter must subscribe before the work that will emit is started.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::future::select_all;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

/// Name of the signal emitted when an item's business logic finishes.
pub fn done(uuid: Uuid) -> String {
    format!("{uuid}_DONE")
}

/// Name of the signal emitted when an item's action has been audited.
pub fn logged(uuid: Uuid) -> String {
    format!("{uuid}_LOGGED")
}

#[derive(Default)]
pub struct SignalBus {
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next emission of `name`.
    pub fn subscribe(&self, name: impl Into<String>) -> Signal {
        let name = name.into();
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.clone())
            .or_default()
            .push(tx);
        Signal { name, rx }
    }

    /// Fire `name` once. Returns how many subscribers received it.
    pub fn emit(&self, name: &str) -> usize {
        let senders = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .unwrap_or_default();

        let mut delivered = 0;
        for tx in senders {
            if tx.send(()).is_ok() {
                delivered += 1;
            }
        }
        if delivered == 0 {
            debug!(signal = name, "signal emitted with no subscribers");
        }
        delivered
    }

    /// Names with at least one live subscriber.
    pub fn pending(&self) -> usize {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A subscription to one emission of a named signal. Resolves to its name.
#[derive(Debug)]
pub struct Signal {
    name: String,
    rx: oneshot::Receiver<()>,
}

impl Signal {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Future for Signal {
    type Output = String;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<String> {
        // A dropped sender means the bus is gone; nothing will ever fire.
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(self.name.clone()),
            Poll::Ready(Err(_)) | Poll::Pending => Poll::Pending,
        }
    }
}

/// Wait until every signal has fired once, in any order.
///
/// Races the not-yet-fired set exactly `signals.len()` times, dropping each
/// winner from the set. Returns names in the order they fired.
pub async fn wait_for_all(signals: Vec<Signal>) -> Vec<String> {
    let total = signals.len();
    let mut fired = Vec::with_capacity(total);
    let mut unseen = signals;

    for _ in 0..total {
        let (name, _, rest) = select_all(unseen).await;
        fired.push(name);
        unseen = rest;
    }
    fired
}

/// The set of signals an item must observe before its cleanup may run.
#[derive(Debug, Default)]
pub struct Completion {
    signals: Vec<Signal>,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, signal: Signal) {
        self.signals.push(signal);
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub async fn wait(self) -> Vec<String> {
        wait_for_all(self.signals).await
    }
}
