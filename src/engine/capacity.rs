//! Capacity gate: local quota and in-flight accounting.
//!
//! `remaining` is the number of deferred items this process may still pull.
//! `executing` counts dispatched items whose cleanup has not run. Refills are
//! single-flight: a cleanup that wants a refill while one is running marks it
//! to go around again instead of starting a second drainer.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacityState {
    pub remaining: u64,
    pub executing: u64,
    /// A refill loop is running.
    pub refilling: bool,
    /// A cleanup asked for a refill while one was running.
    pub rerun: bool,
}

impl CapacityState {
    /// Nothing in flight and no refill running.
    pub fn is_idle(&self) -> bool {
        self.executing == 0 && !self.refilling
    }
}

/// What the caller of [`CapacityGate::on_cleanup`] must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    /// Start a refill loop.
    Refill,
    /// Quota and in-flight work are both exhausted.
    EndProcess,
    /// Other work (or a running refill) will reach the gate later.
    Wait,
}

/// What the refill loop must do when a drain pass stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillEnd {
    /// A refill was requested meanwhile and quota is left.
    Again,
    /// The process has nothing left to do.
    Idle,
    /// In-flight work will reach the gate later.
    Busy,
}

#[derive(Debug)]
pub struct CapacityGate {
    state: Mutex<CapacityState>,
}

impl CapacityGate {
    pub fn new(remaining: u64) -> Self {
        Self {
            state: Mutex::new(CapacityState {
                remaining,
                ..CapacityState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CapacityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> CapacityState {
        *self.lock()
    }

    pub fn remaining(&self) -> u64 {
        self.lock().remaining
    }

    /// An item was dispatched.
    pub fn start_work(&self) {
        self.lock().executing += 1;
    }

    /// An item's cleanup ran.
    pub fn on_cleanup(&self) -> CleanupAction {
        let mut state = self.lock();
        state.executing = state.executing.saturating_sub(1);

        if state.remaining > 0 {
            if state.refilling {
                state.rerun = true;
                CleanupAction::Wait
            } else {
                state.refilling = true;
                CleanupAction::Refill
            }
        } else if state.is_idle() {
            CleanupAction::EndProcess
        } else {
            CleanupAction::Wait
        }
    }

    /// Draw `n` units of quota. Returns what is left.
    pub fn consume(&self, n: u64) -> u64 {
        let mut state = self.lock();
        state.remaining = state.remaining.saturating_sub(n);
        state.remaining
    }

    /// Claim the refill loop. False if one is already running, in which case
    /// it is asked to go around again.
    pub fn begin_refill(&self) -> bool {
        let mut state = self.lock();
        if state.refilling {
            state.rerun = true;
            false
        } else {
            state.refilling = true;
            true
        }
    }

    /// A drain pass stopped; decide whether the loop continues.
    pub fn end_refill(&self) -> RefillEnd {
        let mut state = self.lock();
        if state.rerun && state.remaining > 0 {
            state.rerun = false;
            return RefillEnd::Again;
        }

        state.refilling = false;
        state.rerun = false;
        if state.executing == 0 {
            RefillEnd::Idle
        } else {
            RefillEnd::Busy
        }
    }
}
