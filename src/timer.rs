//! Retransmission timer.
//!
//! [`RetransmitTimer`] owns at most one pending expiry, backed by a spawned
//! tokio task that sleeps for the timeout and then runs a callback.  The
//! owner (see [`crate::coordinator`]) arms, restarts and cancels it while
//! holding the window lock, so the timer's lifetime tracks the sender's
//! `Idle`/`Armed` state exactly.
//!
//! Aborting a task cannot stop a callback that has already woken up and is
//! waiting for the window lock.  Every arming therefore gets a generation
//! number; the callback receives it and must confirm it with [`fire`] before
//! acting.
//!
//! [`fire`]: RetransmitTimer::fire

use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct RetransmitTimer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl RetransmitTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start the timer.  Any pending expiry is cancelled first.
    ///
    /// Must be called from within a tokio runtime.  Returns the generation
    /// handed to `on_expiry`.
    pub fn start<F>(&mut self, timeout: Duration, on_expiry: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            on_expiry(generation);
        }));
        generation
    }

    /// Cancel the pending expiry, if any.
    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Claim an expiry.  Returns `false` if `generation` was cancelled or
    /// superseded since it was armed; the caller must then do nothing.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.task.is_none() || generation != self.generation {
            return false;
        }
        // The task is finishing on its own; drop the handle without aborting.
        self.task = None;
        self.generation = self.generation.wrapping_add(1);
        true
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Generation of the pending expiry, if armed.
    pub fn pending_generation(&self) -> Option<u64> {
        self.task.as_ref().map(|_| self.generation)
    }
}

impl Drop for RetransmitTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
