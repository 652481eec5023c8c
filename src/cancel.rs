//! Cancellation scope shared by every pipeline stage
//!
//! A `CancelToken` wraps a channel that never carries a message. Cancelling
//! drops the only sender, which disconnects every receiver at once, so
//! `recv(token.done())` becomes ready in any `select!` that is waiting on it.
//! Every blocking send or receive in the pipeline races against that arm.

use crossbeam_channel::{bounded, select, Receiver, Sender};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::debug;

/// Why a scope was cancelled. Only the first cancellation is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The reducer finished and the coordinator released the remaining stages
    Finished,
    /// The caller asked for an early stop
    Requested,
    /// The configured deadline elapsed
    Deadline,
    /// SIGINT or SIGTERM
    Signal,
    /// A stage hit a fatal error and tore the scope down
    Failed,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CancelReason::Finished => "finished",
            CancelReason::Requested => "cancelled by request",
            CancelReason::Deadline => "deadline exceeded",
            CancelReason::Signal => "interrupted by signal",
            CancelReason::Failed => "aborted after a fatal error",
        };
        f.write_str(text)
    }
}

struct Inner {
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    reason: OnceCell<CancelReason>,
}

/// Cloneable handle to one cancellable scope
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, done) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                trigger: Mutex::new(Some(trigger)),
                done,
                reason: OnceCell::new(),
            }),
        }
    }

    /// Receiver that becomes ready (disconnected) once the scope is cancelled
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Cancel the scope. Returns false if it was already cancelled.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        if self.inner.reason.set(reason).is_err() {
            return false;
        }

        let trigger = match self.inner.trigger.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(trigger);

        debug!(%reason, "cancellation scope closed");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().copied()
    }

    /// Block until the scope is cancelled
    pub fn wait(&self) {
        let _ = self.inner.done.recv();
    }

    /// Spawn a watchdog that cancels the scope with `Deadline` at `deadline`.
    ///
    /// The watchdog exits as soon as the scope is cancelled for any other
    /// reason, so joining it never outlives the scope.
    pub fn cancel_at(&self, deadline: Instant) -> JoinHandle<()> {
        let token = self.clone();
        thread::spawn(move || {
            let timer = crossbeam_channel::at(deadline);
            select! {
                recv(token.done()) -> _ => {}
                recv(timer) -> _ => {
                    token.cancel(CancelReason::Deadline);
                }
            }
        })
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}
