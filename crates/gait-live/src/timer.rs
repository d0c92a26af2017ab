//! Single-slot reconnect timer.
//!
//! At most one sleep task is pending. Arming cancels the previous task first,
//! and every arm gets a fresh id, so a firing that was already queued before a
//! re-arm or cancel is recognised as stale by [`ReconnectTimer::take_if_current`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::transport::ManagerEvent;

struct Pending {
    id: u64,
    delay: Duration,
    task: JoinHandle<()>,
}

/// The manager's one pending reconnect.
pub struct ReconnectTimer {
    tx: mpsc::UnboundedSender<ManagerEvent>,
    next_id: u64,
    pending: Option<Pending>,
}

impl ReconnectTimer {
    /// Timer that reports firings into `tx`.
    pub fn new(tx: mpsc::UnboundedSender<ManagerEvent>) -> Self {
        Self {
            tx,
            next_id: 0,
            pending: None,
        }
    }

    /// Schedule a firing after `delay`, cancelling any pending one.
    ///
    /// Returns the timer id, or `None` when called outside a tokio runtime,
    /// in which case nothing is left pending.
    pub fn arm(&mut self, delay: Duration) -> Option<u64> {
        let _ = self.cancel();
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "reconnect timer not armed: no tokio runtime");
                return None;
            }
        };
        self.next_id += 1;
        let id = self.next_id;
        let tx = self.tx.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ManagerEvent::ReconnectDue { timer_id: id });
        });
        debug!(timer_id = id, delay_ms = %delay.as_millis(), "reconnect timer armed");
        self.pending = Some(Pending { id, delay, task });
        Some(id)
    }

    /// Cancel the pending firing. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.task.abort();
                debug!(timer_id = pending.id, "reconnect timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a firing is pending.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Delay of the pending firing.
    pub fn pending_delay(&self) -> Option<Duration> {
        self.pending.as_ref().map(|p| p.delay)
    }

    /// Consume a firing. Returns `true` only for the currently armed id.
    pub fn take_if_current(&mut self, timer_id: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.id == timer_id => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
    }
}

impl std::fmt::Debug for ReconnectTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectTimer")
            .field("pending_id", &self.pending.as_ref().map(|p| p.id))
            .field("pending_delay", &self.pending_delay())
            .finish()
    }
}
