//! Fixed-interval re-fetch loops for near-real-time feeds.
//!
//! DESIGN
//! ======
//! A poller fetches once immediately, then once per interval, until its
//! [`PollHandle`] is canceled or dropped. Ticks are not deduplicated: if a
//! fetch is still outstanding when the next tick fires, both run.
//!
//! Results land in a [`FeedSlot`]. Every tick carries a sequence number and
//! the slot ignores any result whose sequence is not newer than the one it
//! already shows, so a slow early response can never overwrite a faster
//! later one. Canceling closes the slot, so fetches still in flight at that
//! moment resolve harmlessly and are discarded.
//!
//! ERROR HANDLING
//! ==============
//! Fetch failures are logged and swallowed; the slot keeps its last value and
//! the next tick tries again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::net::types::ApiResult;

#[cfg(test)]
#[path = "poll_test.rs"]
mod poll_test;

// =============================================================================
// FEED SLOT
// =============================================================================

/// Latest applied value of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed<T> {
    value: Option<T>,
    seq: u64,
    closed: bool,
}

impl<T> Feed<T> {
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Sequence number of the applied value; 0 before the first.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apply {
    Applied,
    /// A newer sequence was already applied.
    Stale,
    /// The owning view is gone.
    Closed,
}

pub struct FeedSlot<T> {
    tx: Arc<watch::Sender<Feed<T>>>,
}

impl<T> Clone for FeedSlot<T> {
    fn clone(&self) -> Self {
        Self { tx: Arc::clone(&self.tx) }
    }
}

impl<T> Default for FeedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FeedSlot<T> {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Feed { value: None, seq: 0, closed: false });
        Self { tx: Arc::new(tx) }
    }

    /// Store `value` if `seq` is newer than anything applied so far.
    pub fn apply(&self, seq: u64, value: T) -> Apply {
        let mut outcome = Apply::Stale;
        self.tx.send_if_modified(|feed| {
            if feed.closed {
                outcome = Apply::Closed;
                return false;
            }
            if seq <= feed.seq {
                return false;
            }
            feed.value = Some(value);
            feed.seq = seq;
            outcome = Apply::Applied;
            true
        });
        outcome
    }

    /// Stop accepting values. Idempotent.
    pub fn close(&self) {
        self.tx.send_if_modified(|feed| !std::mem::replace(&mut feed.closed, true));
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Feed<T>> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn seq(&self) -> u64 {
        self.tx.borrow().seq
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }
}

impl<T: Clone> FeedSlot<T> {
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.tx.borrow().value.clone()
    }
}

// =============================================================================
// POLLER
// =============================================================================

/// Requests an immediate out-of-schedule fetch. Cheap to clone into bus handlers.
#[derive(Clone)]
pub struct Kicker(Arc<Notify>);

impl Kicker {
    pub fn kick(&self) {
        self.0.notify_one();
    }
}

/// Owner of a running poller. Dropping it cancels the poller.
pub struct PollHandle {
    name: &'static str,
    stop: watch::Sender<bool>,
    kick: Kicker,
    close: Box<dyn Fn() + Send + Sync>,
    task: JoinHandle<()>,
}

impl PollHandle {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fetch now and restart the interval.
    pub fn kick(&self) {
        self.kick.kick();
    }

    #[must_use]
    pub fn kicker(&self) -> Kicker {
        self.kick.clone()
    }

    /// Stop scheduling fetches and discard any still in flight.
    pub fn cancel(self) {
        drop(self);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        // Close first: an in-flight fetch may resolve before the loop task
        // observes the stop signal.
        (self.close)();
        self.stop.send_replace(true);
        tracing::debug!(poller = self.name, "poller canceled");
    }
}

/// Start polling `fetch` every `interval` into `slot`.
///
/// Must be called from within a tokio runtime.
pub fn spawn<T, F, Fut>(name: &'static str, interval: Duration, slot: FeedSlot<T>, fetch: F) -> PollHandle
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
{
    let (stop, mut stop_rx) = watch::channel(false);
    let kick = Kicker(Arc::new(Notify::new()));
    let notify = Arc::clone(&kick.0);
    let loop_slot = slot.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut seq: u64 = 0;
        loop {
            tokio::select! {
                biased;
                // Only ever written by PollHandle::drop.
                _ = stop_rx.changed() => break,
                () = notify.notified() => ticker.reset(),
                _ = ticker.tick() => {}
            }

            seq += 1;
            let pending = fetch();
            let slot = loop_slot.clone();
            tokio::spawn(async move {
                match pending.await {
                    Ok(value) => match slot.apply(seq, value) {
                        Apply::Applied => tracing::trace!(poller = name, seq, "poll applied"),
                        Apply::Stale => tracing::debug!(poller = name, seq, "discarding out-of-order poll result"),
                        Apply::Closed => tracing::debug!(poller = name, seq, "discarding poll result after cancel"),
                    },
                    Err(e) => tracing::warn!(poller = name, seq, error = %e, "poll fetch failed"),
                }
            });
        }
        loop_slot.close();
    });

    let close_slot = slot;
    PollHandle { name, stop, kick, close: Box::new(move || close_slot.close()), task }
}
