//! Invalidation bus: payload-free "go check again" signals between components.
//!
//! DESIGN
//! ======
//! A mutation site (accepting a friend request, marking a notification read)
//! emits a [`Topic`] after its own request succeeds. Display widgets subscribe
//! and re-fetch their own value, so the bus never carries data that could be
//! stale or out of order.
//!
//! The bus is an ordinary value owned by the composition root and cloned into
//! whatever needs it; there is no global instance.
//!
//! TRADE-OFFS
//! ==========
//! Handlers are synchronous and run on the emitting task. Anything slow
//! (a network refetch) must be spawned or handed to a poller via
//! [`PollHandle::kick`](crate::poll::PollHandle::kick).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

#[cfg(test)]
#[path = "bus_test.rs"]
mod bus_test;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Unread-notification counts may be stale.
    Notifications,
    /// Incoming/outgoing friend request lists may be stale.
    FriendRequests,
    /// A credential refresh failed; the session is no longer valid.
    SessionExpired,
}

type Handler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<Topic, Vec<(u64, Handler)>>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // A panicking handler never runs under the lock, so poison only means a
    // panic elsewhere; the registry itself is still consistent.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every future emission on `topic`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.handlers.entry(topic).or_default().push((id, Arc::new(handler)));
        tracing::trace!(?topic, id, "bus subscribe");
        Subscription { registry: Arc::downgrade(&self.registry), topic, id }
    }

    /// Invoke every handler currently subscribed to `topic`.
    ///
    /// Returns the number of handlers run. Nothing is retained for
    /// subscribers that register later.
    pub fn emit(&self, topic: Topic) -> usize {
        // Snapshot then release the lock: handlers may subscribe, unsubscribe
        // or emit again.
        let handlers: Vec<Handler> = lock(&self.registry)
            .handlers
            .get(&topic)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        tracing::debug!(?topic, listeners = handlers.len(), "bus emit");
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        lock(&self.registry).handlers.get(&topic).map_or(0, Vec::len)
    }
}

/// Registration guard returned by [`EventBus::subscribe`].
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    #[must_use]
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Remove the handler. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn remove(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock(&registry);
        if let Some(list) = registry.handlers.get_mut(&self.topic) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                registry.handlers.remove(&self.topic);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}
