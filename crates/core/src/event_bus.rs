//! Typed publish/subscribe keyed by string event names
//!
//! Handlers are async closures. Within one event name they run in
//! registration order; [`EventBus::emit`] awaits every one of them before
//! returning. The handler list is snapshotted before dispatch, so a handler
//! that calls [`EventBus::on`] or [`EventBus::off`] affects only later
//! emissions.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Identifies one handler registration, returned by [`EventBus::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type BoxedHandler<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Generic typed event bus
pub struct EventBus<T> {
    /// Bus name used in diagnostics
    name: String,
    handlers: RwLock<HashMap<String, Vec<(HandlerId, BoxedHandler<T>)>>>,
    next_id: AtomicU64,
    warn_if_unhandled: bool,
}

impl<T> std::fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("events", &handlers.keys().collect::<Vec<_>>())
            .field("warn_if_unhandled", &self.warn_if_unhandled)
            .finish()
    }
}

impl<T> EventBus<T>
where
    T: Clone + Send + 'static,
{
    /// Create a bus that silently ignores events without handlers
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, false)
    }

    /// Create a bus, optionally warning when an event has no handler
    pub fn with_options(name: impl Into<String>, warn_if_unhandled: bool) -> Self {
        Self {
            name: name.into(),
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            warn_if_unhandled,
        }
    }

    /// Register `handler` for `event`
    pub fn on<F, Fut>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let boxed: BoxedHandler<T> =
            Arc::new(move |data: T| -> BoxFuture<'static, ()> { Box::pin(handler(data)) });

        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, boxed));

        trace!(bus = %self.name, event, ?id, "handler registered");
        id
    }

    /// Remove one handler; returns whether it was registered
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };

        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;

        if list.is_empty() {
            handlers.remove(event);
        }

        removed
    }

    /// Invoke every handler registered for `event` and wait for all of them
    ///
    /// Returns the number of handlers invoked.
    pub async fn emit(&self, event: &str, data: T) -> usize {
        let snapshot: Vec<BoxedHandler<T>> = self
            .handlers
            .read()
            .get(event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        if snapshot.is_empty() {
            if self.warn_if_unhandled {
                warn!(bus = %self.name, event, "no handler registered for event");
            }
            return 0;
        }

        for handler in &snapshot {
            handler(data.clone()).await;
        }

        snapshot.len()
    }

    /// Number of handlers currently registered for `event`
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// Remove every handler for every event
    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}
