//! Serializes webrtc-rs callbacks onto one task
//!
//! webrtc-rs invokes its callbacks from internal tasks, sometimes while
//! holding its own locks. Calling back into the peer connection (e.g.
//! `close()`) from inside such a callback can deadlock, and callbacks from
//! different internal tasks may interleave. Every callback therefore only
//! pushes onto an unbounded queue; a single consumer task awaits the
//! installed handler for each event in turn.
//!
//! Events queued before a handler is installed are delivered once it is.

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

type SharedHandler<E> = Arc<dyn Fn(E) -> BoxFuture<'static, ()> + Send + Sync>;

pub(crate) struct EventForwarder<E> {
    name: String,
    tx: mpsc::UnboundedSender<E>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<E>>>,
    handler: Arc<RwLock<Option<SharedHandler<E>>>>,
}

impl<E: Send + 'static> EventForwarder<E> {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            tx,
            rx: Mutex::new(Some(rx)),
            handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Sender handed to webrtc-rs callbacks
    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<E> {
        self.tx.clone()
    }

    /// Install (or replace) the handler; starts delivery on first call
    pub(crate) fn set_handler(
        &self,
        handler: Box<dyn Fn(E) -> BoxFuture<'static, ()> + Send + Sync>,
    ) {
        *self.handler.write() = Some(Arc::from(handler));

        let rx = self.rx.lock().take();
        if let Some(mut rx) = rx {
            let handler = Arc::clone(&self.handler);
            let name = self.name.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    let current = handler.read().clone();
                    if let Some(current) = current {
                        current(event).await;
                    }
                }
                trace!(forwarder = %name, "event source dropped");
            });
        }
    }
}
