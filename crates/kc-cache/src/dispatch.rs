//! Asynchronous delivery of change events to registered listeners.
//!
//! Each listener gets its own unbounded queue and dispatch task, so a slow
//! listener never delays delivery to the others. Events are handed to a
//! listener no earlier than `enqueued + delay`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::event::{CacheEntryEvent, CacheEntryListener, ListenerId};

struct Queued {
    event: CacheEntryEvent,
    due: Instant,
}

struct Registration {
    tx: mpsc::UnboundedSender<Queued>,
    task: JoinHandle<()>,
    pending: Arc<AtomicUsize>,
}

/// Set of listeners attached to one cache, with their dispatch tasks.
pub struct ListenerRegistry {
    cache_name: String,
    delay: Duration,
    drain_timeout: Duration,
    listeners: Mutex<HashMap<ListenerId, Registration>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    ///
    /// `delay` is the minimum time between publishing an event and handing
    /// it to a listener. `drain_timeout` bounds how long unregistering waits
    /// for queued events to be delivered.
    #[must_use]
    pub fn new(cache_name: impl Into<String>, delay: Duration, drain_timeout: Duration) -> Self {
        Self {
            cache_name: cache_name.into(),
            delay,
            drain_timeout,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a listener and spawns its dispatch task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register(&self, listener: Arc<dyn CacheEntryListener>) -> ListenerId {
        let id = ListenerId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(deliver(listener, rx, Arc::clone(&pending)));

        self.listeners
            .lock()
            .insert(id, Registration { tx, task, pending });

        tracing::debug!(cache = %self.cache_name, listener = %id, "listener registered");
        id
    }

    /// Queues an event for every registered listener.
    pub fn publish(&self, event: &CacheEntryEvent) {
        let due = Instant::now() + self.delay;
        let listeners = self.listeners.lock();
        for (id, registration) in listeners.iter() {
            registration.pending.fetch_add(1, Ordering::AcqRel);
            let queued = Queued {
                event: event.clone(),
                due,
            };
            if registration.tx.send(queued).is_err() {
                registration.pending.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!(cache = %self.cache_name, listener = %id, "listener task gone");
            }
        }
    }

    /// Unregisters a listener, delivering what is already queued.
    ///
    /// Returns the number of events dropped because draining exceeded the
    /// timeout. Unknown ids are ignored.
    pub async fn unregister(&self, id: ListenerId) -> usize {
        let registration = self.listeners.lock().remove(&id);
        let Some(registration) = registration else {
            return 0;
        };
        self.drain(id, registration).await
    }

    /// Unregisters every listener. Returns the total of dropped events.
    pub async fn shutdown(&self) -> usize {
        let registrations: Vec<_> = self.listeners.lock().drain().collect();
        let mut dropped = 0;
        for (id, registration) in registrations {
            dropped += self.drain(id, registration).await;
        }
        dropped
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Returns whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn drain(&self, id: ListenerId, registration: Registration) -> usize {
        let Registration {
            tx,
            mut task,
            pending,
        } = registration;
        // Closing the sender lets the task finish once the queue is empty.
        drop(tx);

        if tokio::time::timeout(self.drain_timeout, &mut task).await.is_ok() {
            tracing::debug!(cache = %self.cache_name, listener = %id, "listener drained");
            return 0;
        }

        task.abort();
        let dropped = pending.load(Ordering::Acquire);
        tracing::warn!(
            cache = %self.cache_name,
            listener = %id,
            dropped,
            "listener drain timed out, events dropped"
        );
        dropped
    }
}

impl Drop for ListenerRegistry {
    fn drop(&mut self) {
        for (_, registration) in self.listeners.get_mut().drain() {
            registration.task.abort();
        }
    }
}

async fn deliver(
    listener: Arc<dyn CacheEntryListener>,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(queued) = rx.recv().await {
        tokio::time::sleep_until(queued.due).await;
        listener.on_event(&queued.event);
        pending.fetch_sub(1, Ordering::AcqRel);
    }
}
