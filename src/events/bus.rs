//! Per-run publish/subscribe fan-out
//!
//! Each subscriber owns a bounded queue. Publishing never blocks: if one
//! subscriber's queue is full, only that subscriber misses the event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::types::AgentEvent;

/// Queue capacity per subscriber
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

struct Subscriber {
    tx: mpsc::Sender<AgentEvent>,
    dropped: Arc<AtomicU64>,
}

#[derive(Default)]
struct BusInner {
    subscribers: Vec<Subscriber>,
    closed: bool,
}

pub struct EventBus {
    inner: Mutex<BusInner>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        // A panic while holding the lock cannot leave the subscriber list half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new subscriber. After `close()` the returned subscription is
    /// already at end-of-stream.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let mut inner = self.lock();
        if !inner.closed {
            inner.subscribers.push(Subscriber {
                tx,
                dropped: dropped.clone(),
            });
        }
        Subscription { rx, dropped }
    }

    /// Deliver `event` to every subscriber. Returns how many queues accepted it.
    pub fn publish(&self, event: AgentEvent) -> usize {
        let mut inner = self.lock();
        if inner.closed {
            log::debug!("event {} for run {} published after close", event.kind.as_str(), event.run_id);
            return 0;
        }

        let mut delivered = 0;
        inner.subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                let missed = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(
                    "subscriber queue full, dropped {} event for run {} ({} missed so far)",
                    event.kind.as_str(),
                    event.run_id,
                    missed
                );
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }

    /// Signal end-of-stream to every subscriber. Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's end of the bus
pub struct Subscription {
    rx: mpsc::Receiver<AgentEvent>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    /// Next event, or `None` once the bus is closed and the queue drained
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        self.rx.try_recv().ok()
    }

    /// Events this subscriber missed because its queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drain everything until end-of-stream
    pub async fn collect(mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }

    pub fn into_stream(self) -> impl Stream<Item = AgentEvent> + Send + Unpin {
        Box::pin(futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        }))
    }
}
