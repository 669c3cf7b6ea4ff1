use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::ReconcileEvent;

/// Consumer of lifecycle events. Runs on its own task; errors and panics stay there.
pub trait EventListener: Send + Sync + 'static {
    fn name(&self) -> &str { "listener" }
    fn on_event(&self, event: &ReconcileEvent) -> anyhow::Result<()>;
}

struct Sink {
    name: String,
    tx: mpsc::Sender<Arc<ReconcileEvent>>,
}

/// Fans events out to listeners over bounded channels. Publishing never waits on a listener.
#[derive(Clone)]
pub struct EventPublisher {
    sinks: Arc<RwLock<Vec<Sink>>>,
    capacity: usize,
}

impl Default for EventPublisher {
    fn default() -> Self { Self::new() }
}

impl EventPublisher {
    /// Queue depth per listener comes from `CONDUIT_EVENT_QUEUE` (default 1024).
    pub fn new() -> Self {
        let cap = std::env::var("CONDUIT_EVENT_QUEUE").ok().and_then(|s| s.parse().ok()).unwrap_or(1024);
        Self::with_capacity(cap)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { sinks: Arc::new(RwLock::new(Vec::new())), capacity: capacity.max(1) }
    }

    /// Register a listener and spawn the task that feeds it. Must be called inside a Tokio runtime.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::channel::<Arc<ReconcileEvent>>(self.capacity);
        let name = listener.name().to_string();
        self.sinks.write().unwrap_or_else(PoisonError::into_inner).push(Sink { name: name.clone(), tx });
        tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                match catch_unwind(AssertUnwindSafe(|| listener.on_event(&ev))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(listener = %name, error = %e, event = %ev, "event listener failed"),
                    Err(_) => error!(listener = %name, event = %ev, "event listener panicked"),
                }
            }
            debug!(listener = %name, "event listener stopped");
        })
    }

    pub fn publish(&self, event: ReconcileEvent) {
        let ev = Arc::new(event);
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        for sink in sinks.iter() {
            match sink.tx.try_send(Arc::clone(&ev)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    counter!("events_dropped_total", 1u64);
                    warn!(listener = %sink.name, event = %ev, "listener queue full; event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(listener = %sink.name, "listener gone");
                }
            }
        }
        counter!("events_published_total", 1u64);
    }

    pub fn listener_count(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop every listener channel. Listener tasks finish once they drain what is queued.
    pub fn close(&self) {
        self.sinks.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
