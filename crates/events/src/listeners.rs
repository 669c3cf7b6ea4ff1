use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::{EventListener, Phase, ReconcileEvent};

/// Writes `RECONCILIATION_START` / `RECONCILIATION_END` lines under the `audit` target.
#[derive(Debug, Default)]
pub struct AuditLog;

impl EventListener for AuditLog {
    fn name(&self) -> &str { "audit-log" }

    fn on_event(&self, ev: &ReconcileEvent) -> anyhow::Result<()> {
        match ev.phase {
            Phase::Before => {
                info!(target: "audit", kind = %ev.kind, ns = %ev.namespace, name = %ev.name, "RECONCILIATION_START: {}", ev)
            }
            Phase::After if ev.is_success() => {
                info!(target: "audit", kind = %ev.kind, ns = %ev.namespace, name = %ev.name, "RECONCILIATION_END: {}", ev)
            }
            Phase::After => {
                warn!(target: "audit", kind = %ev.kind, ns = %ev.namespace, name = %ev.name, "RECONCILIATION_END: {}", ev)
            }
        }
        Ok(())
    }
}

/// Bounded in-memory ring of the most recent events.
pub struct EventLog {
    cap: usize,
    events: Mutex<VecDeque<ReconcileEvent>>,
}

impl EventLog {
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1), events: Mutex::new(VecDeque::new()) }
    }

    pub fn events(&self) -> Vec<ReconcileEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    pub fn len(&self) -> usize { self.events.lock().unwrap_or_else(PoisonError::into_inner).len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Poll until at least `n` events arrived or `timeout` elapsed.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.len() >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl EventListener for EventLog {
    fn name(&self) -> &str { "event-log" }

    fn on_event(&self, ev: &ReconcileEvent) -> anyhow::Result<()> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.len() == self.cap {
            events.pop_front();
        }
        events.push_back(ev.clone());
        Ok(())
    }
}
