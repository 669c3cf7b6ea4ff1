//! Conduit events: lifecycle records emitted around every reconcile attempt and guarded
//! store write, plus the channel-based publisher that delivers them to listeners.

#![forbid(unsafe_code)]

mod event;
mod listeners;
mod publisher;

pub use event::{Operation, Outcome, Phase, ReconcileEvent};
pub use listeners::{AuditLog, EventLog};
pub use publisher::{EventListener, EventPublisher};
