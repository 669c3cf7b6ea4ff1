//! Conduit controller: mirrors watched resources into the store and applies their
//! transformed form through a bounded worker pool, publishing lifecycle events
//! around every attempt.

#![forbid(unsafe_code)]

use std::time::Duration;

mod controller;
mod worker;

pub use controller::ReconcileController;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Concurrent reconciliations.
    pub workers: usize,
    /// Per-kind notification queue between a source and its dispatcher.
    pub queue_capacity: usize,
    /// How long shutdown waits for in-flight reconciliations before cancelling them.
    pub shutdown_grace: Duration,
    /// Period at which platform sources re-deliver known objects.
    pub resync: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { workers: 4, queue_capacity: 256, shutdown_grace: Duration::from_secs(10), resync: Duration::from_secs(30) }
    }
}

impl ControllerConfig {
    /// Defaults overridden by `CONDUIT_WORKERS`, `CONDUIT_QUEUE_CAPACITY`,
    /// `CONDUIT_SHUTDOWN_GRACE_SECS` and `CONDUIT_RESYNC_SECS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            workers: env_or("CONDUIT_WORKERS", d.workers).max(1),
            queue_capacity: env_or("CONDUIT_QUEUE_CAPACITY", d.queue_capacity).max(1),
            shutdown_grace: Duration::from_secs(env_or("CONDUIT_SHUTDOWN_GRACE_SECS", d.shutdown_grace.as_secs())),
            resync: Duration::from_secs(env_or("CONDUIT_RESYNC_SECS", d.resync.as_secs())),
        }
    }
}
