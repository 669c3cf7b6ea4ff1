use std::sync::Arc;
use std::time::Duration;

use conduit_apply::Applier;
use conduit_core::Kind;
use conduit_events::{EventPublisher, Operation};
use conduit_kubehub::{EventSource, Notification};
use conduit_schema::Resource;
use conduit_store::ResourceStore;
use conduit_transform::Pipeline;
use conduit_validate::ResourceLookup;
use metrics::counter;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::worker::Worker;
use crate::ControllerConfig;

/// Runs one dispatcher per registered event source and a shared, bounded pool of
/// reconciliations.
pub struct ReconcileController {
    worker: Arc<Worker>,
    config: ControllerConfig,
    pending: Vec<Box<dyn EventSource>>,
    ready: Vec<(Kind, watch::Receiver<bool>)>,
    permits: Arc<Semaphore>,
    /// Sources and dispatchers.
    tasks: TaskTracker,
    /// In-flight reconciliations.
    pool: TaskTracker,
    cancel: CancellationToken,
    work_cancel: CancellationToken,
}

impl ReconcileController {
    /// The controller mirrors into, and transforms against, the pipeline's store.
    pub fn new(pipeline: Pipeline, applier: Arc<dyn Applier>, events: EventPublisher, config: ControllerConfig) -> Self {
        let store = pipeline.store().clone();
        let permits = Arc::new(Semaphore::new(config.workers.max(1)));
        Self {
            worker: Arc::new(Worker { store, pipeline, applier, resolver: None, events }),
            config,
            pending: Vec::new(),
            ready: Vec::new(),
            permits,
            tasks: TaskTracker::new(),
            pool: TaskTracker::new(),
            cancel: CancellationToken::new(),
            work_cancel: CancellationToken::new(),
        }
    }

    /// Fetch references missing from the store through `resolver` before transforming.
    /// Must be called before [`start`](Self::start).
    pub fn with_resolver(mut self, resolver: Arc<dyn ResourceLookup>) -> Self {
        if let Some(w) = Arc::get_mut(&mut self.worker) {
            w.resolver = Some(resolver);
        } else {
            warn!("controller already started; resolver ignored");
        }
        self
    }

    pub fn register(&mut self, source: Box<dyn EventSource>) {
        self.pending.push(source);
    }

    pub fn store(&self) -> &Arc<ResourceStore> { &self.worker.store }

    pub fn config(&self) -> &ControllerConfig { &self.config }

    /// Reconciliations currently running.
    pub fn in_flight(&self) -> usize { self.pool.len() }

    /// Spawn every registered source with its dispatcher. Must be called inside a Tokio runtime.
    pub fn start(&mut self) {
        for source in self.pending.drain(..) {
            let kind = source.kind();
            let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
            let (synced_tx, synced_rx) = watch::channel(false);
            let (ready_tx, ready_rx) = watch::channel(false);
            self.ready.push((kind, ready_rx));

            let cancel = self.cancel.clone();
            self.tasks.spawn(async move {
                match source.run(tx, synced_tx, cancel).await {
                    Ok(()) => debug!(%kind, "event source stopped"),
                    Err(e) => error!(%kind, error = %e, "event source failed"),
                }
            });

            let dispatcher = Dispatcher {
                kind,
                worker: self.worker.clone(),
                permits: self.permits.clone(),
                pool: self.pool.clone(),
                cancel: self.cancel.clone(),
                work_cancel: self.work_cancel.clone(),
            };
            self.tasks.spawn(dispatcher.run(rx, synced_rx, ready_tx));
            info!(%kind, "event source registered");
        }
    }

    /// True once every source delivered its initial listing and the store mirrors it.
    pub async fn wait_for_sync(&self, timeout: Duration) -> bool {
        let mut ready: Vec<_> = self.ready.iter().map(|(_, rx)| rx.clone()).collect();
        let all = async {
            for rx in ready.iter_mut() {
                if rx.wait_for(|r| *r).await.is_err() {
                    return false;
                }
            }
            true
        };
        match tokio::time::timeout(timeout, all).await {
            Ok(synced) => synced,
            Err(_) => {
                let pending: Vec<Kind> = self.ready.iter().filter(|(_, rx)| !*rx.borrow()).map(|(k, _)| *k).collect();
                warn!(?pending, timeout_ms = timeout.as_millis() as u64, "timed out waiting for initial sync");
                false
            }
        }
    }

    /// Stop sources and dispatchers, give in-flight reconciliations the grace period,
    /// then cancel what is left. Returns whether the pool drained within the grace period.
    pub async fn shutdown(&self) -> bool {
        info!(in_flight = self.pool.len(), "controller shutting down");
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.pool.close();
        let drained = tokio::time::timeout(self.config.shutdown_grace, self.pool.wait()).await.is_ok();
        if !drained {
            warn!(
                in_flight = self.pool.len(),
                grace_ms = self.config.shutdown_grace.as_millis() as u64,
                "grace period elapsed; cancelling in-flight reconciliations"
            );
            self.work_cancel.cancel();
            self.pool.wait().await;
        }
        info!(drained, "controller stopped");
        drained
    }
}

struct Dispatcher {
    kind: Kind,
    worker: Arc<Worker>,
    permits: Arc<Semaphore>,
    pool: TaskTracker,
    cancel: CancellationToken,
    work_cancel: CancellationToken,
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::Receiver<Notification>, mut synced: watch::Receiver<bool>, ready: watch::Sender<bool>) {
        let mut awaiting_sync = true;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                synced_now = async { synced.wait_for(|s| *s).await.is_ok() }, if awaiting_sync => {
                    awaiting_sync = false;
                    if synced_now {
                        // Everything from the initial listing is queued already.
                        while let Ok(n) = rx.try_recv() {
                            if !self.handle(n).await {
                                return;
                            }
                        }
                        ready.send_replace(true);
                        info!(kind = %self.kind, objects = self.worker.store.list(self.kind, None).len(), "initial sync complete");
                    }
                }
                next = rx.recv() => match next {
                    Some(n) => {
                        if !self.handle(n).await {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!(kind = %self.kind, "dispatcher stopped");
    }

    /// Mirror into the store, then hand reconcilable changes to the pool.
    /// Returns false once the controller is shutting down.
    async fn handle(&self, n: Notification) -> bool {
        counter!("notifications_total", 1u64, "kind" => self.kind.as_str(), "type" => n.label());
        match n {
            Notification::Added(r) => self.submit(Operation::Create, r).await,
            Notification::Updated { new, .. } => self.submit(Operation::Update, new).await,
            Notification::Deleted(r) => {
                let removed = self.worker.store.remove(&r);
                debug!(key = %r.key(), removed, "mirrored delete");
                if self.worker.reconciles(r.kind()) {
                    self.worker.record_delete(&r);
                }
                true
            }
        }
    }

    async fn submit(&self, op: Operation, resource: Resource) -> bool {
        let stored = self.worker.store.upsert(resource);
        if !self.worker.reconciles(stored.kind()) {
            return true;
        }
        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return false,
            p = self.permits.clone().acquire_owned() => match p {
                Ok(p) => p,
                Err(_) => return false,
            },
        };
        let worker = self.worker.clone();
        let work_cancel = self.work_cancel.clone();
        self.pool.spawn(async move {
            let _permit = permit;
            let key = stored.key();
            tokio::select! {
                _ = work_cancel.cancelled() => {
                    counter!("reconcile_cancelled_total", 1u64);
                    warn!(%key, "reconcile cancelled at shutdown");
                }
                _ = worker.reconcile(op, stored) => {}
            }
        });
        true
    }
}
