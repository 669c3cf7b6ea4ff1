use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use conduit_core::Kind;
use conduit_schema::{api_resource, Resource};
use futures::StreamExt;
use kube::{
    api::Api,
    core::DynamicObject,
    runtime::{watcher, watcher::Event, WatchStreamExt},
    Client,
};
use metrics::counter;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{EventSource, KnownObjects, Notification};

const DEFAULT_RESYNC: Duration = Duration::from_secs(30);

/// List+watch of one kind on the platform API, with periodic re-delivery of known objects.
pub struct KubeEventSource {
    client: Client,
    kind: Kind,
    namespace: Option<String>,
    resync: Duration,
}

impl KubeEventSource {
    pub fn new(client: Client, kind: Kind) -> Self {
        Self { client, kind, namespace: None, resync: DEFAULT_RESYNC }
    }

    pub fn namespaced(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Zero disables resync.
    pub fn with_resync(mut self, resync: Duration) -> Self {
        self.resync = resync;
        self
    }

    fn api(&self) -> Api<DynamicObject> {
        let ar = api_resource(self.kind);
        match &self.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

fn decode(kind: Kind, obj: &DynamicObject) -> Option<Resource> {
    let decoded = serde_json::to_value(obj).and_then(|v| Resource::from_value(kind, v));
    match decoded {
        Ok(r) => Some(r),
        Err(e) => {
            counter!("watch_decode_errors_total", 1u64, "kind" => kind.as_str());
            warn!(%kind, name = ?obj.metadata.name, ns = ?obj.metadata.namespace, error = %e, "skipping undecodable object");
            None
        }
    }
}

#[async_trait]
impl EventSource for KubeEventSource {
    fn kind(&self) -> Kind { self.kind }

    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<Notification>,
        synced: watch::Sender<bool>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let kind = self.kind;
        let stream = watcher::watcher(self.api(), watcher::Config::default()).default_backoff();
        futures::pin_mut!(stream);
        let mut known = KnownObjects::new();
        let resync_enabled = !self.resync.is_zero();
        let period = self.resync.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(%kind, ns = ?self.namespace, "watcher started");

        loop {
            let batch: Vec<Notification> = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick(), if resync_enabled => {
                    debug!(%kind, count = known.len(), "resync");
                    known.resync()
                }
                ev = stream.next() => match ev {
                    None => {
                        warn!(%kind, "watcher stream ended");
                        break;
                    }
                    Some(Err(e)) => {
                        counter!("watch_errors_total", 1u64, "kind" => kind.as_str());
                        warn!(%kind, error = %e, "watch error; backing off");
                        continue;
                    }
                    Some(Ok(Event::Applied(o))) => decode(kind, &o).map(|r| known.applied(r)).into_iter().collect(),
                    Some(Ok(Event::Deleted(o))) => decode(kind, &o).map(|r| known.deleted(r)).into_iter().collect(),
                    Some(Ok(Event::Restarted(list))) => {
                        debug!(%kind, count = list.len(), "watch restart");
                        let listed = list.iter().filter_map(|o| decode(kind, o)).collect();
                        let out = known.restarted(listed);
                        for n in out {
                            if tx.send(n).await.is_err() {
                                return Ok(());
                            }
                        }
                        synced.send_replace(true);
                        continue;
                    }
                },
            };
            for n in batch {
                if tx.send(n).await.is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
