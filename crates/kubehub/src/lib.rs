//! Conduit kubehub: change notifications for the messaging kinds, fed either by
//! platform watchers or by in-process channels.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use conduit_core::{Kind, ObjectKey};
use conduit_schema::Resource;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

mod channel;
mod known;
mod watcher;

pub use channel::ChannelSource;
pub use known::KnownObjects;
pub use watcher::KubeEventSource;

/// One observed change to a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Added(Resource),
    Updated { old: Resource, new: Resource },
    Deleted(Resource),
}

impl Notification {
    pub fn kind(&self) -> Kind { self.resource().kind() }

    /// The current state: the new value for updates, the last known value for deletes.
    pub fn resource(&self) -> &Resource {
        match self {
            Notification::Added(r) | Notification::Deleted(r) => r,
            Notification::Updated { new, .. } => new,
        }
    }

    pub fn key(&self) -> ObjectKey { self.resource().key() }

    pub fn label(&self) -> &'static str {
        match self {
            Notification::Added(_) => "added",
            Notification::Updated { .. } => "updated",
            Notification::Deleted(_) => "deleted",
        }
    }
}

/// Producer of notifications for one kind. `run` flips `synced` to true once the
/// initial listing has been delivered, and returns when `cancel` fires or the
/// receiver is gone.
#[async_trait]
pub trait EventSource: Send + 'static {
    fn kind(&self) -> Kind;

    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<Notification>,
        synced: watch::Sender<bool>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Platform client from the ambient kubeconfig or in-cluster service account.
pub async fn connect() -> Result<kube::Client> {
    kube::Client::try_default().await.context("creating platform client")
}
