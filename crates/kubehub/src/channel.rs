use anyhow::Result;
use async_trait::async_trait;
use conduit_core::Kind;
use conduit_schema::Resource;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{EventSource, KnownObjects, Notification};

/// In-process source: an initial listing plus whatever is pushed through the paired sender.
pub struct ChannelSource {
    kind: Kind,
    initial: Vec<Resource>,
    rx: mpsc::Receiver<Notification>,
}

impl ChannelSource {
    pub fn new(kind: Kind, capacity: usize) -> (mpsc::Sender<Notification>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { kind, initial: Vec::new(), rx })
    }

    /// Objects delivered as additions before the source reports synced.
    pub fn with_initial(mut self, initial: Vec<Resource>) -> Self {
        self.initial = initial;
        self
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    fn kind(&self) -> Kind { self.kind }

    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<Notification>,
        synced: watch::Sender<bool>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let Self { kind, initial, mut rx } = *self;
        let mut known = KnownObjects::new();
        for n in known.restarted(initial) {
            if tx.send(n).await.is_err() {
                return Ok(());
            }
        }
        synced.send_replace(true);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(n) => {
                        if tx.send(n).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!(%kind, "channel source stopped");
        Ok(())
    }
}
