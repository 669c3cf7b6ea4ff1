use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use conduit_api::{load_tls, router, AdmissionHandler, ServerConfig};
use conduit_apply::{CliDriver, Credentials};
use conduit_controller::{ControllerConfig, ReconcileController};
use conduit_core::{ConduitError, Kind};
use conduit_events::{AuditLog, EventListener, EventPublisher};
use conduit_kubehub::KubeEventSource;
use conduit_persist::SqliteAuditTrail;
use conduit_store::ResourceStore;
use conduit_transform::Pipeline;
use conduit_validate::{KubeLookup, OwnershipValidator, ResourceLookup, StoreLookup};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Serve plain HTTP instead of TLS (local development only)
    #[arg(long = "insecure", action = ArgAction::SetTrue)]
    insecure: bool,
    /// Run the admission webhook only
    #[arg(long = "no-reconcile", action = ArgAction::SetTrue)]
    no_reconcile: bool,
    /// Pass --dry-run to every tool invocation; credentials become optional
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Resolve admission references from the watched in-memory store instead of live API reads
    #[arg(long = "standalone", action = ArgAction::SetTrue, conflicts_with = "no_reconcile")]
    standalone: bool,
    /// Seconds to wait for every watch to deliver its initial listing
    #[arg(long = "sync-timeout", default_value_t = 60)]
    sync_timeout: u64,
    /// SQLite file for the reconcile audit trail
    #[arg(long = "audit-db", env = "CONDUIT_AUDIT_DB")]
    audit_db: Option<PathBuf>,
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
    token.cancel();
}

pub async fn run(args: ServeArgs, namespace: Option<String>) -> Result<()> {
    // Configuration failures abort before anything starts.
    let server_config = ServerConfig::from_env(args.insecure);
    if let Some(paths) = &server_config.tls {
        load_tls(paths).await?;
    }
    let credentials = if args.no_reconcile {
        None
    } else if args.dry_run {
        Credentials::load().map_err(|e| warn!(error = %e, "dry-run without credentials")).ok()
    } else {
        Some(Credentials::load()?)
    };

    let client = conduit_kubehub::connect().await?;
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let events = EventPublisher::new();
    events.subscribe(Arc::new(AuditLog));
    if let Some(path) = &args.audit_db {
        let trail = SqliteAuditTrail::open(&path.to_string_lossy())?;
        events.subscribe(Arc::new(trail) as Arc<dyn EventListener>);
        info!(path = %path.display(), "audit trail enabled");
    }

    let store = Arc::new(ResourceStore::new());
    let controller = if args.no_reconcile {
        None
    } else {
        let config = ControllerConfig::from_env();
        let driver = CliDriver::from_env(credentials).with_dry_run(args.dry_run);
        let mut controller =
            ReconcileController::new(Pipeline::standard(store.clone()), Arc::new(driver), events.clone(), config.clone())
                .with_resolver(Arc::new(KubeLookup::new(client.clone())));
        for kind in Kind::ALL.into_iter().filter(|k| *k != Kind::MessagingDeclaration) {
            let mut source = KubeEventSource::new(client.clone(), kind).with_resync(config.resync);
            if let Some(ns) = &namespace {
                source = source.namespaced(ns.clone());
            }
            controller.register(Box::new(source));
        }
        controller.start();
        let timeout = Duration::from_secs(args.sync_timeout);
        if !controller.wait_for_sync(timeout).await {
            controller.shutdown().await;
            events.close();
            return Err(ConduitError::Configuration(format!("initial sync did not complete within {}s", args.sync_timeout)))
                .context("starting controller");
        }
        info!(workers = config.workers, objects = store.len(), dry_run = args.dry_run, "controller running");
        Some(controller)
    };

    let lookup: Arc<dyn ResourceLookup> = if args.standalone {
        Arc::new(StoreLookup::new(store.clone()))
    } else {
        Arc::new(KubeLookup::new(client))
    };
    let handler = Arc::new(AdmissionHandler::new(OwnershipValidator::new(lookup)));
    let served = conduit_api::serve(router(handler), server_config, shutdown.clone()).await;
    // Server failures also stop the controller.
    shutdown.cancel();

    if let Some(controller) = controller {
        if !controller.shutdown().await {
            warn!("some reconciliations were cancelled at shutdown");
        }
    }
    events.close();
    served
}
