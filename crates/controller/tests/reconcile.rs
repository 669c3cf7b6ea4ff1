#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conduit_apply::{Applier, CliResult};
use conduit_controller::{ControllerConfig, ReconcileController};
use conduit_core::Kind;
use conduit_events::{EventListener, EventLog, EventPublisher, Operation, Outcome, Phase, ReconcileEvent};
use conduit_kubehub::{ChannelSource, EventSource, Notification};
use conduit_schema::{
    ApplicationService, ApplicationServiceSpec, Resource, Scope, ScopeSpec, ServiceAccount, ServiceAccountSpec, Topic,
    TopicSpec, VirtualCluster, VirtualClusterSpec,
};
use conduit_store::ResourceStore;
use conduit_transform::{Pipeline, TargetResource};
use conduit_validate::StoreLookup;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const NS: &str = "team-a";

#[derive(Default)]
struct FakeApplier {
    applied: Mutex<Vec<TargetResource>>,
    fail_with: Option<String>,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeApplier {
    fn applied_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.applied.lock().unwrap().iter().map(|t| t.name().to_string()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Applier for FakeApplier {
    async fn apply(&self, target: &TargetResource) -> CliResult {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.applied.lock().unwrap().push(target.clone());
        match &self.fail_with {
            Some(err) => CliResult { exit_code: 1, stdout: String::new(), stderr: err.clone() },
            None => CliResult { exit_code: 0, stdout: "applied".into(), stderr: String::new() },
        }
    }
}

fn ns<R: Into<Resource>>(r: R) -> Resource { r.into().with_namespace(NS) }

fn app() -> Resource { ns(ApplicationService::new("app1", ApplicationServiceSpec { name: "app1".into() })) }

fn cluster(name: &str) -> Resource {
    ns(VirtualCluster::new(
        name,
        VirtualClusterSpec { cluster_id: format!("{}-id", name), application_service_ref: "app1".into(), auth_type: None },
    ))
}

fn account() -> Resource {
    ns(ServiceAccount::new(
        "sa1",
        ServiceAccountSpec {
            name: "sa1".into(),
            dn: vec!["CN=sa1,OU=team".into()],
            cluster_ref: "c1".into(),
            application_service_ref: "app1".into(),
        },
    ))
}

fn topic(name: &str, service_ref: &str) -> Resource {
    ns(Topic::new(
        name,
        TopicSpec {
            service_ref: service_ref.into(),
            name: format!("{}.v1", name),
            partitions: 3,
            replication_factor: 1,
            config: Default::default(),
            application_service_ref: "app1".into(),
        },
    ))
}

struct Harness {
    controller: ReconcileController,
    applier: Arc<FakeApplier>,
    log: Arc<EventLog>,
}

fn harness(store: Arc<ResourceStore>, applier: FakeApplier, config: ControllerConfig) -> Harness {
    let applier = Arc::new(applier);
    let events = EventPublisher::with_capacity(256);
    let log = Arc::new(EventLog::new(256));
    events.subscribe(log.clone() as Arc<dyn EventListener>);
    let controller = ReconcileController::new(Pipeline::standard(store), applier.clone(), events, config);
    Harness { controller, applier, log }
}

fn events_for(log: &EventLog, name: &str) -> Vec<ReconcileEvent> {
    log.events().into_iter().filter(|e| e.name == name).collect()
}

fn seeded_store() -> Arc<ResourceStore> {
    let store = Arc::new(ResourceStore::new());
    for r in [app(), cluster("c1"), account()] {
        store.upsert(r);
    }
    store
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn initial_listing_is_mirrored_and_applied() {
    let mut h = harness(seeded_store(), FakeApplier::default(), ControllerConfig::default());
    let (_push, source) = ChannelSource::new(Kind::Topic, 8);
    h.controller.register(Box::new(source.with_initial(vec![topic("t1", "sa1")])));
    h.controller.start();

    assert!(h.controller.wait_for_sync(Duration::from_secs(5)).await);
    let stored = h.controller.store().get(Kind::Topic, NS, "t1").expect("mirrored before sync reports");
    assert!(stored.uid().is_some());

    assert!(h.log.wait_for(2, Duration::from_secs(5)).await);
    let evs = events_for(&h.log, "t1");
    assert_eq!(evs[0].phase, Phase::Before);
    assert_eq!(evs[0].operation, Operation::Create);
    assert_eq!(evs[1].result, Some(Outcome::Success));
    assert_eq!(evs[1].application.as_deref(), Some("app1"));

    let applied = h.applier.applied.lock().unwrap().clone();
    match &applied[..] {
        [TargetResource::Topic(t)] => assert_eq!(t.metadata.cluster.as_deref(), Some("c1-id")),
        other => panic!("unexpected applies {:?}", other),
    }
    assert!(h.controller.shutdown().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn updates_reconcile_and_bump_store_version() {
    let mut h = harness(seeded_store(), FakeApplier::default(), ControllerConfig::default());
    let (push, source) = ChannelSource::new(Kind::VirtualCluster, 8);
    h.controller.register(Box::new(source));
    h.controller.start();
    assert!(h.controller.wait_for_sync(Duration::from_secs(5)).await);

    let before = h.controller.store().get(Kind::VirtualCluster, NS, "c1").unwrap();
    push.send(Notification::Updated { old: cluster("c1"), new: cluster("c1") }).await.unwrap();
    assert!(h.log.wait_for(2, Duration::from_secs(5)).await);
    let after = h.controller.store().get(Kind::VirtualCluster, NS, "c1").unwrap();
    assert_ne!(before.resource_version(), after.resource_version());
    assert_eq!(before.uid(), after.uid());
    assert_eq!(events_for(&h.log, "c1")[0].operation, Operation::Update);
    assert_eq!(h.applier.applied_names(), vec!["c1-id".to_string()]);
    h.controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transform_failure_is_reported_and_does_not_block_others() {
    let mut h = harness(seeded_store(), FakeApplier::default(), ControllerConfig::default());
    let (_push, source) = ChannelSource::new(Kind::Topic, 8);
    h.controller.register(Box::new(source.with_initial(vec![topic("orphan", "missing-sa"), topic("t2", "sa1")])));
    h.controller.start();

    assert!(h.log.wait_for(4, Duration::from_secs(5)).await);
    let orphan = events_for(&h.log, "orphan");
    assert_eq!(orphan[1].result, Some(Outcome::Failure));
    let msg = orphan[1].message.clone().unwrap();
    assert!(msg.starts_with("Transform failed: Cannot resolve"), "{}", msg);
    assert!(msg.contains("missing-sa"));
    assert_eq!(orphan[1].reason.as_deref(), Some("TransformFailed"));

    assert_eq!(events_for(&h.log, "t2")[1].result, Some(Outcome::Success));
    assert_eq!(h.applier.applied_names(), vec!["t2.v1".to_string()]);
    h.controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn apply_failure_carries_tool_error() {
    let applier = FakeApplier { fail_with: Some("gateway unreachable".into()), ..Default::default() };
    let mut h = harness(seeded_store(), applier, ControllerConfig::default());
    let (_push, source) = ChannelSource::new(Kind::ServiceAccount, 8);
    h.controller.register(Box::new(source.with_initial(vec![account()])));
    h.controller.start();

    assert!(h.log.wait_for(2, Duration::from_secs(5)).await);
    let evs = events_for(&h.log, "sa1");
    assert_eq!(evs[1].result, Some(Outcome::Failure));
    assert_eq!(evs[1].message.as_deref(), Some("Apply failed: gateway unreachable"));
    assert_eq!(evs[1].error_details.as_deref(), Some("exit code 1"));
    h.controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deletes_are_mirrored_and_reported_without_apply() {
    let mut h = harness(seeded_store(), FakeApplier::default(), ControllerConfig::default());
    let (push, source) = ChannelSource::new(Kind::VirtualCluster, 8);
    h.controller.register(Box::new(source));
    h.controller.start();
    assert!(h.controller.wait_for_sync(Duration::from_secs(5)).await);

    push.send(Notification::Deleted(cluster("c1"))).await.unwrap();
    assert!(h.log.wait_for(2, Duration::from_secs(5)).await);
    assert!(h.controller.store().get(Kind::VirtualCluster, NS, "c1").is_none());
    let evs = events_for(&h.log, "c1");
    assert!(evs.iter().all(|e| e.operation == Operation::Delete));
    assert_eq!(evs[1].result, Some(Outcome::Success));
    assert!(h.applier.applied_names().is_empty());
    h.controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_reconciled_kinds_are_only_mirrored() {
    let mut h = harness(seeded_store(), FakeApplier::default(), ControllerConfig::default());
    let scope = ns(Scope::new(
        "s1",
        ScopeSpec { application_service_ref: "app1".into(), cluster_ref: Some("c1".into()), service_account_ref: None, group_ref: None },
    ));
    let (_push, source) = ChannelSource::new(Kind::Scope, 8);
    h.controller.register(Box::new(source.with_initial(vec![scope])));
    h.controller.start();

    assert!(h.controller.wait_for_sync(Duration::from_secs(5)).await);
    assert!(h.controller.store().get(Kind::Scope, NS, "s1").is_some());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.log.is_empty());
    assert!(h.applier.applied_names().is_empty());
    h.controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_references_are_fetched_and_cached() {
    let platform = seeded_store();
    let local = Arc::new(ResourceStore::new());
    let applier = Arc::new(FakeApplier::default());
    let events = EventPublisher::with_capacity(64);
    let log = Arc::new(EventLog::new(64));
    events.subscribe(log.clone() as Arc<dyn EventListener>);
    let mut controller =
        ReconcileController::new(Pipeline::standard(local.clone()), applier.clone(), events, ControllerConfig::default())
            .with_resolver(Arc::new(StoreLookup::new(platform)));
    let (_push, source) = ChannelSource::new(Kind::Topic, 8);
    controller.register(Box::new(source.with_initial(vec![topic("t1", "sa1")])));
    controller.start();

    assert!(log.wait_for(2, Duration::from_secs(5)).await);
    assert_eq!(events_for(&log, "t1")[1].result, Some(Outcome::Success));
    assert!(local.get(Kind::ServiceAccount, NS, "sa1").is_some());
    assert!(local.get(Kind::VirtualCluster, NS, "c1").is_some());
    assert!(local.get(Kind::ApplicationService, NS, "app1").is_none(), "only the transform chain is fetched");
    controller.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pool_bounds_concurrency() {
    let applier = FakeApplier { delay: Duration::from_millis(50), ..Default::default() };
    let config = ControllerConfig { workers: 2, ..Default::default() };
    let mut h = harness(Arc::new(ResourceStore::new()), applier, config);
    let clusters: Vec<_> = (0..6).map(|i| cluster(&format!("c{}", i))).collect();
    let (_push, source) = ChannelSource::new(Kind::VirtualCluster, 8);
    h.controller.register(Box::new(source.with_initial(clusters)));
    h.controller.start();

    assert!(h.log.wait_for(12, Duration::from_secs(10)).await);
    assert_eq!(h.applier.applied_names().len(), 6);
    let peak = h.applier.peak.load(Ordering::SeqCst);
    assert!(peak <= 2 && peak >= 1, "peak concurrency {}", peak);
    assert!(h.controller.shutdown().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_cancels_after_grace_period() {
    let applier = FakeApplier { delay: Duration::from_secs(30), ..Default::default() };
    let config = ControllerConfig { workers: 1, shutdown_grace: Duration::from_millis(100), ..Default::default() };
    let mut h = harness(Arc::new(ResourceStore::new()), applier, config);
    let (_push, source) = ChannelSource::new(Kind::VirtualCluster, 8);
    h.controller.register(Box::new(source.with_initial(vec![cluster("slow")])));
    h.controller.start();

    assert!(h.log.wait_for(1, Duration::from_secs(5)).await);
    assert_eq!(h.controller.in_flight(), 1);
    let t0 = std::time::Instant::now();
    assert!(!h.controller.shutdown().await);
    assert!(t0.elapsed() < Duration::from_secs(5));
    assert_eq!(h.controller.in_flight(), 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(events_for(&h.log, "slow").len(), 1, "cancelled reconcile publishes no AFTER event");
}

struct SilentSource;

#[async_trait]
impl EventSource for SilentSource {
    fn kind(&self) -> Kind { Kind::Topic }

    async fn run(
        self: Box<Self>,
        _tx: mpsc::Sender<Notification>,
        _synced: watch::Sender<bool>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        cancel.cancelled().await;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_wait_is_bounded() {
    let mut h = harness(Arc::new(ResourceStore::new()), FakeApplier::default(), ControllerConfig::default());
    h.controller.register(Box::new(SilentSource));
    h.controller.start();
    assert!(!h.controller.wait_for_sync(Duration::from_millis(100)).await);
    h.controller.shutdown().await;
}
