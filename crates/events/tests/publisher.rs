#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conduit_core::{Kind, ObjectKey};
use conduit_events::{AuditLog, EventListener, EventLog, EventPublisher, Operation, Outcome, ReconcileEvent};

struct Failing(AtomicUsize);

impl EventListener for Failing {
    fn name(&self) -> &str { "failing" }
    fn on_event(&self, _ev: &ReconcileEvent) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("listener exploded")
    }
}

struct Panicking;

impl EventListener for Panicking {
    fn on_event(&self, _ev: &ReconcileEvent) -> anyhow::Result<()> {
        panic!("listener panicked")
    }
}

fn ev(n: usize) -> ReconcileEvent {
    ReconcileEvent::before(Operation::Create, &ObjectKey::new(Kind::Topic, "ns", format!("t{}", n)), Some("app1"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_listeners_do_not_starve_others() {
    let publisher = EventPublisher::with_capacity(64);
    let failing = Arc::new(Failing(AtomicUsize::new(0)));
    let log = Arc::new(EventLog::new(100));
    publisher.subscribe(failing.clone());
    publisher.subscribe(Arc::new(Panicking));
    publisher.subscribe(Arc::new(AuditLog));
    publisher.subscribe(log.clone());
    assert_eq!(publisher.listener_count(), 4);

    for i in 0..5 {
        publisher.publish(ev(i));
    }
    let key = ObjectKey::new(Kind::Topic, "ns", "t0");
    publisher.publish(ReconcileEvent::after(Operation::Create, &key, Some("app1"), Outcome::Failure, "boom"));

    assert!(log.wait_for(6, Duration::from_secs(2)).await);
    let events = log.events();
    assert_eq!(events[0].name, "t0");
    assert_eq!(events[5].result, Some(Outcome::Failure));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(failing.0.load(Ordering::SeqCst), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn event_log_is_bounded() {
    let publisher = EventPublisher::with_capacity(64);
    let log = Arc::new(EventLog::new(3));
    publisher.subscribe(log.clone());
    for i in 0..10 {
        publisher.publish(ev(i));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    let names: Vec<_> = log.events().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["t7", "t8", "t9"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_stops_listener_tasks() {
    let publisher = EventPublisher::with_capacity(8);
    let handle = publisher.subscribe(Arc::new(EventLog::new(8)));
    publisher.close();
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    assert_eq!(publisher.listener_count(), 0);
    // publishing without listeners is a no-op
    publisher.publish(ev(1));
}
