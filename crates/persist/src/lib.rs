//! Conduit persistence: a small SQLite audit trail of reconcile events, kept per resource.

#![forbid(unsafe_code)]

use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use conduit_core::ObjectKey;
use conduit_events::{EventListener, ReconcileEvent};
use metrics::{counter, histogram};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

const DEFAULT_KEEP: usize = 50;

fn keep_per_resource() -> usize {
    std::env::var("CONDUIT_AUDIT_KEEP")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_KEEP)
}

pub trait AuditStore {
    fn put_event(&self, event: &ReconcileEvent) -> Result<()>;
    /// Newest first.
    fn recent(&self, key: &ObjectKey, limit: Option<usize>) -> Result<Vec<ReconcileEvent>>;
}

/// SQLite-backed audit trail. Writes are synchronous; as a listener they run under
/// `block_in_place` when a multi-thread runtime is driving the publisher.
pub struct SqliteAuditTrail {
    db: Mutex<rusqlite::Connection>,
    keep: usize,
}

impl SqliteAuditTrail {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("CONDUIT_AUDIT_DB").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS reconcile_events (
                key    TEXT NOT NULL,
                ts     INTEGER NOT NULL,
                phase  TEXT NOT NULL,
                result TEXT,
                event  TEXT NOT NULL
            )",
            [],
        )
        .context("creating reconcile_events table")?;
        db.execute("CREATE INDEX IF NOT EXISTS idx_reconcile_events_key_ts ON reconcile_events(key, ts DESC)", [])
            .ok();
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: Mutex::new(db), keep: keep_per_resource() })
    }

    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }
}

impl AuditStore for SqliteAuditTrail {
    fn put_event(&self, event: &ReconcileEvent) -> Result<()> {
        let started = std::time::Instant::now();
        let key = event.key().to_string();
        let body = serde_json::to_string(event).context("encoding event")?;
        let mut db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO reconcile_events(key, ts, phase, result, event) VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                &key,
                event.timestamp.timestamp_millis(),
                event.phase.as_str(),
                event.result.map(|r| r.as_str()),
                &body,
            ),
        )?;
        // Keep the latest `keep` rows per resource.
        tx.execute(
            "DELETE FROM reconcile_events
             WHERE key = ?1
               AND rowid NOT IN (
                   SELECT rowid FROM reconcile_events WHERE key = ?1 ORDER BY ts DESC, rowid DESC LIMIT ?2
               )",
            (&key, self.keep as i64),
        )?;
        tx.commit()?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    fn recent(&self, key: &ObjectKey, limit: Option<usize>) -> Result<Vec<ReconcileEvent>> {
        let started = std::time::Instant::now();
        let cap = limit.unwrap_or(self.keep);
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt =
            db.prepare("SELECT event FROM reconcile_events WHERE key = ?1 ORDER BY ts DESC, rowid DESC LIMIT ?2")?;
        let mut rows = stmt.query((key.to_string(), cap as i64))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            out.push(serde_json::from_str(&body).context("decoding stored event")?);
        }
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }
}

impl EventListener for SqliteAuditTrail {
    fn name(&self) -> &str { "sqlite-audit" }

    fn on_event(&self, event: &ReconcileEvent) -> Result<()> {
        let multi_thread = Handle::try_current().map(|h| h.runtime_flavor() == RuntimeFlavor::MultiThread).unwrap_or(false);
        if multi_thread {
            tokio::task::block_in_place(|| self.put_event(event))?;
        } else {
            self.put_event(event)?;
        }
        debug!(key = %event.key(), phase = %event.phase, "audit event stored");
        Ok(())
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".conduit");
        let _ = std::fs::create_dir_all(&p);
        p.push("audit.db");
        return p.to_string_lossy().to_string();
    }
    "conduit-audit.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::Kind;
    use conduit_events::{Operation, Outcome};

    fn temp_db(dir: &tempfile::TempDir) -> String {
        dir.path().join("audit.db").to_string_lossy().to_string()
    }

    #[test]
    fn put_get_rotate() {
        let dir = tempfile::tempdir().unwrap();
        let s = SqliteAuditTrail::open(&temp_db(&dir)).unwrap().with_keep(3);
        let key = ObjectKey::new(Kind::Topic, "team-a", "orders");
        for i in 0..5 {
            let ev = ReconcileEvent::after(Operation::Update, &key, Some("app1"), Outcome::Success, format!("applied {}", i))
                .with_resource_version(i.to_string());
            s.put_event(&ev).unwrap();
        }
        let rows = s.recent(&key, None).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].resource_version.as_deref(), Some("4"));
        assert_eq!(rows[1].resource_version.as_deref(), Some("3"));
        assert_eq!(rows[2].resource_version.as_deref(), Some("2"));
        assert_eq!(rows[0].message.as_deref(), Some("applied 4"));
    }

    #[test]
    fn retention_is_per_resource() {
        let dir = tempfile::tempdir().unwrap();
        let s = SqliteAuditTrail::open(&temp_db(&dir)).unwrap().with_keep(2);
        let a = ObjectKey::new(Kind::Topic, "ns", "a");
        let b = ObjectKey::new(Kind::VirtualCluster, "ns", "b");
        for _ in 0..4 {
            s.put_event(&ReconcileEvent::before(Operation::Create, &a, None)).unwrap();
        }
        s.put_event(&ReconcileEvent::before(Operation::Create, &b, Some("app1"))).unwrap();
        assert_eq!(s.recent(&a, None).unwrap().len(), 2);
        let only_b = s.recent(&b, Some(10)).unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].application.as_deref(), Some("app1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn listener_writes_from_a_worker_thread() {
        let dir = tempfile::tempdir().unwrap();
        let s = std::sync::Arc::new(SqliteAuditTrail::open(&temp_db(&dir)).unwrap());
        let key = ObjectKey::new(Kind::Topic, "ns", "t1");
        let ev = ReconcileEvent::before(Operation::Create, &key, Some("app1"));
        let trail = s.clone();
        tokio::spawn(async move { trail.on_event(&ev) }).await.unwrap().unwrap();
        assert_eq!(s.recent(&key, None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listener_writes_inline_on_current_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let s = SqliteAuditTrail::open(&temp_db(&dir)).unwrap();
        let key = ObjectKey::new(Kind::Topic, "ns", "t1");
        s.on_event(&ReconcileEvent::before(Operation::Create, &key, None)).unwrap();
        s.on_event(&ReconcileEvent::after(Operation::Create, &key, None, Outcome::Success, "ok")).unwrap();
        assert_eq!(s.recent(&key, None).unwrap().len(), 2);
    }

    #[test]
    fn listener_writes_outside_a_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let s = SqliteAuditTrail::open(&temp_db(&dir)).unwrap();
        let key = ObjectKey::new(Kind::Scope, "ns", "s1");
        s.on_event(&ReconcileEvent::before(Operation::Delete, &key, None)).unwrap();
        assert_eq!(s.recent(&key, None).unwrap().len(), 1);
    }
}
