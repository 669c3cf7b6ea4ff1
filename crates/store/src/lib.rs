//! Conduit store: versioned in-RAM index of resources keyed by `(kind, namespace, name)`.
//!
//! Readers load an immutable snapshot through `ArcSwap` and never block. Writers
//! serialize on a single writer lock, which also owns the resourceVersion counter, and
//! publish a fresh snapshot per mutation. Every publish bumps an epoch announced on a
//! `watch` channel.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use conduit_core::{ConduitError, Kind, ObjectKey, Result};
use conduit_schema::Resource;
use metrics::{counter, gauge};
use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

type Index = FxHashMap<ObjectKey, Arc<Resource>>;

#[derive(Debug, Default)]
struct Snapshot {
    epoch: u64,
    items: Index,
}

#[derive(Debug)]
pub struct ResourceStore {
    snap: ArcSwap<Snapshot>,
    /// Next resourceVersion to hand out. Held for the whole of every write.
    writer: Mutex<u64>,
    epoch_tx: watch::Sender<u64>,
}

impl Default for ResourceStore {
    fn default() -> Self { Self::new() }
}

impl ResourceStore {
    pub fn new() -> Self {
        let (epoch_tx, _) = watch::channel(0u64);
        Self { snap: ArcSwap::from_pointee(Snapshot::default()), writer: Mutex::new(1), epoch_tx }
    }

    pub fn get(&self, kind: Kind, namespace: &str, name: &str) -> Option<Arc<Resource>> {
        self.get_key(&ObjectKey::new(kind, namespace, name))
    }

    pub fn get_key(&self, key: &ObjectKey) -> Option<Arc<Resource>> {
        self.snap.load().items.get(key).cloned()
    }

    /// All resources of `kind`, optionally restricted to one namespace. Order is unspecified.
    pub fn list(&self, kind: Kind, namespace: Option<&str>) -> Vec<Arc<Resource>> {
        let snap = self.snap.load();
        snap.items
            .iter()
            .filter(|(k, _)| k.kind == kind && namespace.map_or(true, |ns| k.namespace == ns))
            .map(|(_, v)| Arc::clone(v))
            .collect()
    }

    pub fn len(&self) -> usize { self.snap.load().items.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn epoch(&self) -> u64 { self.snap.load().epoch }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_tx.subscribe() }

    /// Store a new resource under `namespace`, assigning a fresh uid and the initial resourceVersion.
    pub fn create(&self, namespace: &str, resource: Resource) -> Result<Arc<Resource>> {
        let mut next_rv = self.lock();
        let key = ObjectKey::new(resource.kind(), namespace, resource.name());
        let current = self.snap.load_full();
        if current.items.contains_key(&key) {
            return Err(ConduitError::AlreadyExists(key));
        }
        let stored = Arc::new(stamp(resource, namespace, Uuid::new_v4().to_string(), take(&mut next_rv)));
        let mut items = current.items.clone();
        items.insert(key.clone(), Arc::clone(&stored));
        self.publish(&current, items);
        counter!("store_writes_total", 1u64, "op" => "create");
        debug!(key = %key, rv = ?stored.resource_version(), "stored");
        Ok(stored)
    }

    /// Replace an existing resource, keeping its uid and advancing its resourceVersion.
    pub fn update(&self, namespace: &str, name: &str, resource: Resource) -> Result<Arc<Resource>> {
        let mut next_rv = self.lock();
        let key = ObjectKey::new(resource.kind(), namespace, name);
        let current = self.snap.load_full();
        let uid = match current.items.get(&key) {
            Some(existing) => existing.uid().unwrap_or_default().to_string(),
            None => return Err(ConduitError::NotFound(key)),
        };
        let mut resource = resource;
        resource.meta_mut().name = Some(name.to_string());
        let stored = Arc::new(stamp(resource, namespace, uid, take(&mut next_rv)));
        let mut items = current.items.clone();
        items.insert(key.clone(), Arc::clone(&stored));
        self.publish(&current, items);
        counter!("store_writes_total", 1u64, "op" => "update");
        debug!(key = %key, rv = ?stored.resource_version(), "updated");
        Ok(stored)
    }

    /// Create or update by the resource's own key. Used to mirror the platform's watch stream.
    pub fn upsert(&self, resource: Resource) -> Arc<Resource> {
        let mut next_rv = self.lock();
        let key = resource.key();
        let current = self.snap.load_full();
        let uid = current
            .items
            .get(&key)
            .and_then(|r| r.uid().map(str::to_string))
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let stored = Arc::new(stamp(resource, &key.namespace, uid, take(&mut next_rv)));
        let mut items = current.items.clone();
        items.insert(key, Arc::clone(&stored));
        self.publish(&current, items);
        counter!("store_writes_total", 1u64, "op" => "upsert");
        stored
    }

    /// Remove a resource. Returns false when nothing was stored under the key; never fails.
    pub fn delete(&self, kind: Kind, namespace: &str, name: &str) -> bool {
        self.delete_key(&ObjectKey::new(kind, namespace, name))
    }

    pub fn remove(&self, resource: &Resource) -> bool {
        self.delete_key(&resource.key())
    }

    fn delete_key(&self, key: &ObjectKey) -> bool {
        let _guard = self.lock();
        let current = self.snap.load_full();
        if !current.items.contains_key(key) {
            return false;
        }
        let mut items = current.items.clone();
        items.remove(key);
        self.publish(&current, items);
        counter!("store_writes_total", 1u64, "op" => "delete");
        debug!(key = %key, "deleted");
        true
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, prev: &Snapshot, items: Index) {
        let epoch = prev.epoch + 1;
        let len = items.len();
        self.snap.store(Arc::new(Snapshot { epoch, items }));
        self.epoch_tx.send_replace(epoch);
        gauge!("store_objects", len as f64);
    }
}

fn take(next_rv: &mut u64) -> u64 {
    let rv = *next_rv;
    *next_rv += 1;
    rv
}

fn stamp(mut resource: Resource, namespace: &str, uid: String, rv: u64) -> Resource {
    let meta = resource.meta_mut();
    meta.namespace = Some(namespace.to_string());
    meta.uid = Some(uid);
    meta.resource_version = Some(rv.to_string());
    resource
}
