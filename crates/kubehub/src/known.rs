use std::collections::BTreeMap;

use conduit_core::ObjectKey;
use conduit_schema::Resource;

use crate::Notification;

/// Last observed state per object, used to turn raw watch events into
/// added/updated/deleted notifications.
#[derive(Debug, Default)]
pub struct KnownObjects {
    objects: BTreeMap<ObjectKey, Resource>,
}

impl KnownObjects {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.objects.len() }
    pub fn is_empty(&self) -> bool { self.objects.is_empty() }

    pub fn applied(&mut self, resource: Resource) -> Notification {
        match self.objects.insert(resource.key(), resource.clone()) {
            Some(old) => Notification::Updated { old, new: resource },
            None => Notification::Added(resource),
        }
    }

    pub fn deleted(&mut self, resource: Resource) -> Notification {
        let last = self.objects.remove(&resource.key()).unwrap_or(resource);
        Notification::Deleted(last)
    }

    /// Replace the whole set after a relist: everything listed is applied, and
    /// anything known but no longer listed is deleted.
    pub fn restarted(&mut self, listed: Vec<Resource>) -> Vec<Notification> {
        let mut stale = std::mem::take(&mut self.objects);
        let mut out = Vec::with_capacity(listed.len());
        for r in listed {
            let key = r.key();
            let prev = stale.remove(&key);
            self.objects.insert(key, r.clone());
            out.push(match prev {
                Some(old) => Notification::Updated { old, new: r },
                None => Notification::Added(r),
            });
        }
        out.extend(stale.into_values().map(Notification::Deleted));
        out
    }

    /// Re-deliver every known object as an unchanged update.
    pub fn resync(&self) -> Vec<Notification> {
        self.objects.values().map(|r| Notification::Updated { old: r.clone(), new: r.clone() }).collect()
    }
}
