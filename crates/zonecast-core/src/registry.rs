// ── Zone subscription registry ──
//
// Zone key -> subscriber list. Pure bookkeeping: subscribing never opens
// or closes a connection. Dispatch works on snapshots, so subscribing or
// unsubscribing from inside a callback only affects the next frame.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use zonecast_api::ZoneUpdate;

use crate::id::ZoneKey;

/// Sink for one zone's updates.
pub type ZoneCallback = Arc<dyn Fn(&ZoneUpdate) + Send + Sync>;

/// Identifies one registration; the same closure subscribed twice gets two ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone)]
pub(crate) struct Subscriber {
    pub(crate) id: SubscriberId,
    pub(crate) callback: ZoneCallback,
}

#[derive(Default)]
struct RegistryInner {
    zones: DashMap<ZoneKey, Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Shared map of zone subscriptions. Cheaply cloneable.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for updates to `zone`.
    pub fn subscribe<F>(&self, zone: ZoneKey, callback: F) -> Subscription
    where
        F: Fn(&ZoneUpdate) + Send + Sync + 'static,
    {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        self.inner
            .zones
            .entry(zone.clone())
            .or_default()
            .push(Subscriber {
                id,
                callback: Arc::new(callback),
            });

        tracing::debug!(zone = %zone, subscriber = %id, "zone subscribed");

        Subscription {
            registry: Arc::downgrade(&self.inner),
            zone,
            id,
        }
    }

    /// Copy of the current subscribers for `zone`. The shard lock is
    /// released before this returns.
    pub(crate) fn snapshot(&self, zone: &ZoneKey) -> Vec<Subscriber> {
        self.inner
            .zones
            .get(zone)
            .map(|subs| subs.value().clone())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, zone: &ZoneKey) -> usize {
        self.inner.zones.get(zone).map_or(0, |subs| subs.len())
    }

    /// Zones with at least one subscriber, sorted.
    pub fn zones(&self) -> Vec<ZoneKey> {
        let mut zones: Vec<ZoneKey> = self
            .inner
            .zones
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        zones.sort();
        zones
    }

    pub fn is_empty(&self) -> bool {
        self.inner.zones.is_empty()
    }
}

impl RegistryInner {
    fn remove(&self, zone: &ZoneKey, id: SubscriberId) -> bool {
        let removed = match self.zones.get_mut(zone) {
            Some(mut subs) => {
                let before = subs.len();
                subs.retain(|s| s.id != id);
                subs.len() != before
            }
            None => false,
        };

        // Guard from get_mut is dropped above; remove_if takes the shard lock itself.
        self.zones.remove_if(zone, |_, subs| subs.is_empty());
        removed
    }
}

/// Handle returned by `subscribe`. Call [`unsubscribe`](Self::unsubscribe)
/// to stop receiving updates; dropping the handle does not unsubscribe.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    zone: ZoneKey,
    id: SubscriberId,
}

impl Subscription {
    /// Remove exactly this registration. Safe to call more than once.
    ///
    /// Returns `true` if this call removed it.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.remove(&self.zone, self.id);
        if removed {
            tracing::debug!(zone = %self.zone, subscriber = %self.id, "zone unsubscribed");
        }
        removed
    }

    pub fn zone(&self) -> &ZoneKey {
        &self.zone
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }
}
