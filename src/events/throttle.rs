use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

/// Keyed flag store with fixed expiry. The in-process implementation is
/// enough for one instance; a shared cache can implement the same trait
/// when several instances broadcast.
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    /// Sets `key` for `ttl` and returns `true` if it was not already set.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> bool;

    /// Drops expired keys and returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

pub fn location_broadcast_key(rider_id: Uuid) -> String {
    format!("rider_location_broadcast_{rider_id}")
}

#[derive(Default)]
pub struct MemoryThrottleStore {
    expiries: DashMap<String, Instant>,
}

impl MemoryThrottleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}

#[async_trait]
impl ThrottleStore for MemoryThrottleStore {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();

        match self.expiries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    return false;
                }
                occupied.insert(now + ttl);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now + ttl);
                true
            }
        }
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.expiries.len();
        self.expiries.retain(|_, expiry| *expiry > now);
        before.saturating_sub(self.expiries.len())
    }
}
