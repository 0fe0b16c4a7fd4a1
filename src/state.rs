use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::config::{Config, DispatchConfig};
use crate::events::throttle::{MemoryThrottleStore, ThrottleStore};
use crate::events::DomainEvent;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub dispatch: DispatchConfig,
    pub events_tx: broadcast::Sender<DomainEvent>,
    pub throttle: Arc<dyn ThrottleStore>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::with_throttle(config, Arc::new(MemoryThrottleStore::new()))
    }

    pub fn with_throttle(config: &Config, throttle: Arc<dyn ThrottleStore>) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        Self {
            store: Store::new(config.dispatch.lock_timeout),
            dispatch: config.dispatch.clone(),
            events_tx,
            throttle,
            metrics: Metrics::new(),
        }
    }

    /// Fire-and-forget fan-out of committed events.
    pub fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            if self.events_tx.send(event).is_err() {
                debug!("no subscribers for domain event");
            }
        }
    }
}
