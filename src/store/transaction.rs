use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::events::DomainEvent;
use crate::models::location::{GeoPoint, RiderLocation};
use crate::models::order::Order;
use crate::models::order_event::OrderEvent;
use crate::models::rider::{Rider, RiderStatus};
use crate::store::locks::RowKey;
use crate::store::Store;

/// Field-level rider write. Writers touching different fields of the same
/// rider (a position update and a status change) do not clobber each other.
#[derive(Debug, Clone)]
pub enum RiderPatch {
    Status(RiderStatus),
    Position {
        position: GeoPoint,
        seen_at: DateTime<Utc>,
        battery: Option<u8>,
    },
    Profile {
        name: Option<String>,
        phone: Option<String>,
    },
}

impl RiderPatch {
    fn apply(&self, rider: &mut Rider, now: DateTime<Utc>) {
        match self {
            RiderPatch::Status(status) => rider.status = *status,
            RiderPatch::Position {
                position,
                seen_at,
                battery,
            } => {
                rider.latest_position = Some(*position);
                rider.last_seen_at = Some(*seen_at);
                if let Some(battery) = battery {
                    rider.battery = Some(*battery);
                }
            }
            RiderPatch::Profile { name, phone } => {
                if let Some(name) = name {
                    rider.name = name.clone();
                }
                if let Some(phone) = phone {
                    rider.phone = Some(phone.clone());
                }
            }
        }
        rider.updated_at = now;
    }
}

/// All-or-nothing unit of work. Writes and outbound events are staged and
/// only take effect in [`Transaction::commit`]; dropping the transaction
/// discards them and releases its row locks.
pub struct Transaction<'a> {
    store: &'a Store,
    now: DateTime<Utc>,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    orders: HashMap<Uuid, Order>,
    rider_patches: Vec<(Uuid, RiderPatch)>,
    locations: Vec<RiderLocation>,
    order_events: Vec<OrderEvent>,
    events: Vec<DomainEvent>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self {
            store,
            now: Utc::now(),
            guards: HashMap::new(),
            orders: HashMap::new(),
            rider_patches: Vec::new(),
            locations: Vec::new(),
            order_events: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Timestamp shared by every write in this transaction.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub async fn lock_order(&mut self, order_id: Uuid) -> Result<(), AppError> {
        let key = RowKey::Order(order_id);
        if self.guards.contains_key(&key) {
            return Ok(());
        }
        if self.guards.keys().any(|k| matches!(k, RowKey::Rider(_))) {
            return Err(AppError::Internal(format!(
                "{key} requested after a rider lock"
            )));
        }

        self.acquire(key).await
    }

    pub async fn lock_riders(&mut self, rider_ids: &[Uuid]) -> Result<(), AppError> {
        let mut ids = rider_ids.to_vec();
        ids.sort();
        ids.dedup();

        for id in ids {
            let key = RowKey::Rider(id);
            if !self.guards.contains_key(&key) {
                self.acquire(key).await?;
            }
        }
        Ok(())
    }

    async fn acquire(&mut self, key: RowKey) -> Result<(), AppError> {
        let guard = self.store.locks.acquire(key).await?;
        self.guards.insert(key, guard);
        Ok(())
    }

    /// Gives up an order lock taken for a row that turned out to be stale.
    /// Only valid before anything about that order has been staged.
    pub fn release_order(&mut self, order_id: Uuid) {
        if !self.orders.contains_key(&order_id) {
            self.guards.remove(&RowKey::Order(order_id));
        }
    }

    pub fn order(&self, order_id: Uuid) -> Result<Order, AppError> {
        match self.orders.get(&order_id) {
            Some(order) => Ok(order.clone()),
            None => self.store.order(order_id),
        }
    }

    pub fn rider(&self, rider_id: Uuid) -> Result<Rider, AppError> {
        let mut rider = self.store.rider(rider_id)?;
        for (id, patch) in &self.rider_patches {
            if *id == rider_id {
                patch.apply(&mut rider, self.now);
            }
        }
        Ok(rider)
    }

    /// Orders assigned to the rider as they would look after commit.
    fn orders_for_rider(&self, rider_id: Uuid) -> Vec<Order> {
        let mut orders: HashMap<Uuid, Order> = self
            .store
            .orders
            .iter()
            .filter(|entry| entry.value().assigned_rider_id == Some(rider_id))
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (id, staged) in &self.orders {
            if staged.assigned_rider_id == Some(rider_id) {
                orders.insert(*id, staged.clone());
            } else {
                orders.remove(id);
            }
        }

        orders.into_values().collect()
    }

    pub fn has_other_active_order(&self, rider_id: Uuid, exclude_order_id: Uuid) -> bool {
        self.orders_for_rider(rider_id)
            .iter()
            .any(|order| order.id != exclude_order_id && order.status.is_active())
    }

    pub fn has_active_order(&self, rider_id: Uuid) -> bool {
        self.orders_for_rider(rider_id)
            .iter()
            .any(|order| order.status.is_active())
    }

    pub fn put_order(&mut self, mut order: Order) {
        order.updated_at = self.now;
        self.orders.insert(order.id, order);
    }

    pub fn patch_rider(&mut self, rider_id: Uuid, patch: RiderPatch) {
        self.rider_patches.push((rider_id, patch));
    }

    pub fn append_location(&mut self, location: RiderLocation) {
        self.locations.push(location);
    }

    pub fn record(&mut self, event: OrderEvent) {
        self.order_events.push(event);
    }

    pub fn emit(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    /// Applies every staged write and returns the events to publish.
    pub fn commit(self) -> Vec<DomainEvent> {
        let store = self.store;

        for (id, order) in self.orders {
            store.orders.insert(id, order);
        }

        for (rider_id, patch) in &self.rider_patches {
            match store.riders.get_mut(rider_id) {
                Some(mut rider) => patch.apply(&mut rider, self.now),
                None => warn!(rider_id = %rider_id, "rider vanished before commit"),
            }
        }

        for location in self.locations {
            store.locations.entry(location.rider_id).or_default().push(location);
        }

        for event in self.order_events {
            store.order_events.entry(event.order_id).or_default().push(event);
        }

        self.events
    }
}
