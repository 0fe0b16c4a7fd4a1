//! In-memory entity store for riders, orders, branches, location samples
//! and the order audit log, plus the row locks and transactions the
//! engines mutate it through.

pub mod locks;
pub mod query;
pub mod transaction;

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::branch::Branch;
use crate::models::location::RiderLocation;
use crate::models::order::{Order, OrderView};
use crate::models::order_event::OrderEvent;
use crate::models::rider::{Rider, RiderPosition};
use crate::store::locks::RowLocks;
use crate::store::transaction::Transaction;

pub struct Store {
    pub riders: DashMap<Uuid, Rider>,
    pub orders: DashMap<Uuid, Order>,
    pub branches: DashMap<Uuid, Branch>,
    /// Location samples keyed by rider, in insertion order.
    pub locations: DashMap<Uuid, Vec<RiderLocation>>,
    /// Audit rows keyed by order, in insertion order.
    pub order_events: DashMap<Uuid, Vec<OrderEvent>>,
    pub locks: RowLocks,
    unique: DashMap<(UniqueKey, String), Uuid>,
}

/// Columns with a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniqueKey {
    OrderCode,
    RiderPhone,
    BranchCode,
}

impl UniqueKey {
    fn label(&self) -> &'static str {
        match self {
            UniqueKey::OrderCode => "order code",
            UniqueKey::RiderPhone => "rider phone",
            UniqueKey::BranchCode => "branch code",
        }
    }
}

impl Store {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            riders: DashMap::new(),
            orders: DashMap::new(),
            branches: DashMap::new(),
            locations: DashMap::new(),
            order_events: DashMap::new(),
            locks: RowLocks::new(lock_timeout),
            unique: DashMap::new(),
        }
    }

    /// Claims `value` for row `id`. Claiming a value the same row already
    /// owns succeeds.
    pub fn reserve(&self, key: UniqueKey, value: &str, id: Uuid) -> Result<(), AppError> {
        match self.unique.entry((key, value.to_owned())) {
            Entry::Occupied(occupied) if *occupied.get() != id => Err(AppError::Conflict(
                format!("{} {value} is already taken", key.label()),
            )),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(vacant) => {
                vacant.insert(id);
                Ok(())
            }
        }
    }

    pub fn release(&self, key: UniqueKey, value: &str) {
        self.unique.remove(&(key, value.to_owned()));
    }

    pub fn owner_of(&self, key: UniqueKey, value: &str) -> Option<Uuid> {
        self.unique
            .get(&(key, value.to_owned()))
            .map(|entry| *entry.value())
    }

    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    pub fn rider(&self, id: Uuid) -> Result<Rider, AppError> {
        self.riders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))
    }

    pub fn order(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    pub fn branch(&self, id: Uuid) -> Result<Branch, AppError> {
        self.branches
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("branch {id} not found")))
    }

    pub fn order_view(&self, id: Uuid) -> Result<OrderView, AppError> {
        let order = self.order(id)?;
        let rider = order
            .assigned_rider_id
            .and_then(|rider_id| self.rider(rider_id).ok());
        Ok(OrderView { order, rider })
    }

    pub fn order_by_code(&self, code: &str) -> Option<Order> {
        self.owner_of(UniqueKey::OrderCode, code)
            .and_then(|id| self.order(id).ok())
    }

    /// Most recently created order the rider is actively working on.
    pub fn active_order_for(&self, rider_id: Uuid) -> Option<Order> {
        self.orders
            .iter()
            .filter(|entry| entry.value().is_active_for(rider_id))
            .max_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.value().clone())
    }

    pub fn locations_for(&self, rider_id: Uuid) -> Vec<RiderLocation> {
        self.locations
            .get(&rider_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn location_count(&self) -> usize {
        self.locations.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn order_events_for(&self, order_id: Uuid) -> Vec<OrderEvent> {
        self.order_events
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn rider_positions(&self) -> Vec<RiderPosition> {
        self.riders
            .iter()
            .filter_map(|entry| {
                let rider = entry.value();
                rider.latest_position.map(|position| RiderPosition {
                    id: rider.id,
                    name: rider.name.clone(),
                    status: rider.status,
                    lat: position.lat,
                    lng: position.lng,
                    battery: rider.battery,
                    last_seen_at: rider.last_seen_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{Store, UniqueKey};
    use crate::error::AppError;
    use crate::models::order::{Order, OrderStatus};
    use crate::models::rider::{Rider, RiderStatus};
    use crate::store::transaction::RiderPatch;

    fn store() -> Store {
        Store::new(Duration::from_millis(50))
    }

    #[test]
    fn dropped_transaction_leaves_store_untouched() {
        let store = store();
        let rider = Rider::new("Ali", Utc::now());
        store.riders.insert(rider.id, rider.clone());

        let mut order = Order::new(Utc::now());
        order.status = OrderStatus::Assigned;
        order.assigned_rider_id = Some(rider.id);

        {
            let mut tx = store.begin();
            tx.put_order(order.clone());
            tx.patch_rider(rider.id, RiderPatch::Status(RiderStatus::Busy));
            assert!(tx.has_active_order(rider.id));
            assert_eq!(tx.rider(rider.id).unwrap().status, RiderStatus::Busy);
        }

        assert!(store.orders.is_empty());
        assert_eq!(store.rider(rider.id).unwrap().status, RiderStatus::Idle);
    }

    #[test]
    fn staged_reassignment_hides_order_from_previous_rider() {
        let store = store();
        let old = Rider::new("Old", Utc::now());
        let new = Rider::new("New", Utc::now());

        let mut order = Order::new(Utc::now());
        order.status = OrderStatus::Assigned;
        order.assigned_rider_id = Some(old.id);
        store.orders.insert(order.id, order.clone());

        let mut tx = store.begin();
        assert!(tx.has_active_order(old.id));

        order.assigned_rider_id = Some(new.id);
        tx.put_order(order);

        assert!(!tx.has_active_order(old.id));
        assert!(tx.has_active_order(new.id));
    }

    #[test]
    fn unique_values_belong_to_one_row() {
        let store = store();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store.reserve(UniqueKey::OrderCode, "POS-1", first).unwrap();
        assert!(store.reserve(UniqueKey::OrderCode, "POS-1", first).is_ok());
        assert!(matches!(
            store.reserve(UniqueKey::OrderCode, "POS-1", second),
            Err(AppError::Conflict(_))
        ));
        assert!(store.reserve(UniqueKey::BranchCode, "POS-1", second).is_ok());

        store.release(UniqueKey::OrderCode, "POS-1");
        assert!(store.reserve(UniqueKey::OrderCode, "POS-1", second).is_ok());
    }

    #[test]
    fn active_order_prefers_most_recent() {
        let store = store();
        let rider = Rider::new("Ali", Utc::now());

        let mut older = Order::new(Utc::now() - chrono::Duration::minutes(5));
        older.status = OrderStatus::Assigned;
        older.assigned_rider_id = Some(rider.id);
        let mut newer = Order::new(Utc::now());
        newer.status = OrderStatus::PickedUp;
        newer.assigned_rider_id = Some(rider.id);
        let mut done = Order::new(Utc::now() + chrono::Duration::minutes(1));
        done.status = OrderStatus::Delivered;
        done.assigned_rider_id = Some(rider.id);

        for order in [&older, &newer, &done] {
            store.orders.insert(order.id, order.clone());
        }

        assert_eq!(store.active_order_for(rider.id).unwrap().id, newer.id);
    }
}
