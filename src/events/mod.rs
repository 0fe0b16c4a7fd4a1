//! Outbound notifications. Engines queue these inside a transaction and
//! they are published only after the transaction commits.

pub mod throttle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::order::{Order, OrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStatusChanged {
    pub order_id: Uuid,
    pub rider_id: Option<Uuid>,
    pub status: OrderStatus,
    pub ts: DateTime<Utc>,
}

impl OrderStatusChanged {
    pub fn from_order(order: &Order, ts: DateTime<Utc>) -> Self {
        Self {
            order_id: order.id,
            rider_id: order.assigned_rider_id,
            status: order.status,
            ts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiderLocationUpdated {
    pub rider_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub battery: Option<u8>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DomainEvent {
    OrderStatusChanged(OrderStatusChanged),
    RiderLocationUpdated(RiderLocationUpdated),
}

impl DomainEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            DomainEvent::OrderStatusChanged(_) => "orders",
            DomainEvent::RiderLocationUpdated(_) => "riders",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::OrderStatusChanged(_) => "order.status.changed",
            DomainEvent::RiderLocationUpdated(_) => "rider.location.updated",
        }
    }

    /// Wire envelope sent to websocket subscribers.
    pub fn to_message(&self) -> Result<Value, serde_json::Error> {
        let data = match self {
            DomainEvent::OrderStatusChanged(event) => serde_json::to_value(event)?,
            DomainEvent::RiderLocationUpdated(event) => serde_json::to_value(event)?,
        };

        Ok(json!({
            "channel": self.channel(),
            "event": self.name(),
            "data": data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{DomainEvent, RiderLocationUpdated};

    #[test]
    fn location_event_envelope_names_channel_and_event() {
        let event = DomainEvent::RiderLocationUpdated(RiderLocationUpdated {
            rider_id: Uuid::new_v4(),
            lat: 24.86,
            lng: 67.0,
            battery: Some(80),
            ts: Utc::now(),
        });

        let message = event.to_message().unwrap();
        assert_eq!(message["channel"], "riders");
        assert_eq!(message["event"], "rider.location.updated");
        assert_eq!(message["data"]["battery"], 80);
    }
}
