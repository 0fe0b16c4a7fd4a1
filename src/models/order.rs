use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::location::GeoPoint;
use crate::models::rider::Rider;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Unassigned,
    Assigned,
    PickedUp,
    OutForDelivery,
    Delivered,
    Failed,
}

impl OrderStatus {
    pub const ACTIVE: [OrderStatus; 3] = [
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::OutForDelivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Unassigned => "UNASSIGNED",
            OrderStatus::Assigned => "ASSIGNED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Failed => "FAILED",
        }
    }

    /// A rider holding an order in one of these statuses is BUSY.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Failed)
    }

    /// Statuses reachable through a status update. ASSIGNED and UNASSIGNED
    /// belong to the assignment engine.
    pub fn is_delivery_progress(&self) -> bool {
        matches!(
            self,
            OrderStatus::PickedUp
                | OrderStatus::OutForDelivery
                | OrderStatus::Delivered
                | OrderStatus::Failed
        )
    }

    /// Transition table applied only in strict mode.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, next) {
            (Assigned, PickedUp | Failed) => true,
            (PickedUp, OutForDelivery | Delivered | Failed) => true,
            (OutForDelivery, Delivered | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNASSIGNED" => Ok(OrderStatus::Unassigned),
            "ASSIGNED" => Ok(OrderStatus::Assigned),
            "PICKED_UP" => Ok(OrderStatus::PickedUp),
            "OUT_FOR_DELIVERY" => Ok(OrderStatus::OutForDelivery),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "FAILED" => Ok(OrderStatus::Failed),
            other => Err(AppError::Validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub code: Option<String>,
    pub branch_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub address: Option<String>,
    pub destination: Option<GeoPoint>,
    pub status: OrderStatus,
    pub assigned_rider_id: Option<Uuid>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: None,
            branch_id: None,
            customer_name: None,
            customer_phone: None,
            address: None,
            destination: None,
            status: OrderStatus::Unassigned,
            assigned_rider_id: None,
            picked_up_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active_for(&self, rider_id: Uuid) -> bool {
        self.assigned_rider_id == Some(rider_id) && self.status.is_active()
    }
}

/// An order as returned to callers: the row plus its current rider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub rider: Option<Rider>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub rider_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::OrderStatus;

    #[test]
    fn active_statuses_are_exactly_the_in_flight_ones() {
        assert!(!OrderStatus::Unassigned.is_active());
        assert!(OrderStatus::Assigned.is_active());
        assert!(OrderStatus::PickedUp.is_active());
        assert!(OrderStatus::OutForDelivery.is_active());
        assert!(!OrderStatus::Delivered.is_active());
        assert!(!OrderStatus::Failed.is_active());
    }

    #[test]
    fn status_parses_from_wire_names() {
        assert_eq!(
            "OUT_FOR_DELIVERY".parse::<OrderStatus>().unwrap(),
            OrderStatus::OutForDelivery
        );
        assert!("out_for_delivery".parse::<OrderStatus>().is_err());
        assert_eq!(OrderStatus::PickedUp.to_string(), "PICKED_UP");
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"OUT_FOR_DELIVERY\"");
    }

    #[test]
    fn transition_table_only_moves_forward() {
        assert!(OrderStatus::Assigned.can_transition_to(OrderStatus::PickedUp));
        assert!(OrderStatus::PickedUp.can_transition_to(OrderStatus::OutForDelivery));
        assert!(OrderStatus::OutForDelivery.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::OutForDelivery.can_transition_to(OrderStatus::PickedUp));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Unassigned.can_transition_to(OrderStatus::PickedUp));
    }
}
