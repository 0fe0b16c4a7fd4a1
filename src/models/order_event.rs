use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Created,
    Assigned,
    Reassigned,
    StatusChanged,
}

/// Append-only audit row. Reasons and auto-transition details live in
/// `meta`, never on the order itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: OrderEventKind,
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(order_id: Uuid, kind: OrderEventKind, meta: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            kind,
            meta,
            created_at: now,
        }
    }
}
