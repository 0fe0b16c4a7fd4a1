//! Row creation and profile edits that feed the engines: orders (direct and
//! from an external point-of-sale), riders and branches.

use chrono::{NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::{DomainEvent, OrderStatusChanged};
use crate::models::branch::Branch;
use crate::models::location::GeoPoint;
use crate::models::order::{Order, OrderView};
use crate::models::order_event::{OrderEvent, OrderEventKind};
use crate::models::rider::{Rider, RiderStatus};
use crate::state::AppState;
use crate::store::transaction::RiderPatch;
use crate::store::UniqueKey;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub branch_id: Option<Uuid>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Order as pushed by a point-of-sale system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalOrder {
    pub pos_order_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub delivery_address: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Option<Value>,
    #[serde(default)]
    pub total_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRider {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub branch_id: Option<Uuid>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiderUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<RiderStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBranch {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub opening_time: Option<NaiveTime>,
    #[serde(default)]
    pub closing_time: Option<NaiveTime>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Partial branch edit; absent fields keep their value and a blank
/// `address` or `phone` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub opening_time: Option<NaiveTime>,
    #[serde(default)]
    pub closing_time: Option<NaiveTime>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

fn coordinates(lat: Option<f64>, lng: Option<f64>) -> Result<Option<GeoPoint>, AppError> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => {
            let point = GeoPoint { lat, lng };
            point.validate()?;
            Ok(Some(point))
        }
        (None, None) => Ok(None),
        _ => Err(AppError::Validation(
            "lat and lng must be given together".to_string(),
        )),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn create_order(state: &AppState, input: NewOrder) -> Result<OrderView, AppError> {
    create_order_from(state, input, "api")
}

fn create_order_from(
    state: &AppState,
    input: NewOrder,
    source: &str,
) -> Result<OrderView, AppError> {
    if let Some(branch_id) = input.branch_id {
        state.store.branch(branch_id)?;
    }
    let destination = coordinates(input.lat, input.lng)?;

    let mut tx = state.store.begin();
    let now = tx.now();

    let mut order = Order::new(now);
    order.code = non_blank(input.code);
    order.branch_id = input.branch_id;
    order.customer_name = non_blank(input.customer_name);
    order.customer_phone = non_blank(input.customer_phone);
    order.address = non_blank(input.address);
    order.destination = destination;
    order.notes = non_blank(input.notes);

    if let Some(code) = &order.code {
        state.store.reserve(UniqueKey::OrderCode, code, order.id)?;
    }

    tx.put_order(order.clone());
    tx.record(OrderEvent::new(
        order.id,
        OrderEventKind::Created,
        json!({ "status": order.status, "source": source, "code": order.code }),
        now,
    ));
    tx.emit(DomainEvent::OrderStatusChanged(OrderStatusChanged::from_order(
        &order, now,
    )));

    let events = tx.commit();
    state.publish(events);

    info!(order_id = %order.id, code = ?order.code, source, "order created");

    Ok(OrderView { order, rider: None })
}

/// Idempotent on `pos_order_id`: a repeat delivery returns the existing
/// order and `false`.
pub fn import_external_order(
    state: &AppState,
    input: ExternalOrder,
) -> Result<(OrderView, bool), AppError> {
    let code = input.pos_order_id.trim().to_string();
    if code.is_empty() {
        return Err(AppError::Validation("pos_order_id is required".to_string()));
    }

    if let Some(existing) = state.store.order_by_code(&code) {
        return Ok((state.store.order_view(existing.id)?, false));
    }

    if input.latitude.is_none() || input.longitude.is_none() {
        warn!(pos_order_id = %code, "external order has no coordinates");
    }

    let notes = compose_notes(input.notes.as_deref(), input.items.as_ref(), input.total_amount)?;
    let new_order = NewOrder {
        code: Some(code.clone()),
        branch_id: None,
        customer_name: Some(input.customer_name),
        customer_phone: Some(input.customer_phone),
        address: Some(input.delivery_address),
        lat: input.latitude,
        lng: input.longitude,
        notes: Some(notes),
    };

    match create_order_from(state, new_order, "pos_webhook") {
        Ok(view) => Ok((view, true)),
        // Lost a race with a concurrent delivery of the same order.
        Err(AppError::Conflict(_)) => {
            let existing = state
                .store
                .order_by_code(&code)
                .ok_or_else(|| AppError::Internal(format!("order code {code} vanished")))?;
            Ok((state.store.order_view(existing.id)?, false))
        }
        Err(err) => Err(err),
    }
}

fn compose_notes(
    notes: Option<&str>,
    items: Option<&Value>,
    total_amount: Option<f64>,
) -> Result<String, AppError> {
    let mut composed = notes.unwrap_or_default().to_string();

    if let Some(items) = items {
        let pretty = serde_json::to_string_pretty(items)
            .map_err(|err| AppError::Validation(format!("items are not valid json: {err}")))?;
        composed.push_str("\n\nOrder Items:\n");
        composed.push_str(&pretty);
    }
    if let Some(total) = total_amount {
        composed.push_str(&format!("\n\nTotal Amount: {total:.2}"));
    }

    Ok(composed.trim().to_string())
}

pub fn create_rider(state: &AppState, input: NewRider) -> Result<Rider, AppError> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if let Some(branch_id) = input.branch_id {
        state.store.branch(branch_id)?;
    }

    let mut rider = Rider::new(name, Utc::now());
    rider.phone = non_blank(input.phone);
    rider.branch_id = input.branch_id;
    rider.latest_position = coordinates(input.lat, input.lng)?;

    if let Some(phone) = &rider.phone {
        state.store.reserve(UniqueKey::RiderPhone, phone, rider.id)?;
    }

    state.store.riders.insert(rider.id, rider.clone());
    info!(rider_id = %rider.id, "rider created");

    Ok(rider)
}

/// Profile edit. Status may only be overridden to OFFLINE, or back to IDLE
/// when the rider holds no active order; BUSY is derived from assignments.
pub async fn update_rider(
    state: &AppState,
    rider_id: Uuid,
    input: RiderUpdate,
) -> Result<Rider, AppError> {
    let mut tx = state.store.begin();
    tx.lock_riders(&[rider_id]).await?;
    let rider = tx.rider(rider_id)?;

    let name = match input.name {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };

    match input.status {
        Some(RiderStatus::Busy) => {
            return Err(AppError::Validation(
                "BUSY is set by assignment, not by a profile update".to_string(),
            ));
        }
        Some(RiderStatus::Idle) if tx.has_active_order(rider_id) => {
            return Err(AppError::RiderBusy);
        }
        Some(status) => tx.patch_rider(rider_id, RiderPatch::Status(status)),
        None => {}
    }

    let phone = non_blank(input.phone);
    if let Some(phone) = &phone {
        if rider.phone.as_deref() != Some(phone.as_str()) {
            state.store.reserve(UniqueKey::RiderPhone, phone, rider_id)?;
            if let Some(old) = &rider.phone {
                state.store.release(UniqueKey::RiderPhone, old);
            }
        }
    }

    tx.patch_rider(rider_id, RiderPatch::Profile { name, phone });
    let events = tx.commit();
    state.publish(events);

    let updated = state.store.rider(rider_id)?;
    info!(rider_id = %rider_id, status = %updated.status, "rider updated");

    Ok(updated)
}

pub fn create_branch(state: &AppState, input: NewBranch) -> Result<Branch, AppError> {
    let name = input.name.trim().to_string();
    let code = input.code.trim().to_string();
    if name.is_empty() || code.is_empty() {
        return Err(AppError::Validation(
            "name and code cannot be empty".to_string(),
        ));
    }

    let branch = Branch {
        id: Uuid::new_v4(),
        name,
        code,
        address: non_blank(input.address),
        phone: non_blank(input.phone),
        pickup: coordinates(input.lat, input.lng)?,
        opening_time: input.opening_time,
        closing_time: input.closing_time,
        is_active: input.is_active.unwrap_or(true),
        created_at: Utc::now(),
    };

    state.store.reserve(UniqueKey::BranchCode, &branch.code, branch.id)?;
    state.store.branches.insert(branch.id, branch.clone());
    info!(branch_id = %branch.id, code = %branch.code, "branch created");

    Ok(branch)
}

fn required(field: &str, value: Option<String>) -> Result<Option<String>, AppError> {
    match value {
        Some(value) if value.trim().is_empty() => {
            Err(AppError::Validation(format!("{field} cannot be empty")))
        }
        Some(value) => Ok(Some(value.trim().to_string())),
        None => Ok(None),
    }
}

pub fn update_branch(
    state: &AppState,
    branch_id: Uuid,
    input: BranchUpdate,
) -> Result<Branch, AppError> {
    let name = required("name", input.name)?;
    let code = required("code", input.code)?;
    let pickup = coordinates(input.lat, input.lng)?;

    let mut entry = state
        .store
        .branches
        .get_mut(&branch_id)
        .ok_or_else(|| AppError::NotFound(format!("branch {branch_id} not found")))?;
    let branch = entry.value_mut();

    if let Some(code) = code {
        if code != branch.code {
            state.store.reserve(UniqueKey::BranchCode, &code, branch_id)?;
            state.store.release(UniqueKey::BranchCode, &branch.code);
            branch.code = code;
        }
    }
    if let Some(name) = name {
        branch.name = name;
    }
    if input.address.is_some() {
        branch.address = non_blank(input.address);
    }
    if input.phone.is_some() {
        branch.phone = non_blank(input.phone);
    }
    if pickup.is_some() {
        branch.pickup = pickup;
    }
    if input.opening_time.is_some() {
        branch.opening_time = input.opening_time;
    }
    if input.closing_time.is_some() {
        branch.closing_time = input.closing_time;
    }
    if let Some(is_active) = input.is_active {
        branch.is_active = is_active;
    }

    info!(branch_id = %branch_id, code = %branch.code, "branch updated");
    Ok(branch.clone())
}

pub fn set_branch_active(
    state: &AppState,
    branch_id: Uuid,
    is_active: bool,
) -> Result<Branch, AppError> {
    let mut entry = state
        .store
        .branches
        .get_mut(&branch_id)
        .ok_or_else(|| AppError::NotFound(format!("branch {branch_id} not found")))?;
    let branch = entry.value_mut();
    branch.is_active = is_active;

    info!(branch_id = %branch_id, is_active, "branch activation changed");
    Ok(branch.clone())
}

/// Removes a branch nothing refers to. Branches with riders or orders
/// must be deactivated instead.
pub fn delete_branch(state: &AppState, branch_id: Uuid) -> Result<(), AppError> {
    state.store.branch(branch_id)?;

    let riders = state
        .store
        .riders
        .iter()
        .filter(|entry| entry.value().branch_id == Some(branch_id))
        .count();
    let orders = state
        .store
        .orders
        .iter()
        .filter(|entry| entry.value().branch_id == Some(branch_id))
        .count();
    if riders > 0 || orders > 0 {
        return Err(AppError::Validation(format!(
            "branch has {riders} riders and {orders} orders; deactivate it instead"
        )));
    }

    if let Some((_, branch)) = state.store.branches.remove(&branch_id) {
        state.store.release(UniqueKey::BranchCode, &branch.code);
        info!(branch_id = %branch_id, code = %branch.code, "branch deleted");
    }
    Ok(())
}
