use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::{DomainEvent, OrderStatusChanged};
use crate::models::order::{Order, OrderStatus, OrderView};
use crate::models::order_event::{OrderEvent, OrderEventKind};
use crate::models::rider::{Rider, RiderStatus};
use crate::state::AppState;
use crate::store::transaction::{RiderPatch, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Assign,
    Reassign,
}

impl Mode {
    fn as_str(&self) -> &'static str {
        match self {
            Mode::Assign => "assign",
            Mode::Reassign => "reassign",
        }
    }

    fn event_kind(&self) -> OrderEventKind {
        match self {
            Mode::Assign => OrderEventKind::Assigned,
            Mode::Reassign => OrderEventKind::Reassigned,
        }
    }
}

/// Hands `order_id` to `rider_id`. The order is forced to ASSIGNED and the
/// rider to BUSY in one transaction; fails with `BranchMismatch` or
/// `RiderBusy` without touching either row.
pub async fn assign(state: &AppState, order_id: Uuid, rider_id: Uuid) -> Result<OrderView, AppError> {
    run(state, order_id, rider_id, Mode::Assign).await
}

/// Moves `order_id` to `rider_id`, returning the previous holder to IDLE
/// when this was their last active order.
pub async fn reassign(
    state: &AppState,
    order_id: Uuid,
    rider_id: Uuid,
) -> Result<OrderView, AppError> {
    run(state, order_id, rider_id, Mode::Reassign).await
}

async fn run(
    state: &AppState,
    order_id: Uuid,
    rider_id: Uuid,
    mode: Mode,
) -> Result<OrderView, AppError> {
    let start = Instant::now();
    let result = apply(state, order_id, rider_id, mode).await;

    state
        .metrics
        .engine_latency_seconds
        .with_label_values(&[mode.as_str()])
        .observe(start.elapsed().as_secs_f64());

    let outcome = match &result {
        Ok(_) => "success",
        Err(err) => err.kind(),
    };
    state
        .metrics
        .assignments_total
        .with_label_values(&[mode.as_str(), outcome])
        .inc();

    match &result {
        Ok(_) => info!(
            order_id = %order_id,
            rider_id = %rider_id,
            operation = mode.as_str(),
            "order assigned"
        ),
        Err(err) => warn!(
            order_id = %order_id,
            rider_id = %rider_id,
            operation = mode.as_str(),
            error = %err,
            "assignment rejected"
        ),
    }

    result
}

async fn apply(
    state: &AppState,
    order_id: Uuid,
    rider_id: Uuid,
    mode: Mode,
) -> Result<OrderView, AppError> {
    let mut tx = state.store.begin();

    tx.lock_order(order_id).await?;
    let mut order = tx.order(order_id)?;
    state.store.rider(rider_id)?;

    let previous_rider = order.assigned_rider_id.filter(|id| *id != rider_id);

    let mut riders = vec![rider_id];
    riders.extend(previous_rider);
    tx.lock_riders(&riders).await?;

    let rider = tx.rider(rider_id)?;

    if state.dispatch.strict_transitions && order.status.is_terminal() {
        return Err(AppError::InvalidTransition(format!(
            "order {} is already {}",
            order.id, order.status
        )));
    }
    validate(&tx, &order, &rider)?;

    let previous_status = order.status;
    order.status = OrderStatus::Assigned;
    order.assigned_rider_id = Some(rider.id);
    tx.put_order(order.clone());

    if let Some(previous_rider_id) = previous_rider {
        release_rider(&mut tx, previous_rider_id, order.id);
    }
    tx.patch_rider(rider.id, RiderPatch::Status(RiderStatus::Busy));

    let now = tx.now();
    tx.record(OrderEvent::new(
        order.id,
        mode.event_kind(),
        json!({
            "rider_id": rider.id,
            "previous_rider_id": previous_rider,
            "previous_status": previous_status,
        }),
        now,
    ));
    tx.emit(DomainEvent::OrderStatusChanged(OrderStatusChanged::from_order(
        &order, now,
    )));

    let view = OrderView {
        rider: Some(tx.rider(rider.id)?),
        order,
    };

    let events = tx.commit();
    state.publish(events);

    Ok(view)
}

fn validate(tx: &Transaction<'_>, order: &Order, rider: &Rider) -> Result<(), AppError> {
    if let (Some(order_branch), Some(rider_branch)) = (order.branch_id, rider.branch_id) {
        if order_branch != rider_branch {
            return Err(AppError::BranchMismatch);
        }
    }

    // The order being (re)assigned does not count against its own holder.
    if tx.has_other_active_order(rider.id, order.id) {
        return Err(AppError::RiderBusy);
    }

    Ok(())
}

/// Sets the rider IDLE unless another active order still holds them.
/// The caller must hold the rider's row lock.
pub(crate) fn release_rider(tx: &mut Transaction<'_>, rider_id: Uuid, order_id: Uuid) {
    if tx.rider(rider_id).is_err() {
        return;
    }
    if !tx.has_other_active_order(rider_id, order_id) {
        tx.patch_rider(rider_id, RiderPatch::Status(RiderStatus::Idle));
    }
}
