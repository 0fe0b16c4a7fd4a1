use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::assignment::release_rider;
use crate::error::AppError;
use crate::events::{DomainEvent, OrderStatusChanged};
use crate::models::order::{OrderStatus, OrderView};
use crate::models::order_event::{OrderEvent, OrderEventKind};
use crate::state::AppState;

/// Applies a delivery-progress status (PICKED_UP, OUT_FOR_DELIVERY,
/// DELIVERED or FAILED). Terminal statuses release the assigned rider when
/// this was their last active order. `reason` is kept on the audit row.
pub async fn update_status(
    state: &AppState,
    order_id: Uuid,
    status: OrderStatus,
    reason: Option<String>,
) -> Result<OrderView, AppError> {
    let start = Instant::now();
    let result = apply(state, order_id, status, reason).await;

    state
        .metrics
        .engine_latency_seconds
        .with_label_values(&["update_status"])
        .observe(start.elapsed().as_secs_f64());

    match &result {
        Ok(view) => {
            state
                .metrics
                .status_transitions_total
                .with_label_values(&[status.as_str(), "manual"])
                .inc();
            info!(
                order_id = %order_id,
                status = %status,
                rider_id = ?view.order.assigned_rider_id,
                "order status updated"
            );
        }
        Err(err) => warn!(
            order_id = %order_id,
            status = %status,
            error = %err,
            "status update rejected"
        ),
    }

    result
}

async fn apply(
    state: &AppState,
    order_id: Uuid,
    status: OrderStatus,
    reason: Option<String>,
) -> Result<OrderView, AppError> {
    if !status.is_delivery_progress() {
        return Err(AppError::Validation(format!(
            "status {status} is set through assignment, not a status update"
        )));
    }

    let mut tx = state.store.begin();
    tx.lock_order(order_id).await?;
    let mut order = tx.order(order_id)?;

    if state.dispatch.strict_transitions && !order.status.can_transition_to(status) {
        return Err(AppError::InvalidTransition(format!(
            "order {} cannot move from {} to {status}",
            order.id, order.status
        )));
    }

    let now = tx.now();
    let previous_status = order.status;
    order.status = status;
    if status == OrderStatus::PickedUp {
        order.picked_up_at = Some(now);
    }
    tx.put_order(order.clone());

    if status.is_terminal() {
        if let Some(rider_id) = order.assigned_rider_id {
            tx.lock_riders(&[rider_id]).await?;
            release_rider(&mut tx, rider_id, order.id);
        }
    }

    tx.record(OrderEvent::new(
        order.id,
        OrderEventKind::StatusChanged,
        json!({
            "old_status": previous_status,
            "new_status": status,
            "reason": reason,
        }),
        now,
    ));
    tx.emit(DomainEvent::OrderStatusChanged(OrderStatusChanged::from_order(
        &order, now,
    )));

    let rider = match order.assigned_rider_id {
        Some(rider_id) => tx.rider(rider_id).ok(),
        None => None,
    };
    let view = OrderView { order, rider };

    let events = tx.commit();
    state.publish(events);

    Ok(view)
}
