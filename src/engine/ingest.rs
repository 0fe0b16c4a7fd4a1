use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::error::AppError;
use crate::events::throttle::location_broadcast_key;
use crate::events::{DomainEvent, OrderStatusChanged, RiderLocationUpdated};
use crate::geo::haversine_m;
use crate::models::location::{GeoPoint, LocationBatch, LocationPoint, RiderLocation};
use crate::models::order::{Order, OrderStatus};
use crate::models::order_event::{OrderEvent, OrderEventKind};
use crate::models::rider::Rider;
use crate::state::AppState;
use crate::store::transaction::{RiderPatch, Transaction};

/// How many times the rider's active order is re-resolved when it changes
/// while we wait for its lock.
const RESOLVE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub count: usize,
    pub order_id: Option<Uuid>,
    /// Distance from pickup when the batch moved the order out for delivery.
    pub auto_transition_distance_m: Option<f64>,
    pub broadcast: bool,
}

/// Persists a batch of GPS samples for one rider, moves their latest
/// position to the last sample and runs the geofence check, all in one
/// transaction. The location broadcast afterwards is throttled per rider.
pub async fn ingest(state: &AppState, batch: LocationBatch) -> Result<IngestOutcome, AppError> {
    let start = Instant::now();
    let rider_id = batch.rider_id;
    let result = apply(state, batch).await;

    state
        .metrics
        .engine_latency_seconds
        .with_label_values(&["ingest"])
        .observe(start.elapsed().as_secs_f64());

    match &result {
        Ok(outcome) => debug!(
            rider_id = %rider_id,
            count = outcome.count,
            order_id = ?outcome.order_id,
            "locations ingested"
        ),
        Err(err) => warn!(rider_id = %rider_id, error = %err, "location batch rejected"),
    }

    result
}

async fn apply(state: &AppState, batch: LocationBatch) -> Result<IngestOutcome, AppError> {
    batch.validate()?;
    let rider = state.store.rider(batch.rider_id)?;
    let last = batch
        .points
        .last()
        .cloned()
        .ok_or_else(|| AppError::Validation("points must not be empty".to_string()))?;

    let mut tx = state.store.begin();
    let active = resolve_active_order(state, &mut tx, rider.id).await?;
    let order_id = active.as_ref().map(|order| order.id);
    let now = tx.now();

    for point in &batch.points {
        tx.append_location(RiderLocation {
            id: Uuid::new_v4(),
            rider_id: rider.id,
            order_id,
            lat: point.lat,
            lng: point.lng,
            speed: point.speed,
            heading: point.heading,
            accuracy: point.accuracy,
            battery: point.battery,
            recorded_at: point.ts.unwrap_or(now),
            created_at: now,
        });
    }

    tx.patch_rider(
        rider.id,
        RiderPatch::Position {
            position: last.position(),
            seen_at: last.ts.unwrap_or(now),
            battery: last.battery,
        },
    );

    let auto_transition_distance_m = match &active {
        Some(order) => check_geofence(&state.dispatch, &mut tx, order, last.position()),
        None => None,
    };

    let events = tx.commit();
    state.publish(events);

    let count = batch.points.len();
    state.metrics.locations_ingested_total.inc_by(count as u64);

    if let Some(distance) = auto_transition_distance_m {
        state
            .metrics
            .status_transitions_total
            .with_label_values(&[OrderStatus::OutForDelivery.as_str(), "geofence"])
            .inc();
        info!(
            rider_id = %rider.id,
            order_id = ?order_id,
            distance_m = distance,
            "order auto-moved out for delivery"
        );
    }

    let broadcast = broadcast_location(state, &rider, &last).await;

    Ok(IngestOutcome {
        count,
        order_id,
        auto_transition_distance_m,
        broadcast,
    })
}

/// Finds the rider's active order and takes its row lock, so a concurrent
/// manual status update cannot interleave with the geofence check.
async fn resolve_active_order(
    state: &AppState,
    tx: &mut Transaction<'_>,
    rider_id: Uuid,
) -> Result<Option<Order>, AppError> {
    for _ in 0..RESOLVE_ATTEMPTS {
        let Some(candidate) = state.store.active_order_for(rider_id) else {
            return Ok(None);
        };

        tx.lock_order(candidate.id).await?;
        let current = tx.order(candidate.id)?;
        if current.is_active_for(rider_id) {
            return Ok(Some(current));
        }

        tx.release_order(candidate.id);
    }

    Err(AppError::TransactionAborted(format!(
        "active order for rider {rider_id} kept changing"
    )))
}

/// Moves a picked-up order OUT_FOR_DELIVERY once the grace period has
/// passed and the rider is further than the threshold from pickup.
/// Returns the distance when the transition was staged.
fn check_geofence(
    dispatch: &DispatchConfig,
    tx: &mut Transaction<'_>,
    order: &Order,
    position: GeoPoint,
) -> Option<f64> {
    if order.status != OrderStatus::PickedUp {
        return None;
    }

    let picked_up_at = order.picked_up_at?;
    let grace = chrono::Duration::from_std(dispatch.geofence_grace).ok()?;
    if tx.now() - picked_up_at < grace {
        return None;
    }

    let pickup = dispatch.pickup_location?;
    let distance = haversine_m(&pickup, &position);
    if distance <= dispatch.geofence_distance_m {
        return None;
    }

    let now = tx.now();
    let mut updated = order.clone();
    updated.status = OrderStatus::OutForDelivery;
    tx.put_order(updated.clone());

    tx.record(OrderEvent::new(
        order.id,
        OrderEventKind::StatusChanged,
        json!({
            "old_status": order.status,
            "new_status": OrderStatus::OutForDelivery,
            "auto_updated": true,
            "distance_from_pickup": (distance * 100.0).round() / 100.0,
        }),
        now,
    ));
    tx.emit(DomainEvent::OrderStatusChanged(OrderStatusChanged::from_order(
        &updated, now,
    )));

    Some(distance)
}

async fn broadcast_location(state: &AppState, rider: &Rider, last: &LocationPoint) -> bool {
    let key = location_broadcast_key(rider.id);
    if !state
        .throttle
        .try_acquire(&key, state.dispatch.broadcast_throttle)
        .await
    {
        state
            .metrics
            .location_broadcasts_total
            .with_label_values(&["throttled"])
            .inc();
        debug!(rider_id = %rider.id, "location broadcast throttled");
        return false;
    }

    state.publish(vec![DomainEvent::RiderLocationUpdated(RiderLocationUpdated {
        rider_id: rider.id,
        lat: last.lat,
        lng: last.lng,
        battery: last.battery.or(rider.battery),
        ts: chrono::Utc::now(),
    })]);
    state
        .metrics
        .location_broadcasts_total
        .with_label_values(&["sent"])
        .inc();

    true
}
