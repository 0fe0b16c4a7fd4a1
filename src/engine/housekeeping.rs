use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::HousekeepingConfig;
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;
use crate::store::locks::RowKey;
use crate::store::UniqueKey;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub orders: usize,
    pub order_events: usize,
    pub locations: usize,
    pub throttle_keys: usize,
    pub lock_cells: usize,
}

/// Runs [`purge`] every `config.interval` until the task is dropped.
pub async fn run_housekeeping(state: Arc<AppState>, config: HousekeepingConfig) {
    if config.interval.is_zero() {
        warn!("housekeeping disabled: interval is zero");
        return;
    }

    let mut interval = tokio::time::interval(config.interval);
    info!(interval_secs = config.interval.as_secs(), "housekeeping started");

    loop {
        interval.tick().await;

        match purge(&state, &config, Utc::now()).await {
            Ok(report) => debug!(?report, "housekeeping pass finished"),
            Err(err) => error!(error = %err, "housekeeping pass failed"),
        }
    }
}

/// Drops finished orders (with their audit rows) and location samples older
/// than the configured retention, then expired throttle keys and idle lock
/// cells. Orders whose lock cannot be taken are left for the next pass.
pub async fn purge(
    state: &AppState,
    config: &HousekeepingConfig,
    now: DateTime<Utc>,
) -> Result<PurgeReport, AppError> {
    let mut report = PurgeReport::default();

    let order_cutoff = retention_cutoff(now, config.order_retention_days)?;
    let location_cutoff = retention_cutoff(now, config.location_retention_days)?;

    let candidates: Vec<Uuid> = state
        .store
        .orders
        .iter()
        .filter(|entry| is_expired(entry.value(), config, order_cutoff))
        .map(|entry| *entry.key())
        .collect();

    for order_id in candidates {
        let _guard = match state.store.locks.acquire(RowKey::Order(order_id)).await {
            Ok(guard) => guard,
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "skipping locked order");
                continue;
            }
        };

        // Re-check under the lock; the order may have moved on.
        let Some((_, order)) = state
            .store
            .orders
            .remove_if(&order_id, |_, order| is_expired(order, config, order_cutoff))
        else {
            continue;
        };

        if let Some(code) = &order.code {
            state.store.release(UniqueKey::OrderCode, code);
        }
        if let Some((_, events)) = state.store.order_events.remove(&order_id) {
            report.order_events += events.len();
        }
        report.orders += 1;
    }

    for mut entry in state.store.locations.iter_mut() {
        let samples = entry.value_mut();
        let before = samples.len();
        samples.retain(|sample| sample.created_at >= location_cutoff);
        report.locations += before - samples.len();
    }
    state.store.locations.retain(|_, samples| !samples.is_empty());

    report.throttle_keys = state.throttle.purge_expired().await;
    report.lock_cells = state.store.locks.prune();

    let purged = &state.metrics.housekeeping_purged_total;
    purged.with_label_values(&["orders"]).inc_by(report.orders as u64);
    purged
        .with_label_values(&["order_events"])
        .inc_by(report.order_events as u64);
    purged
        .with_label_values(&["locations"])
        .inc_by(report.locations as u64);
    purged
        .with_label_values(&["throttle_keys"])
        .inc_by(report.throttle_keys as u64);

    if report.orders > 0 || report.locations > 0 {
        info!(
            orders = report.orders,
            order_events = report.order_events,
            locations = report.locations,
            "housekeeping purged old rows"
        );
    }

    Ok(report)
}

fn retention_cutoff(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, AppError> {
    if days < 0 {
        return Err(AppError::Internal(format!(
            "retention of {days} days is negative"
        )));
    }
    Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| AppError::Internal(format!("retention of {days} days is out of range")))
}

fn is_expired(order: &Order, config: &HousekeepingConfig, cutoff: DateTime<Utc>) -> bool {
    if !order.status.is_terminal() || order.updated_at >= cutoff {
        return false;
    }
    !(config.keep_failed_orders && order.status == OrderStatus::Failed)
}
