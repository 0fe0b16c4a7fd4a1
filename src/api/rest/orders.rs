use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use uuid::Uuid;

use crate::engine::intake::{self, ExternalOrder, NewOrder};
use crate::engine::{assignment, status};
use crate::error::AppError;
use crate::models::order::{AssignRequest, OrderView, StatusUpdateRequest};
use crate::models::order_event::OrderEvent;
use crate::state::AppState;
use crate::store::query::{OrderQuery, Page};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/events", get(list_order_events))
        .route("/orders/:id/assign", post(assign_order))
        .route("/orders/:id/reassign", post(reassign_order))
        .route("/orders/:id/status", post(update_order_status))
        .route("/pos/orders", post(import_order))
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewOrder>,
) -> Result<(StatusCode, Json<OrderView>), AppError> {
    let view = intake::create_order(&state, payload)?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Paged order list, newest first. Accepts `branch_id`, `status`,
/// `search`, `date_filter` (today, week, month, all), `page` and `per_page`.
async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderQuery>,
) -> Json<Page<OrderView>> {
    Json(state.store.search_orders(&query, Utc::now()))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(state.store.order_view(id)?))
}

async fn list_order_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OrderEvent>>, AppError> {
    state.store.order(id)?;
    Ok(Json(state.store.order_events_for(id)))
}

async fn assign_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(assignment::assign(&state, id, payload.rider_id).await?))
}

async fn reassign_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(assignment::reassign(&state, id, payload.rider_id).await?))
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<Json<OrderView>, AppError> {
    let view = status::update_status(&state, id, payload.status, payload.reason).await?;
    Ok(Json(view))
}

/// Point-of-sale webhook. Replays of a known `pos_order_id` answer 200
/// with the stored order instead of 201.
async fn import_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExternalOrder>,
) -> Result<(StatusCode, Json<OrderView>), AppError> {
    let (view, created) = intake::import_external_order(&state, payload)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(view)))
}
