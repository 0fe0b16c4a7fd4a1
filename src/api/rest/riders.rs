use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::ingest::{self, IngestOutcome};
use crate::engine::intake::{self, NewRider, RiderUpdate};
use crate::error::AppError;
use crate::models::location::{LocationBatch, LocationPoint};
use crate::models::rider::{Rider, RiderPosition, RiderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", post(create_rider).get(list_riders))
        .route("/riders/:id", get(get_rider).put(update_rider))
        .route("/riders/:id/order", get(current_order))
        .route("/riders/:id/locations", post(ingest_locations))
        .route("/map/riders", get(map_riders))
}

#[derive(Debug, Default, Deserialize)]
pub struct RiderFilter {
    pub branch_id: Option<Uuid>,
    pub status: Option<RiderStatus>,
}

#[derive(Deserialize)]
pub struct LocationUpload {
    pub points: Vec<LocationPoint>,
}

async fn create_rider(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewRider>,
) -> Result<(StatusCode, Json<Rider>), AppError> {
    let rider = intake::create_rider(&state, payload)?;
    Ok((StatusCode::CREATED, Json(rider)))
}

async fn list_riders(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RiderFilter>,
) -> Json<Vec<Rider>> {
    let mut riders: Vec<Rider> = state
        .store
        .riders
        .iter()
        .filter(|entry| {
            let rider = entry.value();
            filter.branch_id.map_or(true, |id| rider.branch_id == Some(id))
                && filter.status.map_or(true, |status| rider.status == status)
        })
        .map(|entry| entry.value().clone())
        .collect();
    riders.sort_by(|a, b| a.name.cmp(&b.name));

    Json(riders)
}

async fn get_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    Ok(Json(state.store.rider(id)?))
}

async fn update_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RiderUpdate>,
) -> Result<Json<Rider>, AppError> {
    Ok(Json(intake::update_rider(&state, id, payload).await?))
}

async fn current_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    state.store.rider(id)?;

    match state.store.active_order_for(id) {
        Some(order) => Ok(Json(state.store.order_view(order.id)?).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn ingest_locations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationUpload>,
) -> Result<Json<IngestOutcome>, AppError> {
    let batch = LocationBatch {
        rider_id: id,
        points: payload.points,
    };
    Ok(Json(ingest::ingest(&state, batch).await?))
}

async fn map_riders(State(state): State<Arc<AppState>>) -> Json<Vec<RiderPosition>> {
    Json(state.store.rider_positions())
}
