use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::intake::{self, BranchUpdate, NewBranch};
use crate::error::AppError;
use crate::models::branch::Branch;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/branches", post(create_branch).get(list_branches))
        .route(
            "/branches/:id",
            get(get_branch).put(update_branch).delete(delete_branch),
        )
        .route("/branches/:id/activate", post(activate_branch))
        .route("/branches/:id/deactivate", post(deactivate_branch))
}

#[derive(Debug, Default, Deserialize)]
pub struct BranchFilter {
    pub is_active: Option<bool>,
}

#[derive(Serialize)]
pub struct BranchView {
    #[serde(flatten)]
    pub branch: Branch,
    pub is_open: bool,
}

impl From<Branch> for BranchView {
    fn from(branch: Branch) -> Self {
        let is_open = branch.is_active && branch.is_open_at(Local::now().time());
        Self { branch, is_open }
    }
}

async fn create_branch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBranch>,
) -> Result<(StatusCode, Json<BranchView>), AppError> {
    let branch = intake::create_branch(&state, payload)?;
    Ok((StatusCode::CREATED, Json(branch.into())))
}

async fn list_branches(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<BranchFilter>,
) -> Json<Vec<BranchView>> {
    let mut branches: Vec<Branch> = state
        .store
        .branches
        .iter()
        .filter(|entry| {
            filter
                .is_active
                .map_or(true, |active| entry.value().is_active == active)
        })
        .map(|entry| entry.value().clone())
        .collect();
    branches.sort_by(|a, b| a.code.cmp(&b.code));

    Json(branches.into_iter().map(BranchView::from).collect())
}

async fn get_branch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BranchView>, AppError> {
    Ok(Json(state.store.branch(id)?.into()))
}

async fn update_branch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BranchUpdate>,
) -> Result<Json<BranchView>, AppError> {
    Ok(Json(intake::update_branch(&state, id, payload)?.into()))
}

async fn delete_branch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    intake::delete_branch(&state, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn activate_branch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BranchView>, AppError> {
    Ok(Json(intake::set_branch_active(&state, id, true)?.into()))
}

async fn deactivate_branch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BranchView>, AppError> {
    Ok(Json(intake::set_branch_active(&state, id, false)?.into()))
}
