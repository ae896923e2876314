//! Alert handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppResult};
use crate::middleware::auth::{require_admin, UserContext};
use crate::models::{ActiveAlertQuery, Alert, AlertFilter, AlertStatistics, CreateAlert};
use crate::services::alerts::AlertEngine;

/// GET /api/alerts
pub async fn list(
    State(state): State<AppState>,
    filter: Result<Query<AlertFilter>, QueryRejection>,
) -> AppResult<Json<Vec<Alert>>> {
    let Query(filter) = filter?;
    Ok(Json(AlertEngine::new(state.store.as_ref()).list(&filter).await?))
}

/// POST /api/alerts
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateAlert>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Alert>)> {
    let Json(req) = payload?;
    req.validate()?;

    let alert = AlertEngine::new(state.store.as_ref()).create(req).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// GET /api/alerts/active
pub async fn active(
    State(state): State<AppState>,
    query: Result<Query<ActiveAlertQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Alert>>> {
    let Query(query) = query?;
    Ok(Json(AlertEngine::new(state.store.as_ref()).active(&query).await?))
}

/// GET /api/alerts/stats
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<AlertStatistics>> {
    Ok(Json(AlertEngine::new(state.store.as_ref()).statistics().await?))
}

/// GET /api/alerts/:id
pub async fn get(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Alert>> {
    let Path(id) = id?;
    Ok(Json(AlertEngine::new(state.store.as_ref()).get(id).await?))
}

/// PUT /api/alerts/:id/resolve
pub async fn resolve(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Alert>> {
    let Path(id) = id?;
    Ok(Json(AlertEngine::new(state.store.as_ref()).resolve(id).await?))
}

/// DELETE /api/alerts/:id (admin only)
pub async fn delete(
    State(state): State<AppState>,
    user: UserContext,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = id?;

    require_admin(&user)?;

    AlertEngine::new(state.store.as_ref()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
