//! Source management handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppError, AppResult};
use crate::middleware::auth::{require_admin, UserContext};
use crate::models::{CreateSource, ListQuery, Source, UpdateSource};
use crate::services::registry::hash_token;
use crate::store::StoreError;

fn duplicate_name(name: &str) -> impl FnOnce(StoreError) -> AppError + '_ {
    move |err| match err {
        StoreError::Constraint(_) => {
            AppError::AlreadyExists(format!("Source '{}' already exists", name))
        }
        other => other.into(),
    }
}

/// GET /api/sources
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Source>>> {
    let Query(query) = query?;

    let (skip, limit) = query.bounds();
    Ok(Json(state.store.list_sources(skip, limit).await?))
}

/// POST /api/sources
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateSource>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Source>)> {
    let Json(req) = payload?;
    req.validate()?;

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::ValidationError("name must not be empty".to_string()));
    }

    let source = Source::new(name, req.credential.as_deref().map(hash_token), Utc::now());
    let source = state.store
        .create_source(&source)
        .await
        .map_err(duplicate_name(&source.name))?;

    tracing::info!("Source registered manually: {} ({})", source.name, source.id);

    Ok((StatusCode::CREATED, Json(source)))
}

/// GET /api/sources/:id
pub async fn get(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Source>> {
    let Path(id) = id?;

    let source = state.store
        .find_source(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Source not found".to_string()))?;

    Ok(Json(source))
}

/// PUT /api/sources/:id
pub async fn update(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateSource>, JsonRejection>,
) -> AppResult<Json<Source>> {
    let Path(id) = id?;

    let Json(mut req) = payload?;
    req.validate()?;

    req.name = req.name.map(|n| n.trim().to_string());
    if req.name.as_deref() == Some("") {
        return Err(AppError::ValidationError("name must not be empty".to_string()));
    }

    let new_name = req.name.clone().unwrap_or_default();
    let source = state.store
        .update_source(id, &req)
        .await
        .map_err(duplicate_name(&new_name))?
        .ok_or_else(|| AppError::NotFound("Source not found".to_string()))?;

    Ok(Json(source))
}

/// DELETE /api/sources/:id (admin only)
pub async fn delete(
    State(state): State<AppState>,
    user: UserContext,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = id?;

    require_admin(&user)?;

    if !state.store.delete_source(id).await? {
        return Err(AppError::NotFound("Source not found".to_string()));
    }

    tracing::info!("Source {} deleted by {}", id, user.user_id);
    Ok(StatusCode::NO_CONTENT)
}
