//! Activity handlers
//!
//! `ingest` is the reporter-facing endpoint; everything else sits behind
//! the admin JWT.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;
use validator::Validate;
use watchpost_risk::{ActivityReport, CREDENTIAL_HEADER, LEGACY_CREDENTIAL_HEADER};

use crate::{AppState, AppResult};
use crate::models::{ActivityFilter, ActivityRecord, CreateActivity, IngestResponse, RiskStatistics, WindowQuery};
use crate::services::activity;
use crate::services::ingest::{self, InboundReport};

/// POST /api/activity - Accept one report from an endpoint agent
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ActivityReport>, JsonRejection>,
) -> AppResult<(StatusCode, Json<IngestResponse>)> {
    let Json(report) = payload?;
    report.validate()?;

    let credential = [CREDENTIAL_HEADER, LEGACY_CREDENTIAL_HEADER]
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (record, alert) = ingest::ingest(
        state.store.as_ref(),
        state.config.credential_policy,
        InboundReport {
            identity: report.source_id,
            event_type: report.event_type,
            subject: report.subject,
            risk_score: report.risk_score,
            credential,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(IngestResponse {
        message: "Activity logged successfully",
        activity_id: record.id,
        risk_level: record.risk_level,
        alert_id: alert.map(|a| a.id),
    })))
}

/// GET /api/activity/records
pub async fn list(
    State(state): State<AppState>,
    filter: Result<Query<ActivityFilter>, QueryRejection>,
) -> AppResult<Json<Vec<ActivityRecord>>> {
    let Query(filter) = filter?;
    Ok(Json(activity::list(state.store.as_ref(), &filter).await?))
}

/// POST /api/activity/records
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateActivity>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ActivityRecord>)> {
    let Json(req) = payload?;
    req.validate()?;

    let record = activity::create(state.store.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/activity/records/:id
pub async fn get(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ActivityRecord>> {
    let Path(id) = id?;
    Ok(Json(activity::get(state.store.as_ref(), id).await?))
}

/// GET /api/activity/stats?hours=N
pub async fn stats(
    State(state): State<AppState>,
    window: Result<Query<WindowQuery>, QueryRejection>,
) -> AppResult<Json<RiskStatistics>> {
    let Query(window) = window?;
    Ok(Json(activity::risk_statistics(state.store.as_ref(), window.hours()).await?))
}

/// GET /api/activity/high-risk?hours=N
pub async fn high_risk(
    State(state): State<AppState>,
    window: Result<Query<WindowQuery>, QueryRejection>,
) -> AppResult<Json<Vec<ActivityRecord>>> {
    let Query(window) = window?;
    Ok(Json(activity::recent_high_risk(state.store.as_ref(), window.hours()).await?))
}
