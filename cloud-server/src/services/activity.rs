//! Activity queries and manual records

use chrono::{Duration, Utc};
use uuid::Uuid;
use watchpost_risk::{level, normalize, round2, RiskLevel};

use crate::models::{
    ActivityFilter, ActivityRecord, CreateActivity, LevelBucket, RiskDistribution, RiskStatistics,
};
use crate::store::Store;
use crate::{AppError, AppResult};

/// Fold per-level buckets into the windowed summary
pub fn summarize(buckets: &[LevelBucket], period_hours: i64) -> RiskStatistics {
    let mut distribution = RiskDistribution::default();
    let mut total = 0;
    let mut score_sum = 0.0;

    for bucket in buckets {
        let slot = match bucket.level {
            RiskLevel::Low => &mut distribution.low,
            RiskLevel::Medium => &mut distribution.medium,
            RiskLevel::High => &mut distribution.high,
            RiskLevel::Critical => &mut distribution.critical,
        };
        *slot += bucket.count;
        total += bucket.count;
        score_sum += bucket.score_sum;
    }

    let average = if total > 0 { round2(score_sum / total as f64) } else { 0.0 };

    RiskStatistics {
        total_activities: total,
        risk_distribution: distribution,
        average_risk_score: average,
        period_hours,
    }
}

pub async fn risk_statistics(store: &dyn Store, hours: i64) -> AppResult<RiskStatistics> {
    let since = Utc::now() - Duration::hours(hours);
    let buckets = store.level_buckets_since(since).await?;
    Ok(summarize(&buckets, hours))
}

/// High and critical records from the last `hours`
pub async fn recent_high_risk(store: &dyn Store, hours: i64) -> AppResult<Vec<ActivityRecord>> {
    let since = Utc::now() - Duration::hours(hours);
    Ok(store.alerting_activity_since(since).await?)
}

pub async fn list(store: &dyn Store, filter: &ActivityFilter) -> AppResult<Vec<ActivityRecord>> {
    Ok(store.list_activity(filter).await?)
}

pub async fn get(store: &dyn Store, id: Uuid) -> AppResult<ActivityRecord> {
    store
        .find_activity(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Activity record not found".to_string()))
}

/// Administrative record. The level is derived here like any reported one;
/// no alert evaluation runs.
pub async fn create(store: &dyn Store, req: CreateActivity) -> AppResult<ActivityRecord> {
    if !req.risk_score.is_finite() {
        return Err(AppError::ValidationError("risk_score must be a finite number".to_string()));
    }
    if let Some(source_id) = req.source_id {
        store
            .find_source(source_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Source not found".to_string()))?;
    }

    let score = normalize(req.risk_score);
    let record = ActivityRecord {
        id: Uuid::new_v4(),
        source_id: req.source_id,
        raw_source_label: req.raw_source_label,
        event_type: req.event_type,
        subject_label: req.subject_label,
        description: req.description,
        risk_score: score,
        risk_level: level(score),
        created_at: Utc::now(),
    };

    Ok(store.insert_activity(&record).await?)
}
