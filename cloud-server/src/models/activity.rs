//! Activity record model

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;
use watchpost_risk::RiskLevel;

/// One accepted report. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    /// Lookup reference only; cleared if the source is deleted
    pub source_id: Option<Uuid>,
    /// Identity exactly as reported
    pub raw_source_label: String,
    pub event_type: String,
    pub subject_label: Option<String>,
    pub description: Option<String>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn is_suspicious(&self) -> bool {
        self.risk_level.is_alerting()
    }
}

/// Manual record creation from the administrative surface
#[derive(Debug, Deserialize, Validate)]
pub struct CreateActivity {
    pub source_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255))]
    pub raw_source_label: String,
    #[validate(length(min = 1, max = 100))]
    pub event_type: String,
    #[validate(length(max = 255))]
    pub subject_label: Option<String>,
    pub description: Option<String>,
    pub risk_score: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityFilter {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub risk_level: Option<RiskLevel>,
}

impl ActivityFilter {
    pub fn bounds(&self) -> (i64, i64) {
        (self.skip.unwrap_or(0).max(0), self.limit.unwrap_or(100).clamp(1, 1000))
    }
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub hours: Option<i64>,
}

impl WindowQuery {
    pub fn hours(&self) -> i64 {
        self.hours.unwrap_or(24).clamp(1, 24 * 365)
    }
}

/// Per-level aggregate over a time window, as returned by the store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelBucket {
    pub level: RiskLevel,
    pub count: i64,
    pub score_sum: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskDistribution {
    pub low: i64,
    pub medium: i64,
    pub high: i64,
    pub critical: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskStatistics {
    pub total_activities: i64,
    pub risk_distribution: RiskDistribution,
    pub average_risk_score: f64,
    pub period_hours: i64,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub message: &'static str,
    pub activity_id: Uuid,
    pub risk_level: RiskLevel,
    pub alert_id: Option<Uuid>,
}
