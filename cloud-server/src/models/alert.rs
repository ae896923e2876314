//! Alert model

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;
use watchpost_risk::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    HighRisk,
    SuspiciousActivity,
    SourceOffline,
    RepeatedFailedAuth,
    CriticalKeyword,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighRisk => "high_risk",
            Self::SuspiciousActivity => "suspicious_activity",
            Self::SourceOffline => "source_offline",
            Self::RepeatedFailedAuth => "repeated_failed_auth",
            Self::CriticalKeyword => "critical_keyword",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high_risk" => Some(Self::HighRisk),
            "suspicious_activity" => Some(Self::SuspiciousActivity),
            "source_offline" => Some(Self::SourceOffline),
            "repeated_failed_auth" => Some(Self::RepeatedFailedAuth),
            "critical_keyword" => Some(Self::CriticalKeyword),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl From<RiskLevel> for Severity {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => Self::Low,
            RiskLevel::Medium => Self::Medium,
            RiskLevel::High => Self::High,
            RiskLevel::Critical => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub source_id: Option<Uuid>,
    pub category: AlertCategory,
    pub message: String,
    pub severity: Severity,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        category: AlertCategory,
        message: String,
        severity: Severity,
        source_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            category,
            message,
            severity,
            is_resolved: false,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical && !self.is_resolved
    }
}

/// Result of a conditional resolve
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    Resolved(Alert),
    AlreadyResolved(Alert),
    NotFound,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAlert {
    pub category: AlertCategory,
    #[validate(length(min = 1, max = 1000))]
    pub message: String,
    pub severity: Option<Severity>,
    pub source_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertFilter {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub is_resolved: Option<bool>,
    pub severity: Option<Severity>,
}

impl AlertFilter {
    pub fn bounds(&self) -> (i64, i64) {
        (self.skip.unwrap_or(0).max(0), self.limit.unwrap_or(100).clamp(1, 1000))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ActiveAlertQuery {
    pub severity: Option<Severity>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeverityBreakdown {
    pub critical: i64,
    pub high: i64,
}

/// Aggregate alert counts. `by_severity` covers unresolved alerts only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertStatistics {
    pub total: i64,
    pub active: i64,
    pub resolved: i64,
    pub by_severity: SeverityBreakdown,
}
