//! Alert engine
//!
//! Decides whether an activity record warrants an alert and owns the alert
//! lifecycle (open -> resolved).

use chrono::Utc;
use uuid::Uuid;
use watchpost_risk::scoring::CRITICAL_THRESHOLD;
use watchpost_risk::{level, RiskLevel};

use crate::models::{
    ActiveAlertQuery, ActivityRecord, Alert, AlertCategory, AlertFilter, AlertStatistics,
    CreateAlert, ResolveOutcome, Severity,
};
use crate::store::Store;
use crate::{AppError, AppResult};

/// Severity of a high-risk alert for the given score
pub fn alert_severity(score: f64) -> Severity {
    if score >= CRITICAL_THRESHOLD {
        Severity::Critical
    } else {
        Severity::High
    }
}

pub fn high_risk_message(event_type: &str, score: f64, level: RiskLevel) -> String {
    format!(
        "High-risk activity detected: {} (Risk Score: {:?}, Level: {})",
        event_type, score, level
    )
}

const DEFAULT_ACTIVE_LIMIT: i64 = 100;

pub struct AlertEngine<'a> {
    store: &'a dyn Store,
}

impl<'a> AlertEngine<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// At most one `high_risk` alert per record; nothing below `high`.
    pub async fn evaluate(&self, record: &ActivityRecord, score: f64) -> AppResult<Option<Alert>> {
        let risk_level = level(score);
        if !risk_level.is_alerting() {
            return Ok(None);
        }

        let alert = Alert::new(
            AlertCategory::HighRisk,
            high_risk_message(&record.event_type, score, risk_level),
            alert_severity(score),
            record.source_id,
        );
        let alert = self.store.insert_alert(&alert).await?;

        tracing::info!(
            "Alert {} raised ({}) for '{}'",
            alert.id,
            alert.severity.as_str(),
            record.raw_source_label
        );
        Ok(Some(alert))
    }

    pub async fn create(&self, req: CreateAlert) -> AppResult<Alert> {
        if let Some(source_id) = req.source_id {
            self.store
                .find_source(source_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Source not found".to_string()))?;
        }

        let alert = Alert::new(
            req.category,
            req.message,
            req.severity.unwrap_or(Severity::Medium),
            req.source_id,
        );
        let alert = self.store.insert_alert(&alert).await?;

        tracing::info!("Alert {} created manually ({})", alert.id, alert.category.as_str());
        Ok(alert)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Alert> {
        self.store
            .find_alert(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))
    }

    pub async fn list(&self, filter: &AlertFilter) -> AppResult<Vec<Alert>> {
        Ok(self.store.list_alerts(filter).await?)
    }

    /// Unresolved alerts, optionally of one severity (100 by default)
    pub async fn active(&self, query: &ActiveAlertQuery) -> AppResult<Vec<Alert>> {
        let filter = AlertFilter {
            skip: None,
            limit: Some(query.limit.unwrap_or(DEFAULT_ACTIVE_LIMIT)),
            is_resolved: Some(false),
            severity: query.severity,
        };
        Ok(self.store.list_alerts(&filter).await?)
    }

    /// Resolving twice is a conflict; `resolved_at` is written once.
    pub async fn resolve(&self, id: Uuid) -> AppResult<Alert> {
        match self.store.resolve_alert(id, Utc::now()).await? {
            ResolveOutcome::Resolved(alert) => {
                tracing::info!("Alert {} resolved", alert.id);
                Ok(alert)
            }
            ResolveOutcome::AlreadyResolved(_) => {
                Err(AppError::Conflict("Alert is already resolved".to_string()))
            }
            ResolveOutcome::NotFound => Err(AppError::NotFound("Alert not found".to_string())),
        }
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        if !self.store.delete_alert(id).await? {
            return Err(AppError::NotFound("Alert not found".to_string()));
        }
        tracing::info!("Alert {} deleted", id);
        Ok(())
    }

    pub async fn statistics(&self) -> AppResult<AlertStatistics> {
        Ok(self.store.alert_statistics().await?)
    }
}
