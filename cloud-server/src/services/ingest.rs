//! Report ingestion

use chrono::Utc;
use uuid::Uuid;
use watchpost_risk::{level, normalize};

use super::alerts::AlertEngine;
use super::registry::SourceRegistry;
use crate::config::CredentialPolicy;
use crate::models::{ActivityRecord, Alert};
use crate::store::Store;
use crate::{AppError, AppResult};

/// A report after transport decoding, before normalization
#[derive(Debug, Clone)]
pub struct InboundReport {
    pub identity: String,
    pub event_type: String,
    pub subject: Option<String>,
    pub risk_score: f64,
    pub credential: Option<String>,
}

pub fn describe(subject: Option<&str>) -> Option<String> {
    subject.map(|s| format!("Activity in {}", s))
}

/// Persist one report and run alert evaluation on it.
///
/// The stored level is always derived from the (clamped) score; a well-formed
/// report is never refused because of its risk.
pub async fn ingest(
    store: &dyn Store,
    policy: CredentialPolicy,
    report: InboundReport,
) -> AppResult<(ActivityRecord, Option<Alert>)> {
    let identity = report.identity.trim();
    let event_type = report.event_type.trim();
    if identity.is_empty() {
        return Err(AppError::ValidationError("sourceId must not be empty".to_string()));
    }
    if event_type.is_empty() {
        return Err(AppError::ValidationError("eventType must not be empty".to_string()));
    }
    if !report.risk_score.is_finite() {
        return Err(AppError::ValidationError("riskScore must be a finite number".to_string()));
    }

    let subject = report
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let score = normalize(report.risk_score);

    let source = SourceRegistry::new(store, policy)
        .resolve_or_create(identity, report.credential.as_deref())
        .await?;

    let record = ActivityRecord {
        id: Uuid::new_v4(),
        source_id: Some(source.id),
        raw_source_label: identity.to_string(),
        event_type: event_type.to_string(),
        description: describe(subject.as_deref()),
        subject_label: subject,
        risk_score: score,
        risk_level: level(score),
        created_at: Utc::now(),
    };
    let record = store.insert_activity(&record).await?;

    tracing::debug!(
        "Activity {} from '{}' scored {} ({})",
        record.id,
        identity,
        score,
        record.risk_level
    );

    let alert = AlertEngine::new(store).evaluate(&record, score).await?;
    Ok((record, alert))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertFilter, Severity, SourceStatus};
    use crate::store::MemoryStore;
    use watchpost_risk::RiskLevel;

    fn report(identity: &str, score: f64) -> InboundReport {
        InboundReport {
            identity: identity.to_string(),
            event_type: "KEYWORD".to_string(),
            subject: Some("notepad.exe".to_string()),
            risk_score: score,
            credential: None,
        }
    }

    #[tokio::test]
    async fn test_first_report_registers_source_and_alerts() {
        let store = MemoryStore::new();

        let (record, alert) = ingest(&store, CredentialPolicy::Optional, report("ws-7", 8.5))
            .await
            .unwrap();

        let source = store.find_source_by_name("ws-7").await.unwrap().unwrap();
        assert_eq!(source.status, SourceStatus::Active);
        assert_eq!(record.source_id, Some(source.id));
        assert_eq!(record.risk_level, RiskLevel::Critical);
        assert_eq!(record.description.as_deref(), Some("Activity in notepad.exe"));

        let alert = alert.unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.source_id, Some(source.id));

        let alerts = store.list_alerts(&AlertFilter::default()).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(store.alert_statistics().await.unwrap().active >= 1);
    }

    #[tokio::test]
    async fn test_low_score_stored_without_alert() {
        let store = MemoryStore::new();

        let (record, alert) = ingest(&store, CredentialPolicy::Optional, report("ws-1", 2.0))
            .await
            .unwrap();

        assert_eq!(record.risk_level, RiskLevel::Low);
        assert!(alert.is_none());
        assert!(store.find_activity(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_normalizes_input() {
        let store = MemoryStore::new();
        let mut input = report("  ws-2  ", 42.0);
        input.subject = Some("   ".to_string());

        let (record, alert) = ingest(&store, CredentialPolicy::Optional, input).await.unwrap();

        assert_eq!(record.raw_source_label, "ws-2");
        assert_eq!(record.risk_score, 10.0);
        assert_eq!(record.risk_level, RiskLevel::Critical);
        assert!(record.subject_label.is_none());
        assert!(record.description.is_none());
        assert!(alert.is_some());

        let (record, _) = ingest(&store, CredentialPolicy::Optional, report("ws-2", -3.0))
            .await
            .unwrap();
        assert_eq!(record.risk_score, 0.0);
        assert_eq!(store.list_sources(0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_malformed() {
        let store = MemoryStore::new();

        let mut blank = report("ws-3", 1.0);
        blank.event_type = " ".to_string();
        assert!(matches!(
            ingest(&store, CredentialPolicy::Optional, blank).await,
            Err(AppError::ValidationError(_))
        ));

        assert!(matches!(
            ingest(&store, CredentialPolicy::Optional, report("", 1.0)).await,
            Err(AppError::ValidationError(_))
        ));

        assert!(matches!(
            ingest(&store, CredentialPolicy::Optional, report("ws-3", f64::NAN)).await,
            Err(AppError::ValidationError(_))
        ));

        assert!(store.find_source_by_name("ws-3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_required_policy_blocks_record() {
        let store = MemoryStore::new();

        let result = ingest(&store, CredentialPolicy::Required, report("ws-4", 9.0)).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));

        let stats = store.alert_statistics().await.unwrap();
        assert_eq!(stats.total, 0);
    }
}
