//! In-process store
//!
//! All tables sit behind one `RwLock`, so every trait method is atomic with
//! respect to every other one. Used for `DATABASE_URL=memory` and in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use watchpost_risk::RiskLevel;

use super::{Store, StoreError};
use crate::models::{
    ActivityFilter, ActivityRecord, Alert, AlertFilter, AlertStatistics, LevelBucket,
    ResolveOutcome, SeverityBreakdown, Severity, Source, SourceUpsert, UpdateSource,
    UpsertOutcome, User,
};

#[derive(Default)]
struct Tables {
    sources: HashMap<Uuid, Source>,
    source_names: HashMap<String, Uuid>,
    /// Insertion order
    activity: Vec<ActivityRecord>,
    /// Insertion order
    alerts: Vec<Alert>,
    users: HashMap<Uuid, User>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T: Clone>(items: impl Iterator<Item = T>, skip: i64, limit: i64) -> Vec<T> {
    items.skip(skip.max(0) as usize).take(limit.max(0) as usize).collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_source(&self, upsert: SourceUpsert) -> Result<UpsertOutcome, StoreError> {
        let mut tables = self.tables.write().await;

        let existing = tables.source_names.get(&upsert.name).copied();
        match existing {
            None => {
                let source = Source::new(upsert.name.clone(), upsert.credential_hash, upsert.seen_at);
                tables.source_names.insert(upsert.name, source.id);
                tables.sources.insert(source.id, source.clone());
                Ok(UpsertOutcome::Created(source))
            }
            Some(id) => {
                let source = tables.sources.get_mut(&id).ok_or_else(|| StoreError::NotFound {
                    entity: "Source".to_string(),
                    id: id.to_string(),
                })?;

                if upsert.verify_credential {
                    if let Some(stored) = &source.credential_hash {
                        if upsert.credential_hash.as_deref() != Some(stored.as_str()) {
                            return Ok(UpsertOutcome::CredentialMismatch);
                        }
                    }
                }

                if source.credential_hash.is_none() {
                    source.credential_hash = upsert.credential_hash;
                }
                if upsert.seen_at > source.last_seen {
                    source.last_seen = upsert.seen_at;
                }

                Ok(UpsertOutcome::Refreshed(source.clone()))
            }
        }
    }

    async fn create_source(&self, source: &Source) -> Result<Source, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.source_names.contains_key(&source.name) {
            return Err(StoreError::Constraint(format!(
                "Source '{}' already exists",
                source.name
            )));
        }

        tables.source_names.insert(source.name.clone(), source.id);
        tables.sources.insert(source.id, source.clone());
        Ok(source.clone())
    }

    async fn find_source(&self, id: Uuid) -> Result<Option<Source>, StoreError> {
        Ok(self.tables.read().await.sources.get(&id).cloned())
    }

    async fn find_source_by_name(&self, name: &str) -> Result<Option<Source>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .source_names
            .get(name)
            .and_then(|id| tables.sources.get(id))
            .cloned())
    }

    async fn list_sources(&self, skip: i64, limit: i64) -> Result<Vec<Source>, StoreError> {
        let tables = self.tables.read().await;
        let mut sources: Vec<Source> = tables.sources.values().cloned().collect();
        sources.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(page(sources.into_iter(), skip, limit))
    }

    async fn update_source(
        &self,
        id: Uuid,
        update: &UpdateSource,
    ) -> Result<Option<Source>, StoreError> {
        let mut tables = self.tables.write().await;

        let Some(current_name) = tables.sources.get(&id).map(|s| s.name.clone()) else {
            return Ok(None);
        };

        if let Some(new_name) = &update.name {
            if *new_name != current_name {
                if tables.source_names.contains_key(new_name) {
                    return Err(StoreError::Constraint(format!(
                        "Source '{}' already exists",
                        new_name
                    )));
                }
                tables.source_names.remove(&current_name);
                tables.source_names.insert(new_name.clone(), id);
            }
        }

        let source = tables.sources.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            entity: "Source".to_string(),
            id: id.to_string(),
        })?;
        if let Some(new_name) = &update.name {
            source.name = new_name.clone();
        }
        if let Some(status) = update.status {
            source.status = status;
        }

        Ok(Some(source.clone()))
    }

    async fn delete_source(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;

        let Some(source) = tables.sources.remove(&id) else {
            return Ok(false);
        };
        tables.source_names.remove(&source.name);

        for record in tables.activity.iter_mut().filter(|r| r.source_id == Some(id)) {
            record.source_id = None;
        }
        for alert in tables.alerts.iter_mut().filter(|a| a.source_id == Some(id)) {
            alert.source_id = None;
        }

        Ok(true)
    }

    async fn insert_activity(&self, record: &ActivityRecord) -> Result<ActivityRecord, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.activity.iter().any(|r| r.id == record.id) {
            return Err(StoreError::Constraint(format!("Activity {} already exists", record.id)));
        }
        tables.activity.push(record.clone());
        Ok(record.clone())
    }

    async fn find_activity(&self, id: Uuid) -> Result<Option<ActivityRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.activity.iter().find(|r| r.id == id).cloned())
    }

    async fn list_activity(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let tables = self.tables.read().await;
        let (skip, limit) = filter.bounds();
        let matching = tables
            .activity
            .iter()
            .rev()
            .filter(|r| filter.risk_level.map_or(true, |lvl| r.risk_level == lvl))
            .cloned();
        Ok(page(matching, skip, limit))
    }

    async fn level_buckets_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<LevelBucket>, StoreError> {
        let tables = self.tables.read().await;
        let mut buckets: HashMap<RiskLevel, LevelBucket> = HashMap::new();

        for record in tables.activity.iter().filter(|r| r.created_at >= since) {
            let bucket = buckets.entry(record.risk_level).or_insert(LevelBucket {
                level: record.risk_level,
                count: 0,
                score_sum: 0.0,
            });
            bucket.count += 1;
            bucket.score_sum += record.risk_score;
        }

        Ok(buckets.into_values().collect())
    }

    async fn alerting_activity_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .activity
            .iter()
            .rev()
            .filter(|r| r.created_at >= since && r.risk_level.is_alerting())
            .cloned()
            .collect())
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<Alert, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.alerts.iter().any(|a| a.id == alert.id) {
            return Err(StoreError::Constraint(format!("Alert {} already exists", alert.id)));
        }
        tables.alerts.push(alert.clone());
        Ok(alert.clone())
    }

    async fn find_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let tables = self.tables.read().await;
        let (skip, limit) = filter.bounds();
        let matching = tables
            .alerts
            .iter()
            .rev()
            .filter(|a| filter.is_resolved.map_or(true, |r| a.is_resolved == r))
            .filter(|a| filter.severity.map_or(true, |s| a.severity == s))
            .cloned();
        Ok(page(matching, skip, limit))
    }

    async fn resolve_alert(&self, id: Uuid, at: DateTime<Utc>) -> Result<ResolveOutcome, StoreError> {
        let mut tables = self.tables.write().await;

        let Some(alert) = tables.alerts.iter_mut().find(|a| a.id == id) else {
            return Ok(ResolveOutcome::NotFound);
        };
        if alert.is_resolved {
            return Ok(ResolveOutcome::AlreadyResolved(alert.clone()));
        }

        alert.is_resolved = true;
        alert.resolved_at = Some(at);
        Ok(ResolveOutcome::Resolved(alert.clone()))
    }

    async fn delete_alert(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.alerts.len();
        tables.alerts.retain(|a| a.id != id);
        Ok(tables.alerts.len() != before)
    }

    async fn alert_statistics(&self) -> Result<AlertStatistics, StoreError> {
        let tables = self.tables.read().await;
        let mut stats = AlertStatistics {
            by_severity: SeverityBreakdown::default(),
            ..Default::default()
        };

        for alert in &tables.alerts {
            stats.total += 1;
            if alert.is_resolved {
                stats.resolved += 1;
                continue;
            }
            stats.active += 1;
            match alert.severity {
                Severity::Critical => stats.by_severity.critical += 1,
                Severity::High => stats.by_severity.high += 1,
                _ => {}
            }
        }

        Ok(stats)
    }

    async fn create_user(&self, user: &User) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Constraint(format!(
                "User '{}' already exists",
                user.email
            )));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email == email && u.is_active)
            .cloned())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        Ok(self.tables.read().await.users.len() as i64)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertCategory, SourceStatus};
    use chrono::Duration;

    fn upsert(name: &str, hash: Option<&str>, at: DateTime<Utc>, verify: bool) -> SourceUpsert {
        SourceUpsert {
            name: name.to_string(),
            credential_hash: hash.map(str::to_string),
            seen_at: at,
            verify_credential: verify,
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_once() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let first = store.upsert_source(upsert("ws-1", None, now, false)).await.unwrap();
        let second = store.upsert_source(upsert("ws-1", None, now, false)).await.unwrap();

        let (UpsertOutcome::Created(a), UpsertOutcome::Refreshed(b)) = (first, second) else {
            panic!("expected create then refresh");
        };
        assert_eq!(a.id, b.id);
        assert_eq!(store.list_sources(0, 100).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_converge() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let base = Utc::now();

        let mut tasks = tokio::task::JoinSet::new();
        let mut seen = Vec::new();
        for i in 0..32i64 {
            // Out-of-order timestamps, every third call credentialed
            let at = base + Duration::seconds((i * 7) % 32);
            let hash = (i % 3 == 0).then(|| format!("key-{}", i));
            seen.push(at);

            let store = std::sync::Arc::clone(&store);
            tasks.spawn(async move {
                store
                    .upsert_source(SourceUpsert {
                        name: "ws-1".to_string(),
                        credential_hash: hash,
                        seen_at: at,
                        verify_credential: false,
                    })
                    .await
                    .unwrap()
            });
        }

        let mut created = 0;
        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                UpsertOutcome::Created(s) => {
                    created += 1;
                    outcomes.push(s);
                }
                UpsertOutcome::Refreshed(s) => outcomes.push(s),
                UpsertOutcome::CredentialMismatch => panic!("mismatch without verification"),
            }
        }
        assert_eq!(created, 1);

        let sources = store.list_sources(0, 100).await.unwrap();
        assert_eq!(sources.len(), 1);
        let source = &sources[0];

        assert_eq!(source.last_seen, seen.into_iter().max().unwrap());

        let stored = source.credential_hash.clone().unwrap();
        assert!(stored.starts_with("key-"));
        for outcome in &outcomes {
            assert_eq!(outcome.id, source.id);
            if let Some(hash) = &outcome.credential_hash {
                assert_eq!(hash, &stored);
            }
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_latest_last_seen() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store.upsert_source(upsert("ws-1", None, now, false)).await.unwrap();
        let older = now - Duration::seconds(30);
        let outcome = store.upsert_source(upsert("ws-1", None, older, false)).await.unwrap();

        let UpsertOutcome::Refreshed(source) = outcome else { panic!("expected refresh") };
        assert_eq!(source.last_seen, now);
    }

    #[tokio::test]
    async fn test_upsert_attaches_credential_once() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store.upsert_source(upsert("ws-1", None, now, false)).await.unwrap();
        store.upsert_source(upsert("ws-1", Some("aaa"), now, false)).await.unwrap();
        let outcome = store.upsert_source(upsert("ws-1", Some("bbb"), now, false)).await.unwrap();

        let UpsertOutcome::Refreshed(source) = outcome else { panic!("expected refresh") };
        assert_eq!(source.credential_hash.as_deref(), Some("aaa"));
    }

    #[tokio::test]
    async fn test_upsert_mismatch_leaves_row_untouched() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store.upsert_source(upsert("ws-1", Some("aaa"), now, true)).await.unwrap();
        let later = now + Duration::seconds(10);
        let outcome = store.upsert_source(upsert("ws-1", Some("bbb"), later, true)).await.unwrap();
        assert!(matches!(outcome, UpsertOutcome::CredentialMismatch));

        let source = store.find_source_by_name("ws-1").await.unwrap().unwrap();
        assert_eq!(source.last_seen, now);
    }

    #[tokio::test]
    async fn test_rename_and_duplicate_name() {
        let store = MemoryStore::new();
        let a = store.create_source(&Source::new("a".into(), None, Utc::now())).await.unwrap();
        store.create_source(&Source::new("b".into(), None, Utc::now())).await.unwrap();

        let clash = UpdateSource { name: Some("b".into()), status: None };
        assert!(matches!(
            store.update_source(a.id, &clash).await,
            Err(StoreError::Constraint(_))
        ));

        let rename = UpdateSource { name: Some("c".into()), status: Some(SourceStatus::Inactive) };
        let updated = store.update_source(a.id, &rename).await.unwrap().unwrap();
        assert_eq!(updated.name, "c");
        assert_eq!(updated.status, SourceStatus::Inactive);
        assert!(store.find_source_by_name("a").await.unwrap().is_none());
        assert!(store.find_source_by_name("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_source_clears_alert_reference() {
        let store = MemoryStore::new();
        let source = store.create_source(&Source::new("ws-9".into(), None, Utc::now())).await.unwrap();
        let alert = Alert::new(
            AlertCategory::HighRisk,
            "test".into(),
            Severity::High,
            Some(source.id),
        );
        store.insert_alert(&alert).await.unwrap();

        assert!(store.delete_source(source.id).await.unwrap());
        assert!(!store.delete_source(source.id).await.unwrap());

        let alert = store.find_alert(alert.id).await.unwrap().unwrap();
        assert_eq!(alert.source_id, None);
    }
}
