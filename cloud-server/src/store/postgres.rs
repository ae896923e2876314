//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;
use watchpost_risk::RiskLevel;

use super::{Store, StoreError};
use crate::models::{
    ActivityFilter, ActivityRecord, Alert, AlertCategory, AlertFilter, AlertStatistics,
    LevelBucket, ResolveOutcome, Severity, SeverityBreakdown, Source, SourceStatus, SourceUpsert,
    UpdateSource, UpsertOutcome, User, UserRole,
};

const SOURCE_COLUMNS: &str = "id, name, credential_hash, status, last_seen, created_at";
const ACTIVITY_COLUMNS: &str = "id, source_id, raw_source_label, event_type, subject_label, \
                                description, risk_score, risk_level, created_at";
const ALERT_COLUMNS: &str =
    "id, source_id, category, message, severity, is_resolved, resolved_at, created_at";
const USER_COLUMNS: &str =
    "id, email, password_hash, name, role, is_active, last_login, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn unknown(kind: &str, value: &str) -> StoreError {
    StoreError::Serialization(format!("Unknown {}: {}", kind, value))
}

#[derive(FromRow)]
struct SourceRow {
    id: Uuid,
    name: String,
    credential_hash: Option<String>,
    status: String,
    last_seen: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SourceRow> for Source {
    type Error = StoreError;

    fn try_from(row: SourceRow) -> Result<Self, Self::Error> {
        Ok(Source {
            id: row.id,
            name: row.name,
            credential_hash: row.credential_hash,
            status: SourceStatus::parse(&row.status).ok_or_else(|| unknown("source status", &row.status))?,
            last_seen: row.last_seen,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct SourceUpsertRow {
    #[sqlx(flatten)]
    source: SourceRow,
    inserted: bool,
}

#[derive(FromRow)]
struct ActivityRow {
    id: Uuid,
    source_id: Option<Uuid>,
    raw_source_label: String,
    event_type: String,
    subject_label: Option<String>,
    description: Option<String>,
    risk_score: f64,
    risk_level: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for ActivityRecord {
    type Error = StoreError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        Ok(ActivityRecord {
            id: row.id,
            source_id: row.source_id,
            raw_source_label: row.raw_source_label,
            event_type: row.event_type,
            subject_label: row.subject_label,
            description: row.description,
            risk_score: row.risk_score,
            risk_level: row
                .risk_level
                .parse::<RiskLevel>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct AlertRow {
    id: Uuid,
    source_id: Option<Uuid>,
    category: String,
    message: String,
    severity: String,
    is_resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: row.id,
            source_id: row.source_id,
            category: AlertCategory::parse(&row.category)
                .ok_or_else(|| unknown("alert category", &row.category))?,
            message: row.message,
            severity: Severity::parse(&row.severity)
                .ok_or_else(|| unknown("severity", &row.severity))?,
            is_resolved: row.is_resolved,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: Option<String>,
    role: String,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role: UserRole::parse(&row.role).ok_or_else(|| unknown("role", &row.role))?,
            is_active: row.is_active,
            last_login: row.last_login,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ============================================================================
// STORE
// ============================================================================

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_source(&self, upsert: SourceUpsert) -> Result<UpsertOutcome, StoreError> {
        // One statement: insert, or refresh the existing row. The WHERE clause on the
        // conflict branch turns a credential mismatch into "no row returned".
        let row = sqlx::query_as::<_, SourceUpsertRow>(&format!(
            r#"
            INSERT INTO sources (id, name, credential_hash, status, last_seen, created_at)
            VALUES ($1, $2, $3, 'active', $4, $4)
            ON CONFLICT (name) DO UPDATE SET
                credential_hash = COALESCE(sources.credential_hash, EXCLUDED.credential_hash),
                last_seen = GREATEST(sources.last_seen, EXCLUDED.last_seen)
            WHERE NOT $5
               OR sources.credential_hash IS NULL
               OR sources.credential_hash = EXCLUDED.credential_hash
            RETURNING {}, (xmax = 0) AS inserted
            "#,
            SOURCE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&upsert.name)
        .bind(&upsert.credential_hash)
        .bind(upsert.seen_at)
        .bind(upsert.verify_credential)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(UpsertOutcome::CredentialMismatch),
            Some(row) if row.inserted => Ok(UpsertOutcome::Created(row.source.try_into()?)),
            Some(row) => Ok(UpsertOutcome::Refreshed(row.source.try_into()?)),
        }
    }

    async fn create_source(&self, source: &Source) -> Result<Source, StoreError> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            r#"
            INSERT INTO sources (id, name, credential_hash, status, last_seen, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            SOURCE_COLUMNS
        ))
        .bind(source.id)
        .bind(&source.name)
        .bind(&source.credential_hash)
        .bind(source.status.as_str())
        .bind(source.last_seen)
        .bind(source.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_source(&self, id: Uuid) -> Result<Option<Source>, StoreError> {
        sqlx::query_as::<_, SourceRow>(&format!("SELECT {} FROM sources WHERE id = $1", SOURCE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Source::try_from)
            .transpose()
    }

    async fn find_source_by_name(&self, name: &str) -> Result<Option<Source>, StoreError> {
        sqlx::query_as::<_, SourceRow>(&format!("SELECT {} FROM sources WHERE name = $1", SOURCE_COLUMNS))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .map(Source::try_from)
            .transpose()
    }

    async fn list_sources(&self, skip: i64, limit: i64) -> Result<Vec<Source>, StoreError> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            r#"
            SELECT {} FROM sources
            ORDER BY last_seen DESC
            LIMIT $1 OFFSET $2
            "#,
            SOURCE_COLUMNS
        ))
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn update_source(
        &self,
        id: Uuid,
        update: &UpdateSource,
    ) -> Result<Option<Source>, StoreError> {
        sqlx::query_as::<_, SourceRow>(&format!(
            r#"
            UPDATE sources
            SET name = COALESCE($2, name),
                status = COALESCE($3, status)
            WHERE id = $1
            RETURNING {}
            "#,
            SOURCE_COLUMNS
        ))
        .bind(id)
        .bind(&update.name)
        .bind(update.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?
        .map(Source::try_from)
        .transpose()
    }

    async fn delete_source(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sources WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_activity(&self, record: &ActivityRecord) -> Result<ActivityRecord, StoreError> {
        let row = sqlx::query_as::<_, ActivityRow>(&format!(
            r#"
            INSERT INTO activity_records
                (id, source_id, raw_source_label, event_type, subject_label, description, risk_score, risk_level, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            ACTIVITY_COLUMNS
        ))
        .bind(record.id)
        .bind(record.source_id)
        .bind(&record.raw_source_label)
        .bind(&record.event_type)
        .bind(&record.subject_label)
        .bind(&record.description)
        .bind(record.risk_score)
        .bind(record.risk_level.as_str())
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_activity(&self, id: Uuid) -> Result<Option<ActivityRecord>, StoreError> {
        sqlx::query_as::<_, ActivityRow>(&format!(
            "SELECT {} FROM activity_records WHERE id = $1",
            ACTIVITY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(ActivityRecord::try_from)
        .transpose()
    }

    async fn list_activity(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let (skip, limit) = filter.bounds();

        let rows = sqlx::query_as::<_, ActivityRow>(&format!(
            r#"
            SELECT {} FROM activity_records
            WHERE ($1::VARCHAR IS NULL OR risk_level = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            ACTIVITY_COLUMNS
        ))
        .bind(filter.risk_level.map(|l| l.as_str()))
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn level_buckets_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<LevelBucket>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT risk_level, COUNT(*) AS count, COALESCE(SUM(risk_score), 0) AS score_sum
            FROM activity_records
            WHERE created_at >= $1
            GROUP BY risk_level
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let level: String = r.get("risk_level");
                Ok(LevelBucket {
                    level: level
                        .parse()
                        .map_err(|e: watchpost_risk::UnknownRiskLevel| StoreError::Serialization(e.to_string()))?,
                    count: r.get::<i64, _>("count"),
                    score_sum: r.get::<f64, _>("score_sum"),
                })
            })
            .collect()
    }

    async fn alerting_activity_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ActivityRow>(&format!(
            r#"
            SELECT {} FROM activity_records
            WHERE created_at >= $1 AND risk_level IN ('high', 'critical')
            ORDER BY created_at DESC
            "#,
            ACTIVITY_COLUMNS
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<Alert, StoreError> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            INSERT INTO alerts (id, source_id, category, message, severity, is_resolved, resolved_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(alert.id)
        .bind(alert.source_id)
        .bind(alert.category.as_str())
        .bind(&alert.message)
        .bind(alert.severity.as_str())
        .bind(alert.is_resolved)
        .bind(alert.resolved_at)
        .bind(alert.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError> {
        sqlx::query_as::<_, AlertRow>(&format!("SELECT {} FROM alerts WHERE id = $1", ALERT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Alert::try_from)
            .transpose()
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let (skip, limit) = filter.bounds();

        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {} FROM alerts
            WHERE ($1::BOOLEAN IS NULL OR is_resolved = $1)
              AND ($2::VARCHAR IS NULL OR severity = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            ALERT_COLUMNS
        ))
        .bind(filter.is_resolved)
        .bind(filter.severity.map(|s| s.as_str()))
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn resolve_alert(&self, id: Uuid, at: DateTime<Utc>) -> Result<ResolveOutcome, StoreError> {
        let resolved = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            UPDATE alerts
            SET is_resolved = TRUE, resolved_at = $2
            WHERE id = $1 AND is_resolved = FALSE
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = resolved {
            return Ok(ResolveOutcome::Resolved(row.try_into()?));
        }

        match self.find_alert(id).await? {
            Some(existing) => Ok(ResolveOutcome::AlreadyResolved(existing)),
            None => Ok(ResolveOutcome::NotFound),
        }
    }

    async fn delete_alert(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn alert_statistics(&self) -> Result<AlertStatistics, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE NOT is_resolved) AS active,
                COUNT(*) FILTER (WHERE is_resolved) AS resolved,
                COUNT(*) FILTER (WHERE NOT is_resolved AND severity = 'critical') AS critical,
                COUNT(*) FILTER (WHERE NOT is_resolved AND severity = 'high') AS high
            FROM alerts
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AlertStatistics {
            total: row.get("total"),
            active: row.get("active"),
            resolved: row.get("resolved"),
            by_severity: SeverityBreakdown {
                critical: row.get("critical"),
                high: row.get("high"),
            },
        })
    }

    async fn create_user(&self, user: &User) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, name, role, is_active, last_login, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.last_login)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1 AND is_active = true",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("count"))
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
