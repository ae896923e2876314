//! Persistence layer
//!
//! Three record sets (sources, activity records, alerts) plus the admin users
//! table, behind one trait so the collector can run on PostgreSQL or fully
//! in-process.
//!
//! Contract every implementation keeps:
//! - `upsert_source` is a single atomic find-or-create; `last_seen` never moves backwards
//!   and a stored credential hash is never overwritten
//! - `resolve_alert` only transitions unresolved alerts
//! - deleting a source clears (does not cascade to) the references held by records and alerts

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ActivityFilter, ActivityRecord, Alert, AlertFilter, AlertStatistics, LevelBucket,
    ResolveOutcome, Source, SourceUpsert, UpdateSource, UpsertOutcome, User,
};

/// Errors raised by a store implementation
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("Query error: {0}")]
    Query(String),

    /// Record not found.
    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// A stored value could not be mapped back into a model.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Constraint(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Connection(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap round-trip used by the liveness probe
    async fn ping(&self) -> Result<(), StoreError>;

    // ---- sources -----------------------------------------------------------

    /// Atomic find-or-create by name, refreshing `last_seen`
    async fn upsert_source(&self, upsert: SourceUpsert) -> Result<UpsertOutcome, StoreError>;

    /// Explicit creation; fails with `Constraint` on a duplicate name
    async fn create_source(&self, source: &Source) -> Result<Source, StoreError>;

    async fn find_source(&self, id: Uuid) -> Result<Option<Source>, StoreError>;

    async fn find_source_by_name(&self, name: &str) -> Result<Option<Source>, StoreError>;

    async fn list_sources(&self, skip: i64, limit: i64) -> Result<Vec<Source>, StoreError>;

    async fn update_source(
        &self,
        id: Uuid,
        update: &UpdateSource,
    ) -> Result<Option<Source>, StoreError>;

    async fn delete_source(&self, id: Uuid) -> Result<bool, StoreError>;

    // ---- activity records --------------------------------------------------

    async fn insert_activity(&self, record: &ActivityRecord) -> Result<ActivityRecord, StoreError>;

    async fn find_activity(&self, id: Uuid) -> Result<Option<ActivityRecord>, StoreError>;

    /// Newest first
    async fn list_activity(&self, filter: &ActivityFilter)
        -> Result<Vec<ActivityRecord>, StoreError>;

    /// Count and score sum per level for records created at or after `since`
    async fn level_buckets_since(&self, since: DateTime<Utc>)
        -> Result<Vec<LevelBucket>, StoreError>;

    /// High and critical records created at or after `since`, newest first
    async fn alerting_activity_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>, StoreError>;

    // ---- alerts ------------------------------------------------------------

    async fn insert_alert(&self, alert: &Alert) -> Result<Alert, StoreError>;

    async fn find_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError>;

    /// Newest first
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError>;

    /// Conditional transition unresolved -> resolved
    async fn resolve_alert(&self, id: Uuid, at: DateTime<Utc>) -> Result<ResolveOutcome, StoreError>;

    async fn delete_alert(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn alert_statistics(&self) -> Result<AlertStatistics, StoreError>;

    // ---- users -------------------------------------------------------------

    async fn create_user(&self, user: &User) -> Result<User, StoreError>;

    /// Active users only
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn count_users(&self) -> Result<i64, StoreError>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}
