//! Source (reporting agent) model

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Inactive,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// A reporting source. Created on first contact, refreshed on every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    /// SHA-256 of the credential presented on first credentialed contact
    #[serde(skip_serializing)]
    pub credential_hash: Option<String>,
    pub status: SourceStatus,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Source {
    pub fn new(name: String, credential_hash: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            credential_hash,
            status: SourceStatus::Active,
            last_seen: now,
            created_at: now,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.credential_hash.is_some()
    }
}

/// Find-or-create request handled atomically by the store
#[derive(Debug, Clone)]
pub struct SourceUpsert {
    pub name: String,
    pub credential_hash: Option<String>,
    pub seen_at: DateTime<Utc>,
    /// Reject (without touching the row) when a stored credential differs
    pub verify_credential: bool,
}

#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    Created(Source),
    Refreshed(Source),
    CredentialMismatch,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSource {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 512))]
    pub credential: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSource {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub status: Option<SourceStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn bounds(&self) -> (i64, i64) {
        (self.skip.unwrap_or(0).max(0), self.limit.unwrap_or(100).clamp(1, 1000))
    }
}
