//! Report Contract
//!
//! Wire types exchanged between the endpoint agent and the collector.
//! A report carries metadata only: never raw counters, never matched words.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::scoring::RiskLevel;

/// Header carrying the optional per-source credential
pub const CREDENTIAL_HEADER: &str = "X-Source-Credential";

/// Credential header sent by older reporters
pub const LEGACY_CREDENTIAL_HEADER: &str = "X-API-Key";

/// Event type tag used by the keyword monitor
pub const EVENT_KEYWORD: &str = "KEYWORD";

/// Inbound activity report (agent -> collector).
///
/// Older reporters send `userId`/`appName`; both are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReport {
    /// Self-reported source identity
    #[serde(alias = "userId")]
    #[validate(length(min = 1, max = 255))]
    pub source_id: String,
    /// Reported application name
    #[serde(default, alias = "appName")]
    #[validate(length(max = 255))]
    pub subject: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub event_type: String,
    pub risk_score: f64,
}

/// Collector acknowledgement for an accepted report.
///
/// Ids travel as opaque strings; the agent never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityAck {
    pub message: String,
    pub activity_id: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub alert_id: Option<String>,
}
