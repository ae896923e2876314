//! Watchpost Risk Core
//!
//! Shared between the endpoint agent and the collector:
//! - `scoring` - counters to score, score to level (one threshold table)
//! - `report` - the metadata-only report contract

pub mod report;
pub mod scoring;

pub use report::{
    ActivityAck, ActivityReport, CREDENTIAL_HEADER, EVENT_KEYWORD, LEGACY_CREDENTIAL_HEADER,
};
pub use scoring::{level, normalize, round2, score, RiskLevel, UnknownRiskLevel};
