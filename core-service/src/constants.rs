//! Central Configuration Constants
//!
//! Single source of truth for agent defaults. Every value can be
//! overridden from the environment through the helpers below.

/// Default collector URL
pub const DEFAULT_COLLECTOR_URL: &str = "http://127.0.0.1:8080";

/// Seconds between reports
pub const DEFAULT_SEND_INTERVAL: u64 = 30;

/// Seconds between availability probes while the collector is unreachable
pub const DEFAULT_RETRY_INTERVAL: u64 = 5;

/// Timeout for a report request (seconds)
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 5;

/// Timeout for a liveness probe (seconds)
pub const PROBE_TIMEOUT: u64 = 2;

/// Keywords counted as flagged input
pub const DEFAULT_FLAGGED_KEYWORDS: &[&str] = &["hack", "password", "admin", "cheat", "malware"];

/// Subject reported when no process can be sampled
pub const UNKNOWN_SUBJECT: &str = "Unknown";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Watchpost Agent";

// ============================================
// Helper functions to read from env with fallback
// ============================================

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Get collector URL from environment or use default
pub fn get_collector_url() -> String {
    std::env::var("COLLECTOR_URL")
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_COLLECTOR_URL.to_string())
}

/// Source identity: `SOURCE_ID`, else the machine hostname
pub fn get_source_id() -> String {
    std::env::var("SOURCE_ID")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        })
}

/// Optional credential sent with every report
pub fn get_source_credential() -> Option<String> {
    std::env::var("SOURCE_CREDENTIAL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_send_interval() -> u64 {
    env_u64("SEND_INTERVAL_SECS", DEFAULT_SEND_INTERVAL)
}

pub fn get_retry_interval() -> u64 {
    env_u64("RETRY_INTERVAL_SECS", DEFAULT_RETRY_INTERVAL)
}

pub fn get_request_timeout() -> u64 {
    env_u64("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT)
}

/// Event type tag attached to reports
pub fn get_event_type() -> String {
    std::env::var("EVENT_TYPE")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| watchpost_risk::EVENT_KEYWORD.to_string())
}

/// Comma separated keyword list, lower-cased
pub fn get_flagged_keywords() -> Vec<String> {
    match std::env::var("FLAGGED_KEYWORDS") {
        Ok(raw) => parse_keywords(&raw),
        Err(_) => DEFAULT_FLAGGED_KEYWORDS.iter().map(|k| k.to_string()).collect(),
    }
}

/// `stdin`, `none`, or a path to an input relay file/FIFO
pub fn get_capture_source() -> String {
    std::env::var("CAPTURE_SOURCE")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "stdin".to_string())
}

pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
