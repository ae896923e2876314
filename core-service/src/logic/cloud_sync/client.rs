//! Collector API Client
//!
//! HTTP client for the Watchpost Collector.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use watchpost_risk::{ActivityAck, ActivityReport, CREDENTIAL_HEADER};

use crate::constants;

/// Collector connection settings
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub server_url: String,
    pub credential: Option<String>,
    pub timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            server_url: constants::get_collector_url(),
            credential: constants::get_source_credential(),
            timeout_seconds: constants::get_request_timeout(),
            probe_timeout_seconds: constants::PROBE_TIMEOUT,
        }
    }
}

/// Collector client errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloudError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Report rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Client setup failed: {0}")]
    Setup(String),
}

impl From<reqwest::Error> for CloudError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CloudError::Timeout
        } else {
            CloudError::NetworkError(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

/// The two calls the delivery agent makes
#[async_trait]
pub trait Collector: Send + Sync {
    /// Liveness probe; any error means "not reachable yet"
    async fn probe(&self) -> Result<(), CloudError>;

    /// Deliver one report. Only 201 Created counts as success.
    async fn send_report(&self, report: &ActivityReport) -> Result<ActivityAck, CloudError>;
}

/// Collector API client
pub struct CloudClient {
    config: CloudConfig,
    http_client: reqwest::Client,
}

impl CloudClient {
    pub fn new(config: CloudConfig) -> Result<Self, CloudError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CloudError::Setup(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Check server health
    pub async fn health_check(&self) -> Result<HealthResponse, CloudError> {
        let url = format!("{}/health", self.config.server_url);

        let response = self.http_client
            .get(&url)
            .timeout(Duration::from_secs(self.config.probe_timeout_seconds))
            .send()
            .await?;

        if response.status().is_success() {
            response.json().await
                .map_err(|e| CloudError::ParseError(e.to_string()))
        } else {
            Err(CloudError::ServerError(response.status().as_u16()))
        }
    }
}

#[async_trait]
impl Collector for CloudClient {
    async fn probe(&self) -> Result<(), CloudError> {
        let health = self.health_check().await?;
        log::debug!("Collector healthy: v{} ({})", health.version, health.status);
        Ok(())
    }

    async fn send_report(&self, report: &ActivityReport) -> Result<ActivityAck, CloudError> {
        let url = format!("{}/api/activity", self.config.server_url);

        let mut request = self.http_client.post(&url).json(report);
        if let Some(credential) = &self.config.credential {
            request = request.header(CREDENTIAL_HEADER, credential);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::CREATED {
            return response.json().await
                .map_err(|e| CloudError::ParseError(e.to_string()));
        }

        if status.is_server_error() {
            return Err(CloudError::ServerError(status.as_u16()));
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("unexpected status").to_string(),
        };
        Err(CloudError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
