//! Session upload to a remote collector.
//!
//! While a session runs, the uploader drains newly buffered samples about
//! once per interval and posts them together with the cumulative summary.
//! After the session stops, a final flush posts whatever is left. A failed
//! post is logged and its batch is not retried; the next tick carries only
//! what arrived since.
//!
//! The payload types are always available; the HTTP client needs the
//! `gateway` feature.

use crate::clock::SharedClock;
use crate::core::{SessionSample, SessionSummary};
use crate::store::StressStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Collector endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL, e.g. `http://127.0.0.1:8000`
    pub base_url: String,
    /// Bearer authentication token
    pub token: String,
}

impl GatewayConfig {
    /// Create a new gateway configuration.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Get the session upload endpoint URL.
    pub fn simulation_url(&self) -> String {
        format!("{}/simulation", self.base_url)
    }

    /// Get the health check endpoint URL.
    pub fn ping_url(&self) -> String {
        format!("{}/ping", self.base_url)
    }
}

/// Gateway client error types.
#[derive(Debug)]
pub enum GatewayError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Config(msg) => write!(f, "Gateway config error: {msg}"),
            GatewayError::Network(msg) => write!(f, "Gateway network error: {msg}"),
            GatewayError::Server { status, message } => {
                write!(f, "Gateway server error ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for GatewayError {}

/// One batch of session data as the collector expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpload {
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
    /// Samples since the previous upload
    pub samples: Vec<SessionSample>,
    /// Summary over the whole session so far
    pub summary: SessionSummary,
}

impl SessionUpload {
    /// Drain the store's pending samples into a new batch.
    pub fn drain_from(store: &StressStore, ended_at_ms: i64) -> Self {
        let samples = store.drain_pending();
        Self {
            started_at_ms: store.session_started_at(),
            ended_at_ms,
            samples,
            summary: store.summary(),
        }
    }
}

/// Somewhere session batches can be delivered.
#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn post_session(&self, upload: &SessionUpload) -> Result<(), GatewayError>;
}

/// Periodically upload new samples while the store's session runs.
///
/// Returns when the session stops or `cancel` fires. Returns the number of
/// batches delivered successfully.
pub async fn run_uploader(
    store: Arc<StressStore>,
    sink: Arc<dyn SessionSink>,
    clock: SharedClock,
    every: Duration,
    cancel: CancellationToken,
) -> u64 {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut delivered = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !store.is_running() {
            break;
        }

        let upload = SessionUpload::drain_from(&store, clock.now_ms());
        if upload.samples.is_empty() {
            continue;
        }

        match sink.post_session(&upload).await {
            Ok(()) => {
                delivered += 1;
                tracing::debug!("Uploaded {} samples", upload.samples.len());
            }
            Err(e) => {
                tracing::warn!("Dropped batch of {} samples: {}", upload.samples.len(), e);
            }
        }
    }

    delivered
}

/// Post the last batch (possibly empty) with the final summary.
pub async fn final_flush(
    store: &StressStore,
    sink: &dyn SessionSink,
    clock: &SharedClock,
) -> Result<SessionUpload, GatewayError> {
    let upload = SessionUpload::drain_from(store, clock.now_ms());
    sink.post_session(&upload).await?;
    Ok(upload)
}

/// HTTP client for the collector.
#[cfg(feature = "gateway")]
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
}

#[cfg(feature = "gateway")]
impl GatewayClient {
    /// Create a new gateway client.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        if config.base_url.is_empty() {
            return Err(GatewayError::Config("Gateway URL is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Test connection to the collector.
    pub async fn ping(&self) -> Result<bool, GatewayError> {
        let response = self
            .client
            .get(self.config.ping_url())
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[cfg(feature = "gateway")]
#[async_trait]
impl SessionSink for GatewayClient {
    async fn post_session(&self, upload: &SessionUpload) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.config.simulation_url())
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("Content-Type", "application/json")
            .json(upload)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
