//! Publishers deliver rendered posts to the posting platform.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PostDraft, PostingError};

/// Delivers a single post to the platform.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one post.
    async fn publish(&self, draft: &PostDraft) -> Result<(), PostingError>;

    /// Re-synchronize with the platform clock (request signing is time
    /// sensitive). The default does nothing.
    async fn refresh_clock(&self) -> Result<(), PostingError> {
        Ok(())
    }

    /// Name for logs.
    fn name(&self) -> &str;
}

/// Publisher that only logs what it would have posted.
#[derive(Debug, Default)]
pub struct DryRunPublisher;

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn publish(&self, draft: &PostDraft) -> Result<(), PostingError> {
        info!(
            kind = %draft.kind,
            record_id = %draft.record_id,
            text = %draft.text,
            "Dry run: would publish post"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "dry_run"
    }
}

/// Webhook publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Endpoint receiving posts as JSON.
    pub url: String,
    /// Bearer token for the endpoint.
    #[serde(default)]
    pub token: Option<String>,
    /// Request timeout in seconds (default: 15)
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    15
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(flatten)]
    draft: &'a PostDraft,
    /// Local time corrected by the last measured platform skew.
    timestamp: DateTime<Utc>,
}

/// Publisher that POSTs each draft to a webhook endpoint.
pub struct WebhookPublisher {
    config: WebhookConfig,
    client: Client,
    /// Platform clock minus local clock, in milliseconds.
    skew_ms: AtomicI64,
}

impl WebhookPublisher {
    pub fn new(config: WebhookConfig) -> Result<Self, PostingError> {
        if config.url.trim().is_empty() {
            return Err(PostingError::ConfigurationMissing(
                "posting.webhook.url is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PostingError::Unavailable(e.to_string()))?;

        Ok(Self {
            config,
            client,
            skew_ms: AtomicI64::new(0),
        })
    }

    /// Last measured clock skew.
    pub fn skew(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.skew_ms.load(Ordering::Relaxed))
    }

    fn corrected_now(&self) -> DateTime<Utc> {
        Utc::now() + self.skew()
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(&self, draft: &PostDraft) -> Result<(), PostingError> {
        let payload = WebhookPayload {
            draft,
            timestamp: self.corrected_now(),
        };

        let mut request = self.client.post(&self.config.url).json(&payload);
        if let Some(ref token) = self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PostingError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                Err(PostingError::QuotaExceeded { retry_after_secs })
            }
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(PostingError::ConfigurationMissing(format!(
                    "webhook refused credentials ({})",
                    status
                )))
            }
            status if status.is_server_error() => {
                Err(PostingError::Unavailable(format!("webhook returned {}", status)))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(PostingError::Rejected(format!("{}: {}", status, body)))
            }
        }
    }

    async fn refresh_clock(&self) -> Result<(), PostingError> {
        let sent_at = Utc::now();
        let response = self
            .client
            .head(&self.config.url)
            .send()
            .await
            .map_err(|e| PostingError::Unavailable(e.to_string()))?;

        let Some(server_time) = response
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        else {
            debug!("Webhook response carried no Date header; keeping previous skew");
            return Ok(());
        };

        let skew = server_time.with_timezone(&Utc) - sent_at;
        self.skew_ms.store(skew.num_milliseconds(), Ordering::Relaxed);
        debug!(skew_ms = skew.num_milliseconds(), "Refreshed platform clock skew");
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
