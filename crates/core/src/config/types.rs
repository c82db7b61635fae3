use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;
use crate::posting::{PostingSettings, QuotaConfig, WebhookConfig};
use crate::source::FeedConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Upstream feeds. Without it the source has nothing to poll.
    #[serde(default)]
    pub feed: Option<FeedConfig>,
    #[serde(default)]
    pub posting: PostingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("salebot.db")
}

/// Posting configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PostingConfig {
    /// Initial state of the global auto-posting gate.
    #[serde(default)]
    pub auto_posting_enabled: bool,
    /// Initial per-feature settings. Changeable at runtime.
    #[serde(default, flatten)]
    pub settings: PostingSettings,
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Webhook target. When absent posts are only logged.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub orchestrator: OrchestratorConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<SanitizedFeedConfig>,
    pub posting: SanitizedPostingConfig,
}

/// Sanitized feed config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedFeedConfig {
    pub sales_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrations_url: Option<String>,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPostingConfig {
    pub auto_posting_enabled: bool,
    pub settings: PostingSettings,
    pub quota: QuotaConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<SanitizedWebhookConfig>,
}

/// Sanitized webhook config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedWebhookConfig {
    pub url: String,
    pub token_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            orchestrator: config.orchestrator.clone(),
            feed: config.feed.as_ref().map(|f| SanitizedFeedConfig {
                sales_url: f.sales_url.clone(),
                registrations_url: f.registrations_url.clone(),
                api_key_configured: f.api_key.as_deref().is_some_and(|k| !k.is_empty()),
                timeout_secs: f.timeout_secs,
            }),
            posting: SanitizedPostingConfig {
                auto_posting_enabled: config.posting.auto_posting_enabled,
                settings: config.posting.settings.clone(),
                quota: config.posting.quota.clone(),
                webhook: config
                    .posting
                    .webhook
                    .as_ref()
                    .map(|w| SanitizedWebhookConfig {
                        url: w.url.clone(),
                        token_configured: w.token.as_deref().is_some_and(|t| !t.is_empty()),
                        timeout_secs: w.timeout_secs,
                    }),
            },
        }
    }
}
