//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How often the sales sync fires (seconds).
    /// Fires are aligned to multiples of this period on the wall clock.
    #[serde(default = "default_sales_interval")]
    pub sales_interval_secs: u64,

    /// How often the registration sync fires (seconds).
    #[serde(default = "default_registration_interval")]
    pub registration_interval_secs: u64,

    /// Consecutive failed sales runs before the orchestrator stops itself.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Unpublished registrations fetched per registration run.
    #[serde(default = "default_registration_batch_size")]
    pub registration_batch_size: usize,

    /// Upper bound on any single collaborator call (seconds).
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_secs: u64,
}

fn default_sales_interval() -> u64 {
    300 // 5 minutes
}

fn default_registration_interval() -> u64 {
    60 // 1 minute
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_registration_batch_size() -> usize {
    10
}

fn default_collaborator_timeout() -> u64 {
    60
}

impl OrchestratorConfig {
    pub fn sales_interval(&self) -> Duration {
        Duration::from_secs(self.sales_interval_secs)
    }

    pub fn registration_interval(&self) -> Duration {
        Duration::from_secs(self.registration_interval_secs)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sales_interval_secs: default_sales_interval(),
            registration_interval_secs: default_registration_interval(),
            max_consecutive_errors: default_max_consecutive_errors(),
            registration_batch_size: default_registration_batch_size(),
            collaborator_timeout_secs: default_collaborator_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.sales_interval_secs, 300);
        assert_eq!(config.registration_interval_secs, 60);
        assert_eq!(config.max_consecutive_errors, 5);
        assert_eq!(config.registration_batch_size, 10);
        assert_eq!(config.collaborator_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            sales_interval_secs = 600
            max_consecutive_errors = 3
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.sales_interval(), Duration::from_secs(600));
        assert_eq!(config.max_consecutive_errors, 3);
        assert_eq!(config.registration_interval(), Duration::from_secs(60));
    }
}
