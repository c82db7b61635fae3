use super::{types::Config, ConfigError};

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.to_string()))
}

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Orchestrator intervals, thresholds and timeouts are positive
/// - Quota limits are positive
/// - Configured URLs are not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return invalid("server.port cannot be 0");
    }

    let orchestrator = &config.orchestrator;
    if orchestrator.sales_interval_secs == 0 {
        return invalid("orchestrator.sales_interval_secs must be positive");
    }
    if orchestrator.registration_interval_secs == 0 {
        return invalid("orchestrator.registration_interval_secs must be positive");
    }
    if orchestrator.max_consecutive_errors == 0 {
        return invalid("orchestrator.max_consecutive_errors must be positive");
    }
    if orchestrator.registration_batch_size == 0 {
        return invalid("orchestrator.registration_batch_size must be positive");
    }
    if orchestrator.collaborator_timeout_secs == 0 {
        return invalid("orchestrator.collaborator_timeout_secs must be positive");
    }

    let quota = &config.posting.quota;
    if quota.max_posts == 0 || quota.window_secs == 0 {
        return invalid("posting.quota values must be positive");
    }

    if let Some(ref feed) = config.feed {
        if feed.sales_url.trim().is_empty() {
            return invalid("feed.sales_url cannot be empty");
        }
        if feed
            .registrations_url
            .as_deref()
            .is_some_and(|u| u.trim().is_empty())
        {
            return invalid("feed.registrations_url cannot be empty when set");
        }
    }

    if let Some(ref webhook) = config.posting.webhook {
        if webhook.url.trim().is_empty() {
            return invalid("posting.webhook.url cannot be empty");
        }
    }

    Ok(())
}
