use salebot_core::{
    Config, PostingGate, QuotaHandle, SanitizedConfig, SettingsHandle, SyncOrchestrator,
};

/// Shared application state
pub struct AppState {
    config: Config,
    /// Absent when no upstream feed is configured.
    orchestrator: Option<SyncOrchestrator>,
    gate: PostingGate,
    settings: SettingsHandle,
    quota: QuotaHandle,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Option<SyncOrchestrator>,
        gate: PostingGate,
        settings: SettingsHandle,
        quota: QuotaHandle,
    ) -> Self {
        Self {
            config,
            orchestrator,
            gate,
            settings,
            quota,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> Option<&SyncOrchestrator> {
        self.orchestrator.as_ref()
    }

    pub fn gate(&self) -> &PostingGate {
        &self.gate
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn quota(&self) -> &QuotaHandle {
        &self.quota
    }
}
