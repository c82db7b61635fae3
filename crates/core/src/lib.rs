pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod posting;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    PostingConfig, SanitizedConfig, ServerConfig,
};
pub use orchestrator::{
    ManualSyncResult, OrchestratorConfig, OrchestratorError, RunStats, StatusSnapshot,
    SyncOrchestrator, SyncTask, UpcomingRuns,
};
pub use posting::{
    DryRunPublisher, PostOutcome, PostingError, PostingGate, PostingPipeline, PostingSettings,
    Publisher, QuotaHandle, QuotaPostingPipeline, QuotaStatus, SettingsHandle, WebhookPublisher,
};
pub use scheduler::{ScheduleHandle, Scheduler};
pub use source::{HttpFeedSource, SalesBatch, SourceError, SourceProcessor};
pub use store::{SqliteStateStore, StateStore, StoreError};
