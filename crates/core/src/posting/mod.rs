//! Posting: the global gate, per-feature settings and the publishing pipeline.
//!
//! A batch reaches a [`Publisher`] only when the [`PostingGate`] is open and
//! the relevant [`PostingSettings`] flags are set. The orchestrator checks
//! both; [`QuotaPostingPipeline`] then enforces the platform quota.

mod gate;
mod pipeline;
mod publisher;
mod quota;
mod types;

pub use gate::PostingGate;
pub use pipeline::QuotaPostingPipeline;
pub use publisher::{DryRunPublisher, Publisher, WebhookConfig, WebhookPublisher};
pub use quota::{QuotaConfig, QuotaHandle, QuotaSlot, QuotaStatus, QuotaWindow};
pub use types::{
    OutcomeTally, PostDraft, PostOutcome, PostingError, PostingSettings, SettingsHandle,
};

use async_trait::async_trait;

use crate::source::{RegistrationRecord, SaleRecord};

/// Publishes batches of records, one outcome per record.
#[async_trait]
pub trait PostingPipeline: Send + Sync {
    /// Current per-feature settings.
    async fn get_settings(&self) -> Result<PostingSettings, PostingError>;

    /// Refresh time-sensitive context (clock skew) before a run.
    async fn refresh_time_context(&self) -> Result<(), PostingError>;

    /// Publish new sales. Returns one outcome per input record, in order.
    async fn process_new_sales(
        &self,
        records: &[SaleRecord],
        settings: &PostingSettings,
    ) -> Result<Vec<PostOutcome>, PostingError>;

    /// Publish unpublished registrations. Returns one outcome per input record.
    async fn process_new_registrations(
        &self,
        records: &[RegistrationRecord],
        settings: &PostingSettings,
    ) -> Result<Vec<PostOutcome>, PostingError>;
}
