use chorus_core::{EntryId, GatewayError};
use chorus_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The workflow is unknown or already terminated.
    #[error("workflow not active: {0}")]
    WorkflowNotActive(EntryId),

    /// Another step for the same workflow holds the step token.
    #[error("step already in progress for workflow {0}")]
    StepInProgress(EntryId),

    /// Every generation capability, including the fallback, failed.
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}
