use std::time::Duration;

use async_trait::async_trait;

use crate::errors::GatewayError;

/// Options passed through to a generation capability.
#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    /// Upper bound on a single generate call; enforced by the caller.
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// The one capability the orchestrator consumes: ask a model to continue
/// a prompt. Implemented independently per provider; selection happens by
/// configuration, not inheritance.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Registry name of this capability.
    fn name(&self) -> &str;

    /// Model identifier recorded on generated entries.
    fn model(&self) -> &str;

    /// Whether the capability can currently serve requests.
    fn is_available(&self) -> bool;

    async fn generate(&self, prompt: &str, options: &GenerateOptions)
        -> Result<String, GatewayError>;
}
