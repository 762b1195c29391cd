use async_trait::async_trait;

use chorus_core::{GatewayError, GenerateOptions, TextGenerator};

/// Always-available capability of last resort.
///
/// Echoes a fixed diagnostic instead of generating, so the orchestration
/// path stays exercisable with zero real models registered.
pub struct EchoGenerator;

pub const ECHO_NAME: &str = "echo";

#[async_trait]
impl TextGenerator for EchoGenerator {
    fn name(&self) -> &str {
        ECHO_NAME
    }

    fn model(&self) -> &str {
        ECHO_NAME
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<String, GatewayError> {
        Ok(format!("[echo] received {} chars", prompt.chars().count()))
    }
}
