use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use chorus_core::{GatewayError, GenerateOptions, TextGenerator};

/// Pre-programmed responses for deterministic testing without real models.
pub enum ScriptedResponse {
    /// Return this text.
    Text(String),
    /// Fail with this error.
    Fail(GatewayError),
    /// Sleep, then resolve the inner response.
    Delayed(Duration, Box<ScriptedResponse>),
}

impl ScriptedResponse {
    pub fn text(s: &str) -> Self {
        Self::Text(s.to_owned())
    }

    pub fn delayed_text(delay: Duration, s: &str) -> Self {
        Self::Delayed(delay, Box::new(Self::text(s)))
    }
}

/// Test double that consumes a scripted response queue in order.
pub struct ScriptedGenerator {
    name: String,
    responses: Mutex<VecDeque<ScriptedResponse>>,
    call_count: AtomicUsize,
    available: AtomicBool,
}

impl ScriptedGenerator {
    pub fn new(name: &str, responses: Vec<ScriptedResponse>) -> Self {
        Self {
            name: name.to_owned(),
            responses: Mutex::new(responses.into()),
            call_count: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<String, GatewayError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let mut next = match self.responses.lock().pop_front() {
            Some(response) => response,
            None => {
                return Err(GatewayError::Provider {
                    name: self.name.clone(),
                    detail: "scripted responses exhausted".to_owned(),
                })
            }
        };

        loop {
            match next {
                ScriptedResponse::Text(text) => return Ok(text),
                ScriptedResponse::Fail(error) => return Err(error),
                ScriptedResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    next = *inner;
                }
            }
        }
    }
}
