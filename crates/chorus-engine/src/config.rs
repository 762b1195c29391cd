use chorus_core::GenerateOptions;

/// Engine-wide knobs, constructed by the process entry point and passed
/// into the orchestrator at build time.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Rendered context longer than this gets compressed.
    pub max_context_length: usize,
    /// Character budget handed to the compressor.
    pub compress_target: usize,
    /// Options forwarded to generation capabilities.
    pub generate: GenerateOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_context_length: 16_000,
            compress_target: 2_000,
            generate: GenerateOptions::default(),
        }
    }
}
