use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Configuration for the tracing subscriber. Constructed by the process
/// entry point and passed in explicitly.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by the RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "chorus_engine" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: true,
        }
    }
}

/// Build the env-filter directive string from a config.
fn filter_directives(config: &TelemetryConfig) -> String {
    let mut directives = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        directives.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    directives
}

/// Initialize the tracing subscriber. Call once at startup; subsequent
/// calls are no-ops (so tests can call it freely).
pub fn init_telemetry(config: &TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("telemetry already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_default_level_only() {
        let config = TelemetryConfig::default();
        assert_eq!(filter_directives(&config), "info");
    }

    #[test]
    fn directives_include_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("chorus_engine".to_owned(), Level::DEBUG),
                ("chorus_store".to_owned(), Level::TRACE),
            ],
            json: false,
        };
        assert_eq!(
            filter_directives(&config),
            "warn,chorus_engine=debug,chorus_store=trace"
        );
    }

    #[test]
    fn init_is_idempotent() {
        let config = TelemetryConfig::default();
        init_telemetry(&config);
        init_telemetry(&config);
    }
}
