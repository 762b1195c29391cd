use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use chorus_core::TextGenerator;

use crate::echo::EchoGenerator;

/// Named generation capabilities plus a designated fallback.
///
/// Constructed by the process entry point and handed to the orchestrator;
/// there is no global registry. Zero, one, or many registered capabilities
/// are all valid states — selection degrades to the fallback.
pub struct GeneratorRegistry {
    generators: DashMap<String, Arc<dyn TextGenerator>>,
    fallback: Arc<dyn TextGenerator>,
}

impl GeneratorRegistry {
    /// Registry with the echo capability as fallback.
    pub fn new() -> Self {
        Self::with_fallback(Arc::new(EchoGenerator))
    }

    pub fn with_fallback(fallback: Arc<dyn TextGenerator>) -> Self {
        Self {
            generators: DashMap::new(),
            fallback,
        }
    }

    /// Register a capability under a name. Unavailable capabilities are
    /// skipped with a warning, matching how broken provider setups are
    /// handled at startup.
    pub fn register(&self, name: &str, generator: Arc<dyn TextGenerator>) {
        if generator.is_available() {
            info!(name, "registered generator");
            self.generators.insert(name.to_owned(), generator);
        } else {
            warn!(name, "generator not available, skipping registration");
        }
    }

    /// Pick a capability: the named one when registered and available,
    /// otherwise any available one, otherwise the fallback.
    pub fn select(&self, model_name: Option<&str>) -> Arc<dyn TextGenerator> {
        if let Some(name) = model_name {
            if let Some(generator) = self.generators.get(name) {
                if generator.is_available() {
                    return Arc::clone(generator.value());
                }
                warn!(name, "selected generator not available");
            }
        }

        for entry in self.generators.iter() {
            if entry.value().is_available() {
                if model_name.is_some() {
                    info!(name = entry.key().as_str(), "using alternate generator");
                }
                return Arc::clone(entry.value());
            }
        }

        warn!("no generators available, using fallback");
        Arc::clone(&self.fallback)
    }

    /// The designated fallback capability.
    pub fn fallback(&self) -> Arc<dyn TextGenerator> {
        Arc::clone(&self.fallback)
    }

    /// Registered names with their current availability.
    pub fn available_models(&self) -> BTreeMap<String, bool> {
        self.generators
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().is_available()))
            .collect()
    }

    /// Drop every registered capability; the fallback remains.
    pub fn reset(&self) {
        self.generators.clear();
        info!("all generators cleared");
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
