use tracing::debug;

use chorus_core::entry::meta;
use chorus_core::{Entry, EntryId, WorkflowConfig, WorkflowMode};
use chorus_store::EntryRepo;

use crate::compress::compress;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Turns a leaf's ancestor chain into one bounded, prompt-ready text.
#[derive(Clone)]
pub struct ContextAssembler {
    repo: EntryRepo,
    max_context_length: usize,
    compress_target: usize,
}

impl ContextAssembler {
    pub fn new(repo: EntryRepo, config: &EngineConfig) -> Self {
        Self {
            repo,
            max_context_length: config.max_context_length,
            compress_target: config.compress_target,
        }
    }

    /// Fetch the lineage of `leaf_id` and render it under the budget.
    pub fn build_context(
        &self,
        leaf_id: &EntryId,
        config: &WorkflowConfig,
    ) -> Result<String, EngineError> {
        let chain = self.repo.ancestor_chain(leaf_id)?;
        Ok(self.assemble(&chain, config))
    }

    /// Render an already-fetched chain. Selection precedence:
    /// `last_n_steps`, then `full_history`, then the mode filter.
    pub fn assemble(&self, chain: &[Entry], config: &WorkflowConfig) -> String {
        let selected = select_entries(chain, config);
        let rendered = render_entries(&selected, config);

        if rendered.len() > self.max_context_length {
            debug!(
                raw_len = rendered.len(),
                budget = self.max_context_length,
                "context over budget, compressing"
            );
            compress(&rendered, self.compress_target)
        } else {
            debug!(raw_len = rendered.len(), "context under budget, compression skipped");
            rendered
        }
    }
}

fn select_entries<'a>(chain: &'a [Entry], config: &WorkflowConfig) -> Vec<&'a Entry> {
    let rules = &config.inheritance_rules;
    if let Some(n) = rules.last_n_steps {
        let start = chain.len().saturating_sub(n);
        chain[start..].iter().collect()
    } else if rules.full_history {
        chain.iter().collect()
    } else {
        chain
            .iter()
            .filter(|entry| match config.mode {
                WorkflowMode::Debate => entry.has_meta(meta::POSITION),
                WorkflowMode::Relay => entry.has_meta(meta::ROLE),
                WorkflowMode::Custom => true,
            })
            .collect()
    }
}

/// Chronological rendering. A pre-computed summary replaces the full
/// content so compressed history stays compressed.
fn render_entries(entries: &[&Entry], config: &WorkflowConfig) -> String {
    let mut parts = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(summary) = entry.meta_str(meta::SUMMARY) {
            parts.push(summary.to_owned());
            continue;
        }
        let mut block = String::new();
        if config.inheritance_rules.prompt_chain && !entry.prompt.is_empty() {
            block.push_str("[prompt: ");
            block.push_str(&entry.prompt);
            block.push_str("]\n");
        }
        block.push_str(&entry.content);
        parts.push(block);
    }
    parts.join("\n\n")
}
