//! Workflow orchestration.
//!
//! Owns the in-memory workflow registry, drives the step/termination
//! state machine, and serializes generation per workflow: each workflow
//! carries a step token, and a step that cannot take it fails fast
//! instead of queueing. Different workflows never contend.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use chorus_core::entry::{meta, Author};
use chorus_core::{
    Entry, EntryId, GatewayError, TextGenerator, WorkflowConfig, WorkflowEvent, WorkflowMode,
    WorkflowStatus,
};
use chorus_gateway::GeneratorRegistry;
use chorus_store::{Database, EntryRepo};

use crate::branch::BranchManager;
use crate::config::EngineConfig;
use crate::context::ContextAssembler;
use crate::error::EngineError;
use crate::prompts;

struct WorkflowState {
    current_tip: EntryId,
    status: WorkflowStatus,
    /// Once a termination condition has been observed it stays observed,
    /// even if a later entry would reset the inactivity clock.
    termination_latched: bool,
}

struct WorkflowHandle {
    config: WorkflowConfig,
    state: Mutex<WorkflowState>,
    /// Step token: held for the full duration of a generation step.
    step_token: tokio::sync::Mutex<()>,
}

/// Registry snapshot of one workflow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub workflow_id: EntryId,
    pub mode: WorkflowMode,
    pub status: WorkflowStatus,
    pub current_tip: EntryId,
    pub steps: usize,
}

pub struct WorkflowOrchestrator {
    repo: EntryRepo,
    assembler: ContextAssembler,
    branches: BranchManager,
    registry: Arc<GeneratorRegistry>,
    config: EngineConfig,
    workflows: DashMap<EntryId, Arc<WorkflowHandle>>,
    event_tx: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowOrchestrator {
    pub fn new(
        db: Database,
        registry: Arc<GeneratorRegistry>,
        config: EngineConfig,
        event_tx: broadcast::Sender<WorkflowEvent>,
    ) -> Self {
        let repo = EntryRepo::new(db);
        Self {
            assembler: ContextAssembler::new(repo.clone(), &config),
            branches: BranchManager::new(repo.clone()),
            repo,
            registry,
            config,
            workflows: DashMap::new(),
            event_tx,
        }
    }

    pub fn entries(&self) -> &EntryRepo {
        &self.repo
    }

    pub fn branch_manager(&self) -> &BranchManager {
        &self.branches
    }

    /// Start a workflow: persist the root entry and register it Active.
    /// The workflow is addressed by the root entry's ID from here on.
    #[instrument(skip(self, config, initial_content), fields(mode = %config.mode))]
    pub fn start(
        &self,
        config: WorkflowConfig,
        initial_content: &str,
    ) -> Result<EntryId, EngineError> {
        let root = Entry::root(
            initial_content,
            config.prompt_template.clone(),
            Author::User("Initiator".into()),
        )
        .with_meta(meta::WORKFLOW_MODE, config.mode.to_string());
        let stored = self.repo.insert(&root)?;

        let handle = WorkflowHandle {
            config,
            state: Mutex::new(WorkflowState {
                current_tip: stored.id.clone(),
                status: WorkflowStatus::Active,
                termination_latched: false,
            }),
            step_token: tokio::sync::Mutex::new(()),
        };
        self.workflows.insert(stored.id.clone(), Arc::new(handle));

        info!(workflow_id = %stored.id, "workflow started");
        Ok(stored.id)
    }

    /// Execute the next generation step.
    ///
    /// Atomic with respect to the tree: either a new entry is appended
    /// as a child of the current tip, or (on any generation failure,
    /// timeout, or cancellation) nothing is written at all.
    #[instrument(skip(self, cancel), fields(workflow_id = %workflow_id))]
    pub async fn execute_step(
        &self,
        workflow_id: &EntryId,
        model_name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Entry, EngineError> {
        let handle = self.handle(workflow_id)?;

        let _token = handle
            .step_token
            .try_lock()
            .map_err(|_| EngineError::StepInProgress(workflow_id.clone()))?;

        let tip = {
            let state = handle.state.lock();
            if state.status != WorkflowStatus::Active {
                return Err(EngineError::WorkflowNotActive(workflow_id.clone()));
            }
            state.current_tip.clone()
        };

        let chain = self.repo.ancestor_chain(&tip)?;
        let context = self.assembler.assemble(&chain, &handle.config);

        let steps_taken = chain.iter().filter(|e| e.author.is_ai()).count();
        let role = prompts::next_role(&handle.config, steps_taken).map(str::to_owned);
        let prompt = prompts::build_step_prompt(&handle.config, role.as_deref(), &context);

        // Explicit caller choice wins, then the stepping role's model.
        let preferred = model_name.map(str::to_owned).or_else(|| {
            role.as_deref()
                .and_then(|r| handle.config.roles.get(r))
                .and_then(|rc| rc.model.clone())
        });

        let (text, model) = self
            .generate_with_fallback(preferred.as_deref(), &prompt, cancel)
            .await?;

        // Evaluated against the pre-append tip so the new entry can carry
        // its final_step tag; entries are immutable once inserted.
        let terminating = self.termination_due(&handle, &chain);

        let mut entry = Entry::child_of(&tip, text, prompt, Author::Ai(model.clone()))
            .with_meta(meta::WORKFLOW_MODE, handle.config.mode.to_string())
            .with_meta(meta::MODEL, model);
        if let Some(role) = &role {
            let key = match handle.config.mode {
                WorkflowMode::Debate => meta::POSITION,
                _ => meta::ROLE,
            };
            entry = entry.with_meta(key, role.clone());
        }
        if terminating {
            entry = entry.with_meta(meta::FINAL_STEP, true);
        }

        let stored = self.repo.insert(&entry)?;

        {
            let mut state = handle.state.lock();
            state.current_tip = stored.id.clone();
            if terminating {
                state.status = WorkflowStatus::Terminated;
            }
        }

        self.emit(WorkflowEvent::StepCompleted {
            workflow_id: workflow_id.clone(),
            entry: stored.clone(),
        });
        if terminating {
            info!(workflow_id = %workflow_id, final_entry = %stored.id, "workflow terminated");
            self.emit(WorkflowEvent::WorkflowTerminated {
                workflow_id: workflow_id.clone(),
                final_entry_id: stored.id.clone(),
            });
        }

        Ok(stored)
    }

    /// Append a user-authored entry without invoking generation.
    /// Advances the tip but never evaluates termination, and does not
    /// need the step token: a racing step simply lands as a sibling.
    #[instrument(skip(self, content, prompt), fields(workflow_id = %workflow_id))]
    pub fn handle_user_input(
        &self,
        workflow_id: &EntryId,
        content: &str,
        prompt: Option<&str>,
    ) -> Result<Entry, EngineError> {
        let handle = self.handle(workflow_id)?;
        let tip = {
            let state = handle.state.lock();
            if state.status != WorkflowStatus::Active {
                return Err(EngineError::WorkflowNotActive(workflow_id.clone()));
            }
            state.current_tip.clone()
        };

        let entry = Entry::child_of(
            &tip,
            content,
            prompt.unwrap_or(""),
            Author::User("Editor".into()),
        )
        .with_meta(meta::WORKFLOW_MODE, handle.config.mode.to_string())
        .with_meta(meta::USER_INTERVENTION, true);
        let stored = self.repo.insert(&entry)?;

        handle.state.lock().current_tip = stored.id.clone();

        self.emit(WorkflowEvent::UserInputAdded {
            workflow_id: workflow_id.clone(),
            entry: stored.clone(),
        });
        Ok(stored)
    }

    /// Fork a new lineage from any existing entry. Allowed regardless of
    /// the owning workflow's state; the original tip does not move.
    #[instrument(skip(self, new_prompt), fields(base_id = %base_id))]
    pub fn create_branch(&self, base_id: &EntryId, new_prompt: &str) -> Result<Entry, EngineError> {
        let fork = self.branches.create_branch(base_id, new_prompt)?;
        self.emit(WorkflowEvent::BranchCreated {
            base_id: base_id.clone(),
            entry: fork.clone(),
        });
        Ok(fork)
    }

    /// True when either termination condition holds at the current tip.
    /// Unknown workflows report true (nothing left to step). A failing
    /// check logs and reports false rather than killing the workflow.
    pub fn should_terminate(&self, workflow_id: &EntryId) -> bool {
        let Ok(handle) = self.handle(workflow_id) else {
            return true;
        };
        let tip = {
            let state = handle.state.lock();
            if state.status == WorkflowStatus::Terminated || state.termination_latched {
                return true;
            }
            state.current_tip.clone()
        };
        match self.repo.ancestor_chain(&tip) {
            Ok(chain) => self.termination_due(&handle, &chain),
            Err(e) => {
                warn!(workflow_id = %workflow_id, error = %e, "termination check failed, not terminating");
                false
            }
        }
    }

    /// Drop the in-memory registration. Persisted entries remain; this
    /// is a view-level operation, not data deletion.
    pub fn delete(&self, workflow_id: &EntryId) -> bool {
        self.workflows.remove(workflow_id).is_some()
    }

    pub fn status(&self, workflow_id: &EntryId) -> Result<WorkflowSummary, EngineError> {
        let handle = self.handle(workflow_id)?;
        Ok(self.summarize(workflow_id, &handle))
    }

    pub fn list(&self) -> Vec<WorkflowSummary> {
        self.workflows
            .iter()
            .map(|item| self.summarize(item.key(), item.value()))
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    fn summarize(&self, workflow_id: &EntryId, handle: &WorkflowHandle) -> WorkflowSummary {
        let (current_tip, status) = {
            let state = handle.state.lock();
            (state.current_tip.clone(), state.status)
        };
        let steps = self.repo.chain_len(&current_tip).unwrap_or(0);
        WorkflowSummary {
            workflow_id: workflow_id.clone(),
            mode: handle.config.mode,
            status,
            current_tip,
            steps,
        }
    }

    fn handle(&self, workflow_id: &EntryId) -> Result<Arc<WorkflowHandle>, EngineError> {
        self.workflows
            .get(workflow_id)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| EngineError::WorkflowNotActive(workflow_id.clone()))
    }

    fn termination_due(&self, handle: &WorkflowHandle, chain: &[Entry]) -> bool {
        if handle.state.lock().termination_latched {
            return true;
        }
        let conditions = &handle.config.termination_conditions;

        let step_limit = chain.len() >= conditions.max_steps;
        let inactive = chain.last().is_some_and(|tip| {
            Utc::now()
                .signed_duration_since(tip.created_at)
                .to_std()
                .unwrap_or_default()
                > conditions.inactivity_timeout
        });

        let due = step_limit || inactive;
        if due {
            debug!(step_limit, inactive, "termination condition met");
            handle.state.lock().termination_latched = true;
        }
        due
    }

    /// One generation attempt, bounded by the configured timeout and the
    /// caller's cancellation token.
    async fn generate_once(
        &self,
        generator: &Arc<dyn TextGenerator>,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let options = &self.config.generate;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            outcome = tokio::time::timeout(options.timeout, generator.generate(prompt, options)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::Timeout(options.timeout)),
                }
            }
        }
    }

    /// Select a capability and call it; on a retryable failure, retry
    /// exactly once against the designated fallback before giving up.
    async fn generate_with_fallback(
        &self,
        model_name: Option<&str>,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, String), EngineError> {
        let primary = self.registry.select(model_name);
        match self.generate_once(&primary, prompt, cancel).await {
            Ok(text) => Ok((text, primary.model().to_owned())),
            Err(e) if !e.is_retryable() => Err(EngineError::Gateway(e)),
            Err(e) => {
                let fallback = self.registry.fallback();
                if fallback.name() == primary.name() {
                    return Err(EngineError::GenerationFailed(e.to_string()));
                }
                warn!(
                    primary = primary.name(),
                    fallback = fallback.name(),
                    error = %e,
                    "generation failed, retrying against fallback"
                );
                match self.generate_once(&fallback, prompt, cancel).await {
                    Ok(text) => Ok((text, fallback.model().to_owned())),
                    Err(fallback_err) => Err(EngineError::GenerationFailed(format!(
                        "{e}; fallback: {fallback_err}"
                    ))),
                }
            }
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("no event receivers attached");
        }
    }
}
