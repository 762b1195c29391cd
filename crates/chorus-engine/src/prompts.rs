//! Step prompt construction.
//!
//! Dispatch is a match over the mode variant; each mode carries its own
//! fixed instruction template with the assembled context spliced in.
//! Custom workflows substitute `{context}` / `{role}` into the template
//! the caller supplied.

use chorus_core::{WorkflowConfig, WorkflowMode};

/// Build the instruction prompt for the next step.
///
/// Role instructions come from the workflow's `roles` table when
/// configured there, falling back to the built-in blocks for the
/// well-known relay and debate roles.
pub fn build_step_prompt(config: &WorkflowConfig, role: Option<&str>, context: &str) -> String {
    let base = match config.mode {
        WorkflowMode::Relay => format!(
            "You are continuing a collaborative writing process. \
             Previous content:\n\n{context}\n\n\
             Continue in the same style and tone. \
             Add meaningful progress while maintaining consistency."
        ),
        WorkflowMode::Debate => format!(
            "You are participating in a structured debate. \
             Previous arguments:\n\n{context}\n\n\
             Analyze the arguments presented and provide a well-reasoned \
             response that either supports or challenges the previous points."
        ),
        WorkflowMode::Custom => config
            .prompt_template
            .replace("{context}", context)
            .replace("{role}", role.unwrap_or("")),
    };

    let Some(role_name) = role else {
        return base;
    };

    let instructions = config
        .roles
        .get(role_name)
        .filter(|r| !r.instructions.is_empty())
        .map(|r| r.instructions.clone())
        .or_else(|| builtin_role_instructions(config.mode, role_name).map(str::to_owned));

    match instructions {
        Some(instructions) => format!("{base}\n\nAs the {role_name}: {instructions}."),
        None => base,
    }
}

/// Which role speaks next: deterministic rotation through the configured
/// roles (sorted order), keyed on how many generated steps came before.
pub fn next_role(config: &WorkflowConfig, steps_taken: usize) -> Option<&str> {
    if config.roles.is_empty() {
        return None;
    }
    let names: Vec<&str> = config.roles.keys().map(String::as_str).collect();
    Some(names[steps_taken % names.len()])
}

/// Fixed focus blocks for the well-known roles.
fn builtin_role_instructions(mode: WorkflowMode, role: &str) -> Option<&'static str> {
    match (mode, role) {
        (WorkflowMode::Relay, "worldbuilder") => {
            Some("expand the world's setting, environment, or background while maintaining consistency with existing elements")
        }
        (WorkflowMode::Relay, "character_designer") => {
            Some("develop characters that feel authentic and contribute meaningfully to the narrative")
        }
        (WorkflowMode::Relay, "plot_developer") => {
            Some("advance the plot in a way that engages readers while maintaining logical consistency")
        }
        (WorkflowMode::Relay, "editor") => {
            Some("review and refine the current content, preserving the original voice and intent")
        }
        (WorkflowMode::Debate, "proponent") => {
            Some("construct a well-reasoned argument supporting your position while maintaining intellectual honesty")
        }
        (WorkflowMode::Debate, "opponent") => {
            Some("challenge the previous arguments with well-reasoned counterpoints while maintaining respect and rigor")
        }
        (WorkflowMode::Debate, "mediator") => {
            Some("analyze both sides, identify agreement and disagreement, and advance the discussion constructively")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::RoleConfig;

    #[test]
    fn relay_prompt_embeds_context() {
        let config = WorkflowConfig::relay();
        let prompt = build_step_prompt(&config, None, "the story so far");
        assert!(prompt.contains("collaborative writing"));
        assert!(prompt.contains("the story so far"));
    }

    #[test]
    fn debate_prompt_embeds_context() {
        let config = WorkflowConfig::debate();
        let prompt = build_step_prompt(&config, None, "the arguments so far");
        assert!(prompt.contains("structured debate"));
        assert!(prompt.contains("the arguments so far"));
    }

    #[test]
    fn custom_template_substitution() {
        let config = WorkflowConfig::custom("Summarize this: {context} (as {role})");
        let prompt = build_step_prompt(&config, Some("critic"), "CTX");
        assert_eq!(prompt, "Summarize this: CTX (as critic)");
    }

    #[test]
    fn custom_template_without_placeholders_left_alone() {
        let config = WorkflowConfig::custom("Fixed instructions only");
        let prompt = build_step_prompt(&config, None, "ignored");
        assert_eq!(prompt, "Fixed instructions only");
    }

    #[test]
    fn configured_role_instructions_win_over_builtin() {
        let mut config = WorkflowConfig::relay();
        config.roles.insert(
            "worldbuilder".to_owned(),
            RoleConfig {
                model: None,
                instructions: "Only describe the weather".to_owned(),
            },
        );
        let prompt = build_step_prompt(&config, Some("worldbuilder"), "ctx");
        assert!(prompt.contains("Only describe the weather"));
        assert!(!prompt.contains("expand the world's setting"));
    }

    #[test]
    fn builtin_instructions_used_for_known_roles() {
        let mut config = WorkflowConfig::debate();
        config.roles.get_mut("opponent").unwrap().instructions.clear();
        let prompt = build_step_prompt(&config, Some("opponent"), "ctx");
        assert!(prompt.contains("counterpoints"));
    }

    #[test]
    fn unknown_role_appends_nothing() {
        let config = WorkflowConfig::custom("{context}");
        let prompt = build_step_prompt(&config, Some("stranger"), "ctx");
        assert_eq!(prompt, "ctx");
    }

    #[test]
    fn role_rotation_is_deterministic() {
        let config = WorkflowConfig::relay();
        // Sorted role order: character_designer, plot_developer, worldbuilder.
        assert_eq!(next_role(&config, 0), Some("character_designer"));
        assert_eq!(next_role(&config, 1), Some("plot_developer"));
        assert_eq!(next_role(&config, 2), Some("worldbuilder"));
        assert_eq!(next_role(&config, 3), Some("character_designer"));
    }

    #[test]
    fn no_roles_means_no_rotation() {
        let config = WorkflowConfig::custom("{context}");
        assert_eq!(next_role(&config, 0), None);
    }
}
