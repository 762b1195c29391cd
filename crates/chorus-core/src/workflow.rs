use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Collaboration mode of a workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    Relay,
    Debate,
    Custom,
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Relay => "relay",
            Self::Debate => "debate",
            Self::Custom => "custom",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkflowMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relay" => Ok(Self::Relay),
            "debate" => Ok(Self::Debate),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown workflow mode: {other}")),
        }
    }
}

/// Which historical entries feed the next step's context.
///
/// Precedence during assembly: `last_n_steps` wins over `full_history`,
/// which wins over the mode-specific metadata filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceRules {
    pub full_history: bool,
    pub last_n_steps: Option<usize>,
    pub prompt_chain: bool,
}

impl Default for InheritanceRules {
    fn default() -> Self {
        Self {
            full_history: false,
            last_n_steps: Some(3),
            prompt_chain: true,
        }
    }
}

/// Rules that flip a workflow to `Terminated`. Step count and inactivity
/// are independent triggers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationConditions {
    pub max_steps: usize,
    #[serde(with = "duration_secs")]
    pub inactivity_timeout: Duration,
}

impl Default for TerminationConditions {
    fn default() -> Self {
        Self {
            max_steps: 10,
            inactivity_timeout: Duration::from_secs(300),
        }
    }
}

/// Per-role configuration: which model speaks for the role and what it
/// should focus on. Instructions here override the built-in role prompts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub instructions: String,
}

/// Everything that governs one workflow's behavior.
///
/// Held in the in-memory registry for the workflow's lifetime; never
/// persisted as its own entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub mode: WorkflowMode,
    pub prompt_template: String,
    #[serde(default)]
    pub inheritance_rules: InheritanceRules,
    #[serde(default)]
    pub termination_conditions: TerminationConditions,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, RoleConfig>,
}

impl WorkflowConfig {
    /// Round-robin story continuation preset.
    pub fn relay() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            "worldbuilder".to_owned(),
            RoleConfig {
                model: None,
                instructions: "Focus on developing the setting and atmosphere".to_owned(),
            },
        );
        roles.insert(
            "character_designer".to_owned(),
            RoleConfig {
                model: None,
                instructions: "Focus on character development and interactions".to_owned(),
            },
        );
        roles.insert(
            "plot_developer".to_owned(),
            RoleConfig {
                model: None,
                instructions: "Focus on advancing the plot and creating tension".to_owned(),
            },
        );
        Self {
            mode: WorkflowMode::Relay,
            prompt_template: "Continue the story in the style of {role}".to_owned(),
            inheritance_rules: InheritanceRules::default(),
            termination_conditions: TerminationConditions::default(),
            roles,
        }
    }

    /// Adversarial argument preset. Debates read the whole history.
    pub fn debate() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            "proponent".to_owned(),
            RoleConfig {
                model: None,
                instructions: "Support the main argument with evidence".to_owned(),
            },
        );
        roles.insert(
            "opponent".to_owned(),
            RoleConfig {
                model: None,
                instructions: "Challenge the argument with counterpoints".to_owned(),
            },
        );
        roles.insert(
            "mediator".to_owned(),
            RoleConfig {
                model: None,
                instructions: "Analyze both sides and suggest resolutions".to_owned(),
            },
        );
        Self {
            mode: WorkflowMode::Debate,
            prompt_template: "Analyze the argument and respond as {role}".to_owned(),
            inheritance_rules: InheritanceRules {
                full_history: true,
                last_n_steps: None,
                prompt_chain: true,
            },
            termination_conditions: TerminationConditions {
                max_steps: 6,
                inactivity_timeout: Duration::from_secs(600),
            },
            roles,
        }
    }

    /// Caller-supplied template; `{context}` and `{role}` are substituted
    /// at step time.
    pub fn custom(prompt_template: impl Into<String>) -> Self {
        Self {
            mode: WorkflowMode::Custom,
            prompt_template: prompt_template.into(),
            inheritance_rules: InheritanceRules::default(),
            termination_conditions: TerminationConditions::default(),
            roles: BTreeMap::new(),
        }
    }
}

/// Runtime state of a registered workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Terminated,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_roundtrip() {
        for mode in [WorkflowMode::Relay, WorkflowMode::Debate, WorkflowMode::Custom] {
            let parsed: WorkflowMode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert!("chat".parse::<WorkflowMode>().is_err());
    }

    #[test]
    fn inheritance_defaults_to_last_three() {
        let rules = InheritanceRules::default();
        assert!(!rules.full_history);
        assert_eq!(rules.last_n_steps, Some(3));
        assert!(rules.prompt_chain);
    }

    #[test]
    fn termination_defaults() {
        let t = TerminationConditions::default();
        assert_eq!(t.max_steps, 10);
        assert_eq!(t.inactivity_timeout, Duration::from_secs(300));
    }

    #[test]
    fn relay_preset_roles() {
        let cfg = WorkflowConfig::relay();
        assert_eq!(cfg.mode, WorkflowMode::Relay);
        assert!(cfg.roles.contains_key("worldbuilder"));
        assert!(cfg.roles.contains_key("plot_developer"));
    }

    #[test]
    fn debate_preset_reads_full_history() {
        let cfg = WorkflowConfig::debate();
        assert!(cfg.inheritance_rules.full_history);
        assert_eq!(cfg.inheritance_rules.last_n_steps, None);
        assert_eq!(cfg.termination_conditions.max_steps, 6);
    }

    #[test]
    fn timeout_serializes_as_seconds() {
        let cfg = WorkflowConfig::debate();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["termination_conditions"]["inactivity_timeout"], 600);
        let back: WorkflowConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: WorkflowConfig =
            serde_json::from_str(r#"{"mode": "custom", "prompt_template": "{context}"}"#).unwrap();
        assert_eq!(cfg.mode, WorkflowMode::Custom);
        assert_eq!(cfg.inheritance_rules, InheritanceRules::default());
        assert!(cfg.roles.is_empty());
    }
}
