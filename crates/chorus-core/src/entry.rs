use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::ids::EntryId;

/// Well-known metadata keys carried on entries.
///
/// Metadata is an open map; these are the keys the engine itself reads or
/// writes. Anything else passes through untouched.
pub mod meta {
    /// Relay role that produced the entry (worldbuilder, editor, ...).
    pub const ROLE: &str = "role";
    /// Debate position that produced the entry (proponent, opponent, ...).
    pub const POSITION: &str = "position";
    /// Pre-computed summary that replaces `content` during context assembly.
    pub const SUMMARY: &str = "summary";
    /// Set on the entry that terminated its workflow.
    pub const FINAL_STEP: &str = "final_step";
    /// ID of the entry a branch forked from.
    pub const BRANCH_FROM: &str = "branch_from";
    /// ID of the entry a rebased copy was taken from.
    pub const REBASED_FROM: &str = "rebased_from";
    /// ID of the source tip an auto-merge pulled content from.
    pub const MERGED_FROM: &str = "merged_from";
    /// Workflow mode active when the entry was written.
    pub const WORKFLOW_MODE: &str = "workflow_mode";
    /// Model name that generated the entry.
    pub const MODEL: &str = "model";
    /// Marks entries appended through user intervention.
    pub const USER_INTERVENTION: &str = "user_intervention";
}

/// Who wrote an entry.
///
/// Stored as a single string column (`AI:gpt-4`, `User:Initiator`,
/// `System:Branch`), the format the rest of the system keys off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Author {
    Ai(String),
    User(String),
    System(String),
}

impl Author {
    pub fn is_ai(&self) -> bool {
        matches!(self, Self::Ai(_))
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ai(model) => write!(f, "AI:{model}"),
            Self::User(name) => write!(f, "User:{name}"),
            Self::System(reason) => write!(f, "System:{reason}"),
        }
    }
}

impl FromStr for Author {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("AI", rest)) => Ok(Self::Ai(rest.to_owned())),
            Some(("User", rest)) => Ok(Self::User(rest.to_owned())),
            Some(("System", rest)) => Ok(Self::System(rest.to_owned())),
            _ => Err(format!("unrecognized author: {s}")),
        }
    }
}

impl From<Author> for String {
    fn from(a: Author) -> String {
        a.to_string()
    }
}

impl TryFrom<String> for Author {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One immutable node in the collaboration history tree.
///
/// `parent_id = None` marks a root. `prompt` holds the text that produced
/// `content` and is empty for user-authored entries. Entries are never
/// mutated after insertion; corrections are new entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub parent_id: Option<EntryId>,
    pub content: String,
    pub prompt: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Entry {
    /// A new root entry (no parent).
    pub fn root(content: impl Into<String>, prompt: impl Into<String>, author: Author) -> Self {
        Self {
            id: EntryId::new(),
            parent_id: None,
            content: content.into(),
            prompt: prompt.into(),
            author,
            created_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// A new entry attached under `parent`.
    pub fn child_of(
        parent: &EntryId,
        content: impl Into<String>,
        prompt: impl Into<String>,
        author: Author,
    ) -> Self {
        Self {
            id: EntryId::new(),
            parent_id: Some(parent.clone()),
            content: content.into(),
            prompt: prompt.into(),
            author,
            created_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Builder-style metadata attachment.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }

    /// Read a metadata value as a string slice, if present and a string.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// True when the given metadata key exists, regardless of its value.
    pub fn has_meta(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    /// True when this entry terminated its workflow.
    pub fn is_final_step(&self) -> bool {
        self.metadata
            .get(meta::FINAL_STEP)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
