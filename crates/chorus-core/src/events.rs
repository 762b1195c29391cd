use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::ids::EntryId;

/// Notifications emitted by the engine after tree mutations.
///
/// The transport layer fans these out over whatever push channel it owns;
/// the core only writes to a `tokio::sync::broadcast` sender and does not
/// depend on any push protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    #[serde(rename = "step_completed")]
    StepCompleted { workflow_id: EntryId, entry: Entry },

    #[serde(rename = "user_input_added")]
    UserInputAdded { workflow_id: EntryId, entry: Entry },

    #[serde(rename = "branch_created")]
    BranchCreated { base_id: EntryId, entry: Entry },

    #[serde(rename = "workflow_terminated")]
    WorkflowTerminated {
        workflow_id: EntryId,
        final_entry_id: EntryId,
    },
}

impl WorkflowEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StepCompleted { .. } => "step_completed",
            Self::UserInputAdded { .. } => "user_input_added",
            Self::BranchCreated { .. } => "branch_created",
            Self::WorkflowTerminated { .. } => "workflow_terminated",
        }
    }

    /// The entry carried by the event, when there is one.
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            Self::StepCompleted { entry, .. }
            | Self::UserInputAdded { entry, .. }
            | Self::BranchCreated { entry, .. } => Some(entry),
            Self::WorkflowTerminated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Author;

    #[test]
    fn serde_tags_events() {
        let entry = Entry::root("x", "", Author::User("Initiator".into()));
        let event = WorkflowEvent::StepCompleted {
            workflow_id: entry.id.clone(),
            entry,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step_completed");
    }

    #[test]
    fn event_type_matches_variant() {
        let entry = Entry::root("x", "", Author::User("Initiator".into()));
        let id = entry.id.clone();
        let event = WorkflowEvent::WorkflowTerminated {
            workflow_id: id.clone(),
            final_entry_id: id,
        };
        assert_eq!(event.event_type(), "workflow_terminated");
        assert!(event.entry().is_none());
    }
}
