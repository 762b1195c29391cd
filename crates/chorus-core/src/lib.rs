pub mod entry;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod ids;
pub mod workflow;

pub use entry::{Author, Entry};
pub use errors::GatewayError;
pub use events::WorkflowEvent;
pub use gateway::{GenerateOptions, TextGenerator};
pub use ids::EntryId;
pub use workflow::{
    InheritanceRules, RoleConfig, TerminationConditions, WorkflowConfig, WorkflowMode,
    WorkflowStatus,
};
