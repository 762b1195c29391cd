pub mod echo;
pub mod registry;
pub mod scripted;

pub use echo::EchoGenerator;
pub use registry::GeneratorRegistry;
pub use scripted::{ScriptedGenerator, ScriptedResponse};
