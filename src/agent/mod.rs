pub mod agent;
pub mod builtin;
pub mod registry;
pub mod sink;

pub use agent::{AgentInput, AgentTrigger, InteractionAction, InteractionOutcome, StageAgent};
pub use builtin::register_builtin_agents;
pub use registry::AgentRegistry;
pub use sink::FragmentSink;
