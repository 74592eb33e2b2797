pub mod agent;
pub mod config;
pub mod error;
pub mod flow;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{
    register_builtin_agents, AgentInput, AgentRegistry, AgentTrigger, FragmentSink,
    InteractionAction, InteractionOutcome, StageAgent,
};
pub use config::{EngineConfig, EnvConfig, HealthThresholds, SessionSettings, ToolSettings};
pub use error::{Result, StageFlowError};
pub use flow::{
    FragmentStream, Orchestrator, Stage, StageBinding, StageCompletion, StageMapping,
    StageTransition,
};
pub use protocol::{
    Intent, InteractionElement, InteractionRequest, InteractionType, StreamableResponse,
    SystemState, UserInteraction,
};
pub use registry::Registry;
pub use schema::{InputSchema, PropertySchema, PropertyType, SchemaError};
#[cfg(feature = "redis-store")]
pub use session::RedisSessionStore;
pub use session::{
    AgentFlowRecord, CollectedData, FileSessionStore, HealthStatus, MemorySessionStore, Session,
    SessionHealth, SessionManager, SessionStore,
};
pub use tools::{
    builtin_registry, FnTool, Tool, ToolCall, ToolCategory, ToolDispatcher, ToolErrorType,
    ToolExecutionResult, ToolExecutor, ToolOutput, ToolParams, ToolRegistry, ToolSelector,
};
pub use utils::{logging, validation, LoggingConfig};
