//! 工具目录、选择、执行与分发

pub mod builtin;
pub mod dispatch;
pub mod errors;
pub mod executor;
#[cfg(feature = "http-tools")]
pub mod http;
pub mod manifest;
pub mod params;
pub mod registry;
pub mod result;
pub mod selector;
pub mod tool;

pub use builtin::{builtin_definitions, builtin_registry};
pub use dispatch::ToolDispatcher;
pub use errors::ToolErrorType;
pub use executor::{ToolCall, ToolExecutionConfig, ToolExecutor};
pub use manifest::{
    ToolCategory, ToolConfigOverride, ToolDefinition, ToolDefinitionBuilder, ToolMetadata, Trigger,
};
pub use params::{
    CodeHostingParams, DocumentParams, DocumentType, ExtractMode, SocialPlatform,
    SocialProfileParams, ToolParams, WebPageParams,
};
pub use registry::{IntegrityReport, ToolRegistry};
pub use result::{DataQuality, ToolExecutionResult};
pub use selector::{MatchStrength, Role, SelectionRequest, ToolSelector, ToolSuggestion};
pub use tool::{FnTool, Tool, ToolOutput};
