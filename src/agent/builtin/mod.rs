//! 内置的四个阶段 agent

mod coding;
mod collection;
mod design;
mod welcome;

use std::sync::Arc;

pub use coding::{render_page, CodingAgent};
pub use collection::{collected_from_tool, InfoCollectionAgent};
pub use design::{derive_design, PromptOutputAgent};
pub use welcome::WelcomeAgent;

use super::AgentRegistry;
use crate::registry::Registry;
use crate::tools::ToolDispatcher;

/// 注册全部内置 agent
pub fn register_builtin_agents(registry: &mut AgentRegistry, dispatcher: ToolDispatcher, max_tools: usize) {
    registry.register(Arc::new(WelcomeAgent::new()));
    registry.register(Arc::new(InfoCollectionAgent::new(dispatcher, max_tools)));
    registry.register(Arc::new(PromptOutputAgent::new()));
    registry.register(Arc::new(CodingAgent::new()));
}
