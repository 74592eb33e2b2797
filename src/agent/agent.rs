use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::sink::FragmentSink;
use crate::error::Result;
use crate::protocol::{StreamableResponse, UserInteraction};
use crate::session::Session;

/// agent 被调用的原因
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentTrigger {
    /// 用户在当前阶段的输入
    User,
    /// 上一阶段完成后在同一响应流中交接
    Handoff { from: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentInput {
    pub message: String,
    pub trigger: AgentTrigger,
}

impl AgentInput {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trigger: AgentTrigger::User,
        }
    }

    pub fn handoff(from: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trigger: AgentTrigger::Handoff { from: from.into() },
        }
    }

    pub fn is_handoff(&self) -> bool {
        matches!(self.trigger, AgentTrigger::Handoff { .. })
    }

    pub fn snapshot(&self) -> Value {
        json!(self)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InteractionAction {
    /// 阶段完成并推进，与流式 `done + advance` 等价
    Advance,
    /// 停留在当前阶段
    Stay,
    /// 把提交内容当作一次用户输入重新交给当前 agent 处理
    Resubmit(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct InteractionOutcome {
    pub action: InteractionAction,
    pub response: Option<StreamableResponse>,
}

impl InteractionOutcome {
    pub fn advance() -> Self {
        Self {
            action: InteractionAction::Advance,
            response: None,
        }
    }

    pub fn stay() -> Self {
        Self {
            action: InteractionAction::Stay,
            response: None,
        }
    }

    pub fn resubmit(message: impl Into<String>) -> Self {
        Self {
            action: InteractionAction::Resubmit(message.into()),
            response: None,
        }
    }

    pub fn with_response(mut self, response: StreamableResponse) -> Self {
        self.response = Some(response);
        self
    }
}

/// 绑定到某一阶段的可执行单元
///
/// `process` 通过 sink 依次发出片段；发出 `done = true` 的片段表示本阶段这一轮结束，
/// 同时 `intent = advance` 表示请求推进到下一阶段。
#[async_trait]
pub trait StageAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn process(
        &self,
        input: &AgentInput,
        session: &mut Session,
        sink: &FragmentSink,
    ) -> Result<()>;

    async fn handle_interaction(
        &self,
        _interaction: &UserInteraction,
        _session: &mut Session,
    ) -> Result<InteractionOutcome> {
        Ok(InteractionOutcome::stay())
    }
}
