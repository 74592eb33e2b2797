use thiserror::Error;

pub type Result<T> = std::result::Result<T, StageFlowError>;

#[derive(Debug, Error)]
pub enum StageFlowError {
    #[error("unknown stage `{0}`")]
    UnknownStage(String),
    #[error("agent `{0}` not registered")]
    AgentNotRegistered(String),
    #[error("tool `{0}` not registered")]
    ToolNotRegistered(String),
    #[error("tool `{0}` has no executor bound")]
    ToolNotBound(String),
    #[error("invalid transition from `{from}` to `{to}`")]
    InvalidTransition { from: String, to: String },
    #[error("invalid input for tool `{tool}`: {message}")]
    Validation { tool: String, message: String },
    #[error("tool `{tool}` timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },
    #[error("tool `{tool}` failed: {message}")]
    ToolFailed { tool: String, message: String },
    #[error("session `{0}` not found")]
    SessionNotFound(String),
    #[error("session store error: {0}")]
    Store(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("response stream closed by caller")]
    StreamClosed,
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageFlowError {
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// 机器可读的错误类别，写入错误片段的 `metadata.error_type`
    pub fn kind(&self) -> &'static str {
        match self {
            StageFlowError::UnknownStage(_) => "unknown_stage",
            StageFlowError::AgentNotRegistered(_) => "agent_not_registered",
            StageFlowError::ToolNotRegistered(_) => "tool_not_registered",
            StageFlowError::ToolNotBound(_) => "tool_not_bound",
            StageFlowError::InvalidTransition { .. } => "invalid_transition",
            StageFlowError::Validation { .. } => "invalid_input",
            StageFlowError::ToolTimeout { .. } => "timeout",
            StageFlowError::ToolFailed { .. } => "tool_failed",
            StageFlowError::SessionNotFound(_) => "session_not_found",
            StageFlowError::Store(_) => "store",
            StageFlowError::Serialization(_) => "serialization",
            StageFlowError::StreamClosed => "stream_closed",
            StageFlowError::Config(_) => "config",
            StageFlowError::Other(_) => "processing",
        }
    }
}

/// panic 载荷中的消息文本
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

impl From<serde_json::Error> for StageFlowError {
    fn from(error: serde_json::Error) -> Self {
        StageFlowError::Serialization(error.to_string())
    }
}
