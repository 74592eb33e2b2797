use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 流式响应中的一个片段
///
/// 片段可以只携带展示文本（中间片段），也可以携带 `system_state.done = true`
/// 作为终止片段。交互请求与展示文本可以出现在同一片段中。
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamableResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_display: Option<ImmediateDisplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<InteractionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_state: Option<SystemState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_context: Option<Value>,
}

impl StreamableResponse {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            immediate_display: Some(ImmediateDisplay::new(text)),
            ..Self::default()
        }
    }

    pub fn state(state: SystemState) -> Self {
        Self {
            system_state: Some(state),
            ..Self::default()
        }
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        let display = self
            .immediate_display
            .get_or_insert_with(|| ImmediateDisplay::new(String::new()));
        display.thinking = Some(thinking.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        if let Some(display) = self.immediate_display.as_mut() {
            display.agent_name = Some(agent.into());
        }
        self
    }

    pub fn with_interaction(mut self, interaction: InteractionRequest) -> Self {
        self.interaction = Some(interaction);
        self
    }

    pub fn with_state(mut self, state: SystemState) -> Self {
        self.system_state = Some(state);
        self
    }

    pub fn with_session_context(mut self, context: Value) -> Self {
        self.session_context = Some(context);
        self
    }

    pub fn is_done(&self) -> bool {
        self.system_state.as_ref().is_some_and(|state| state.done)
    }

    pub fn intent(&self) -> Option<Intent> {
        self.system_state.as_ref().map(|state| state.intent)
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.immediate_display
            .as_ref()
            .map(|display| display.reply.as_str())
            .filter(|reply| !reply.is_empty())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ImmediateDisplay {
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ImmediateDisplay {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// 当前阶段完成，进入下一阶段
    Advance,
    Continue,
    Collecting,
    UserChoiceRequired,
    Done,
    Error,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Advance => "advance",
            Intent::Continue => "continue",
            Intent::Collecting => "collecting",
            Intent::UserChoiceRequired => "user_choice_required",
            Intent::Done => "done",
            Intent::Error => "error",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SystemState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    pub intent: Intent,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl SystemState {
    pub fn new(intent: Intent, done: bool) -> Self {
        Self {
            progress: None,
            current_stage: None,
            intent,
            done,
            next_agent: None,
            metadata: None,
        }
    }

    /// `done + advance`：阶段完成并请求推进
    pub fn advance() -> Self {
        Self::new(Intent::Advance, true)
    }

    /// 终止片段但停留在当前阶段等待输入
    pub fn park(intent: Intent) -> Self {
        Self::new(intent, true)
    }

    pub fn in_progress(intent: Intent) -> Self {
        Self::new(intent, false)
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.current_stage = Some(stage.into());
        self
    }

    pub fn with_next_agent(mut self, agent: impl Into<String>) -> Self {
        self.next_agent = Some(agent.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_advance(&self) -> bool {
        self.done && self.intent == Intent::Advance
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Choice,
    Input,
    Form,
    Confirmation,
}

/// 请求用户交互
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InteractionRequest {
    #[serde(rename = "type")]
    pub kind: InteractionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub elements: Vec<InteractionElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl InteractionRequest {
    pub fn new(kind: InteractionType) -> Self {
        Self {
            kind,
            title: None,
            description: None,
            elements: Vec::new(),
            required: None,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn element(mut self, element: InteractionElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Button,
    Input,
    Select,
    Textarea,
    Checkbox,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ElementOption {
    pub value: String,
    pub label: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InteractionElement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<ElementOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Value>,
}

impl InteractionElement {
    pub fn new(id: impl Into<String>, kind: ElementType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            value: None,
            options: None,
            placeholder: None,
            required: None,
            validation: None,
        }
    }

    pub fn button(id: impl Into<String>, label: impl Into<String>, value: impl Into<String>) -> Self {
        let mut element = Self::new(id, ElementType::Button, label);
        element.value = Some(Value::String(value.into()));
        element
    }

    pub fn input(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, ElementType::Input, label)
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_options(mut self, options: Vec<ElementOption>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_validation(mut self, validation: Value) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }
}

/// 用户对交互请求的提交
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserInteraction {
    #[serde(rename = "type")]
    pub kind: InteractionType,
    #[serde(default)]
    pub data: Value,
}

impl UserInteraction {
    pub fn new(kind: InteractionType, data: Value) -> Self {
        Self { kind, data }
    }

    /// 读取字符串字段；`choice` 提交通常只有 `value`
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}
