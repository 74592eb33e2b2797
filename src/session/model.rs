use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, StageFlowError};
use crate::flow::Stage;
use crate::tools::Role;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Abandoned,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct UserIntent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Personalization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_tone")]
    pub tone: String,
}

fn default_style() -> String {
    "modern".to_string()
}

fn default_tone() -> String {
    "professional".to_string()
}

impl Default for Personalization {
    fn default() -> Self {
        Self {
            profession: None,
            experience_level: None,
            style: default_style(),
            tone: default_tone(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PersonalInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfessionalInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
}

/// 各阶段逐步累积的用户资料
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CollectedData {
    #[serde(default)]
    pub personal: PersonalInfo,
    #[serde(default)]
    pub professional: ProfessionalInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experience: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub education: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub achievements: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

fn fill(slot: &mut Option<String>, incoming: Option<String>) {
    if slot.as_deref().map_or(true, str::is_empty) {
        if let Some(value) = incoming.filter(|value| !value.trim().is_empty()) {
            *slot = Some(value);
        }
    }
}

fn extend_unique<T: PartialEq>(target: &mut Vec<T>, incoming: Vec<T>) {
    for item in incoming {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

impl CollectedData {
    /// 增量合并：已有字段不会被覆盖，列表去重追加
    pub fn merge(&mut self, other: CollectedData) {
        let CollectedData {
            personal,
            professional,
            experience,
            education,
            projects,
            achievements,
            certifications,
            sources,
        } = other;

        fill(&mut self.personal.name, personal.name);
        fill(&mut self.personal.email, personal.email);
        fill(&mut self.personal.location, personal.location);
        fill(&mut self.personal.website, personal.website);
        fill(&mut self.personal.avatar_url, personal.avatar_url);
        fill(&mut self.personal.bio, personal.bio);

        fill(&mut self.professional.title, professional.title);
        fill(&mut self.professional.company, professional.company);
        fill(&mut self.professional.summary, professional.summary);
        extend_unique(&mut self.professional.skills, professional.skills);

        extend_unique(&mut self.experience, experience);
        extend_unique(&mut self.education, education);
        extend_unique(&mut self.projects, projects);
        extend_unique(&mut self.achievements, achievements);
        extend_unique(&mut self.certifications, certifications);
        extend_unique(&mut self.sources, sources);
    }

    pub fn is_empty(&self) -> bool {
        *self == CollectedData::default()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversationEntry {
    pub id: String,
    pub speaker: Speaker,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ConversationEntry {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            speaker,
            content: content.into(),
            agent: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Speaker::User, content)
    }

    pub fn assistant(agent: impl Into<String>, content: impl Into<String>) -> Self {
        let mut entry = Self::new(Speaker::Assistant, content);
        entry.agent = Some(agent.into());
        entry
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FlowMetrics {
    pub processing_time_ms: u64,
    #[serde(default)]
    pub tool_calls: u32,
    #[serde(default)]
    pub fragments: u32,
}

/// 一次 agent 执行的审计记录；追加后不再修改
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentFlowRecord {
    pub id: String,
    pub agent: String,
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: FlowStatus,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metrics: FlowMetrics,
}

impl AgentFlowRecord {
    pub fn running(agent: impl Into<String>, stage: Stage, started_at: DateTime<Utc>, input: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent: agent.into(),
            stage,
            started_at,
            finished_at: None,
            status: FlowStatus::Running,
            input,
            output: None,
            error: None,
            metrics: FlowMetrics::default(),
        }
    }

    pub fn complete(mut self, output: Option<Value>, metrics: FlowMetrics) -> Self {
        self.status = FlowStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.output = output;
        self.metrics = metrics;
        self
    }

    pub fn fail(mut self, error: impl Into<String>, metrics: FlowMetrics) -> Self {
        self.status = FlowStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
        self.metrics = metrics;
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StageProgress {
    pub current_stage: Stage,
    #[serde(default)]
    pub completed_stages: Vec<Stage>,
    #[serde(default)]
    pub percentage: u8,
}

impl Default for StageProgress {
    fn default() -> Self {
        Self {
            current_stage: Stage::first(),
            completed_stages: Vec::new(),
            percentage: 0,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionMetrics {
    #[serde(default)]
    pub interactions: u32,
    #[serde(default)]
    pub errors_encountered: u32,
    #[serde(default)]
    pub tool_calls: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionPreferences {
    #[serde(default = "default_language")]
    pub language: String,
    /// 阶段完成后是否在同一响应流中继续下一个 agent
    #[serde(default = "default_auto_advance")]
    pub auto_advance: bool,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_auto_advance() -> bool {
    true
}

impl Default for SessionPreferences {
    fn default() -> Self {
        Self {
            language: default_language(),
            auto_advance: default_auto_advance(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub progress: StageProgress,
    #[serde(default)]
    pub metrics: SessionMetrics,
    #[serde(default)]
    pub settings: SessionPreferences,
}

impl SessionMetadata {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            last_activity: now,
            progress: StageProgress::default(),
            metrics: SessionMetrics::default(),
            settings: SessionPreferences::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Theme {
    pub primary_color: String,
    pub accent_color: String,
    pub background_color: String,
    pub font_family: String,
}

/// 页面设计方案，由设计阶段产出、生成阶段消费
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PageDesign {
    pub layout: String,
    pub theme: Theme,
    pub sections: Vec<String>,
    pub tone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_design: Option<PageDesign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// 会话：一次完整流水线运行的可恢复状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub intent: UserIntent,
    #[serde(default)]
    pub personalization: Personalization,
    #[serde(default)]
    pub collected_data: CollectedData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conversation_history: Vec<ConversationEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    agent_flow: Vec<AgentFlowRecord>,
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub artifacts: SessionArtifacts,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            status: SessionStatus::Active,
            intent: UserIntent::default(),
            personalization: Personalization::default(),
            collected_data: CollectedData::default(),
            conversation_history: Vec::new(),
            agent_flow: Vec::new(),
            metadata: SessionMetadata::new(Utc::now()),
            artifacts: SessionArtifacts::default(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// 持久化时拆分出的三类记录：快照、对话日志、agent 审计日志
    pub fn into_parts(mut self) -> (Session, Vec<ConversationEntry>, Vec<AgentFlowRecord>) {
        let conversation = std::mem::take(&mut self.conversation_history);
        let flow = std::mem::take(&mut self.agent_flow);
        (self, conversation, flow)
    }

    pub fn from_parts(
        mut snapshot: Session,
        conversation: Vec<ConversationEntry>,
        flow: Vec<AgentFlowRecord>,
    ) -> Session {
        snapshot.conversation_history = conversation;
        snapshot.agent_flow = flow;
        snapshot
    }

    pub fn current_stage(&self) -> Stage {
        self.metadata.progress.current_stage
    }

    pub fn completed_stages(&self) -> &[Stage] {
        &self.metadata.progress.completed_stages
    }

    pub fn progress(&self) -> u8 {
        self.metadata.progress.percentage
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn conversation_history(&self) -> &[ConversationEntry] {
        &self.conversation_history
    }

    pub fn agent_flow(&self) -> &[AgentFlowRecord] {
        &self.agent_flow
    }

    pub fn push_message(&mut self, entry: ConversationEntry) {
        self.conversation_history.push(entry);
        self.touch();
    }

    /// 追加审计记录；仍处于 running 的记录不接受
    pub fn record_flow(&mut self, record: AgentFlowRecord) -> Result<()> {
        if record.status == FlowStatus::Running {
            return Err(StageFlowError::Other(anyhow::anyhow!(
                "agent flow record `{}` must be finished before it is appended",
                record.id
            )));
        }
        self.agent_flow.push(record);
        self.touch();
        Ok(())
    }

    pub fn failed_flows(&self) -> usize {
        self.agent_flow
            .iter()
            .filter(|record| record.status == FlowStatus::Failed)
            .count()
    }

    /// 单调推进到后续阶段，当前阶段记入已完成列表
    pub fn advance_to(&mut self, next: Stage, percentage: u8) -> Result<()> {
        let current = self.current_stage();
        if next <= current {
            return Err(StageFlowError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        let progress = &mut self.metadata.progress;
        if !progress.completed_stages.contains(&current) {
            progress.completed_stages.push(current);
        }
        progress.current_stage = next;
        progress.percentage = progress.percentage.max(percentage.min(100));
        self.touch();
        Ok(())
    }

    /// 流水线结束：最后一个阶段记入已完成，进度 100
    pub fn complete(&mut self) {
        let progress = &mut self.metadata.progress;
        if !progress.completed_stages.contains(&progress.current_stage) {
            progress.completed_stages.push(progress.current_stage);
        }
        progress.percentage = 100;
        self.status = SessionStatus::Completed;
        self.touch();
    }

    /// 管理操作：回到指定阶段，截断已完成列表中该阶段及之后的部分
    pub fn reset_to_stage(&mut self, stage: Stage, percentage: u8) {
        let progress = &mut self.metadata.progress;
        progress.completed_stages.retain(|completed| *completed < stage);
        progress.current_stage = stage;
        progress.percentage = percentage.min(100);
        self.status = SessionStatus::Active;
        self.touch();
    }

    pub fn record_interaction(&mut self) {
        self.metadata.metrics.interactions += 1;
        self.touch();
    }

    pub fn record_error(&mut self) {
        self.metadata.metrics.errors_encountered += 1;
        self.touch();
    }

    pub fn record_tool_calls(&mut self, count: u32) {
        self.metadata.metrics.tool_calls += count;
    }

    pub fn touch(&mut self) {
        let now = Utc::now();
        self.metadata.updated_at = now;
        self.metadata.last_activity = now;
    }

    pub fn duration(&self) -> Duration {
        self.metadata.last_activity - self.metadata.created_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now - self.metadata.last_activity > threshold
    }
}
