use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::{stream, FutureExt, Stream};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::constants::{fields, progress, FRAGMENT_BUFFER};
use super::registry::StageMapping;
use super::stage::Stage;
use crate::agent::{
    register_builtin_agents, AgentInput, AgentRegistry, FragmentSink, InteractionAction,
    StageAgent,
};
use crate::config::EngineConfig;
use crate::error::{panic_message, Result, StageFlowError};
use crate::protocol::{Intent, StreamableResponse, SystemState, UserInteraction};
use crate::session::{
    AgentFlowRecord, ConversationEntry, FlowMetrics, RecoveryRecommendation, Session,
    SessionHealth, SessionManager, Speaker,
};
use crate::tools::{ToolDispatcher, ToolExecutor, ToolRegistry};

/// 一次请求的片段流；以终止片段结束
pub type FragmentStream = Pin<Box<dyn Stream<Item = StreamableResponse> + Send>>;

type FragmentSender = mpsc::Sender<StreamableResponse>;

/// 一次 agent 执行结束的统一事件
///
/// 流式 `done` 片段和交互返回的 advance 都汇入这里，每次执行恰好追加一条审计记录。
#[derive(Clone, Debug)]
pub struct StageCompletion {
    pub agent: String,
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub input: Value,
    pub output: Option<Value>,
    pub advance: bool,
    pub fragments: u32,
    pub tool_calls: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageTransition {
    /// 停在当前阶段等待用户
    Parked,
    Advanced(Stage),
    Completed,
}

/// 按阶段顺序驱动 agent，并把它们的片段连成一条响应流
#[derive(Clone)]
pub struct Orchestrator {
    sessions: Arc<SessionManager>,
    agents: Arc<AgentRegistry>,
    mapping: Arc<StageMapping>,
}

impl Orchestrator {
    pub fn new(sessions: Arc<SessionManager>, agents: AgentRegistry, mapping: StageMapping) -> Self {
        Self {
            sessions,
            agents: Arc::new(agents),
            mapping: Arc::new(mapping),
        }
    }

    /// 使用内置 agent 和标准阶段映射组装
    pub fn with_builtin_agents(
        config: &EngineConfig,
        sessions: Arc<SessionManager>,
        tools: ToolRegistry,
    ) -> Self {
        let executor = Arc::new(ToolExecutor::new(Arc::new(tools), config.tools.clone()));
        let dispatcher = ToolDispatcher::new(executor, config.tools.max_parallel);
        let mut agents = AgentRegistry::new();
        register_builtin_agents(&mut agents, dispatcher, config.tools.max_suggestions);
        Self::new(sessions, agents, StageMapping::standard())
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn mapping(&self) -> &StageMapping {
        &self.mapping
    }

    /// 处理一条用户消息
    pub fn process_input(
        &self,
        session_id: impl Into<String>,
        message: impl Into<String>,
    ) -> FragmentStream {
        let this = self.clone();
        let session_id = session_id.into();
        let message = message.into();
        self.spawn_stream(move |tx| async move { this.run_input(session_id, message, tx).await })
    }

    /// 处理一次结构化交互（按钮、表单等）
    pub fn process_interaction(
        &self,
        session_id: impl Into<String>,
        interaction: UserInteraction,
    ) -> FragmentStream {
        let this = self.clone();
        let session_id = session_id.into();
        self.spawn_stream(move |tx| async move {
            this.run_interaction(session_id, interaction, tx).await
        })
    }

    pub async fn session_health(&self, session_id: &str) -> Result<SessionHealth> {
        let session = self.sessions.require_session(session_id).await?;
        Ok(self.sessions.session_health(&session))
    }

    pub async fn recovery(
        &self,
        session_id: &str,
        error: &StageFlowError,
    ) -> Result<RecoveryRecommendation> {
        let session = self.sessions.require_session(session_id).await?;
        Ok(self.sessions.recovery_recommendation(&session, error))
    }

    /// 记录一次阶段完成并决定去向；审计记录在决定之后追加，保证每次执行只有一条
    pub fn complete_stage(
        &self,
        session: &mut Session,
        completion: StageCompletion,
    ) -> Result<StageTransition> {
        let metrics = FlowMetrics {
            processing_time_ms: completion.elapsed.as_millis() as u64,
            tool_calls: completion.tool_calls,
            fragments: completion.fragments,
        };
        let record = AgentFlowRecord::running(
            &completion.agent,
            completion.stage,
            completion.started_at,
            completion.input,
        );

        let transition = if completion.advance {
            self.transition(session, &completion.agent)
        } else {
            Ok(StageTransition::Parked)
        };

        match transition {
            Ok(transition) => {
                session.record_flow(record.complete(completion.output, metrics))?;
                debug!(
                    session_id = %session.id,
                    agent = %completion.agent,
                    ?transition,
                    "stage completed"
                );
                Ok(transition)
            }
            Err(err) => {
                session.record_flow(record.fail(err.to_string(), metrics))?;
                session.record_error();
                Err(err)
            }
        }
    }

    fn transition(&self, session: &mut Session, agent: &str) -> Result<StageTransition> {
        if self.mapping.get_stage_from_agent(agent).is_none() {
            return Err(StageFlowError::AgentNotRegistered(agent.to_string()));
        }
        if !self.mapping.should_continue_to_next_agent(agent) {
            session.complete();
            info!(session_id = %session.id, "session completed");
            return Ok(StageTransition::Completed);
        }
        let next = self
            .mapping
            .get_next_agent(agent)
            .and_then(|next| self.mapping.get_stage_from_agent(next))
            .ok_or_else(|| StageFlowError::AgentNotRegistered(agent.to_string()))?;
        session.advance_to(next, self.mapping.progress_for(next))?;
        info!(session_id = %session.id, stage = %next, "stage advanced");
        Ok(StageTransition::Advanced(next))
    }

    fn spawn_stream<F, Fut>(&self, run: F) -> FragmentStream
    where
        F: FnOnce(FragmentSender) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        let guard = tx.clone();
        let task = tokio::spawn(run(tx));

        // 唯一的兜底：任何未处理的错误或 panic 都变成一个错误片段
        tokio::spawn(async move {
            let failure = match task.await {
                Ok(Ok(())) => None,
                Ok(Err(StageFlowError::StreamClosed)) => {
                    debug!("caller disconnected, request abandoned");
                    None
                }
                Ok(Err(err)) => Some(err),
                Err(join) => Some(StageFlowError::Other(anyhow::anyhow!(
                    "request task aborted: {join}"
                ))),
            };
            if let Some(err) = failure {
                crate::log_error!(err);
                let _ = guard.send(error_fragment(&err, None, None)).await;
            }
        });

        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|fragment| (fragment, rx))
        }))
    }

    async fn run_input(&self, session_id: String, message: String, tx: FragmentSender) -> Result<()> {
        let mut session = self.sessions.get_or_create(&session_id).await?;
        session.record_interaction();
        session.push_message(ConversationEntry::user(&message));

        if session.is_completed() {
            send(&tx, completion_fragment(&session)).await?;
            self.persist(&session).await;
            return Ok(());
        }
        self.drive(&mut session, AgentInput::user(message), &tx).await
    }

    async fn run_interaction(
        &self,
        session_id: String,
        interaction: UserInteraction,
        tx: FragmentSender,
    ) -> Result<()> {
        let mut session = self.sessions.require_session(&session_id).await?;
        session.record_interaction();
        session.push_message(
            ConversationEntry::user(interaction.data.to_string())
                .with_metadata(json!({ "interaction": interaction.kind })),
        );

        if session.is_completed() {
            send(&tx, completion_fragment(&session)).await?;
            self.persist(&session).await;
            return Ok(());
        }

        let stage = session.current_stage();
        let started_at = Utc::now();
        let (agent_name, agent) = match self.resolve(stage) {
            Ok(resolved) => resolved,
            Err(err) => {
                let input = serde_json::to_value(&interaction)?;
                return self
                    .fail(&mut session, stage.as_str(), stage, started_at, input, err, &tx)
                    .await;
            }
        };

        let checkpoint = session.clone();
        let timer = Instant::now();
        let handled = contain_panic(&agent_name, agent.handle_interaction(&interaction, &mut session)).await;
        let outcome = match handled {
            Ok(outcome) => outcome,
            Err(err) => {
                session = checkpoint;
                let input = serde_json::to_value(&interaction)?;
                return self
                    .fail(&mut session, &agent_name, stage, started_at, input, err, &tx)
                    .await;
            }
        };

        let mut fragments = 0;
        let mut output = None;
        if let Some(mut response) = outcome.response {
            if let Some(display) = response.immediate_display.as_mut() {
                display.agent_name.get_or_insert_with(|| agent_name.clone());
                display.timestamp.get_or_insert_with(Utc::now);
                session.push_message(ConversationEntry::assistant(&agent_name, &display.reply));
            }
            output = response
                .system_state
                .as_ref()
                .and_then(|state| state.metadata.clone());
            send(&tx, response).await?;
            fragments = 1;
        }

        let advance = match outcome.action {
            InteractionAction::Resubmit(message) => {
                debug!(session_id = %session.id, agent = %agent_name, "interaction resubmitted as input");
                return self.drive(&mut session, AgentInput::user(message), &tx).await;
            }
            InteractionAction::Advance => true,
            InteractionAction::Stay => false,
        };

        let completion = StageCompletion {
            agent: agent_name.clone(),
            stage,
            started_at,
            elapsed: timer.elapsed(),
            input: serde_json::to_value(&interaction)?,
            output,
            advance,
            fragments,
            tool_calls: 0,
        };
        let transition = match self.complete_stage(&mut session, completion) {
            Ok(transition) => transition,
            Err(err) => return self.report(&mut session, &agent_name, stage, err, &tx).await,
        };
        self.persist(&session).await;

        match self.follow(&session, transition, &agent_name, "", &tx).await? {
            Some(next) => self.drive(&mut session, next, &tx).await,
            None => Ok(()),
        }
    }

    /// 从当前阶段开始依次运行 agent，直到停下、完成或出错
    ///
    /// 每个阶段在一次请求内最多运行一次，循环因此必然终止。
    async fn drive(&self, session: &mut Session, mut input: AgentInput, tx: &FragmentSender) -> Result<()> {
        let mut visited = HashSet::new();
        loop {
            let stage = session.current_stage();
            if !visited.insert(stage) {
                warn!(session_id = %session.id, %stage, "stage already ran in this request, stopping");
                return Ok(());
            }

            let started_at = Utc::now();
            let (agent_name, agent) = match self.resolve(stage) {
                Ok(resolved) => resolved,
                Err(err) => {
                    return self
                        .fail(session, stage.as_str(), stage, started_at, input.snapshot(), err, tx)
                        .await;
                }
            };

            let sink = FragmentSink::new(tx.clone(), &agent_name, stage, self.mapping.progress_for(stage));
            let checkpoint = session.clone();
            let tool_calls_before = session.metadata.metrics.tool_calls;
            let timer = Instant::now();
            debug!(session_id = %session.id, agent = %agent_name, %stage, "agent started");

            match contain_panic(&agent_name, agent.process(&input, session, &sink)).await {
                Ok(()) => {}
                Err(StageFlowError::StreamClosed) => return Err(StageFlowError::StreamClosed),
                Err(err) => {
                    *session = checkpoint;
                    return self
                        .fail(session, &agent_name, stage, started_at, input.snapshot(), err, tx)
                        .await;
                }
            }

            let transcript = sink.transcript();
            if !transcript.is_empty() {
                session.push_message(
                    ConversationEntry::assistant(&agent_name, transcript.join("\n"))
                        .with_metadata(json!({ "stage": stage })),
                );
            }

            let terminal = sink.terminal();
            if terminal.is_none() {
                debug!(session_id = %session.id, agent = %agent_name, "agent ended without a terminal fragment");
            }
            let completion = StageCompletion {
                agent: agent_name.clone(),
                stage,
                started_at,
                elapsed: timer.elapsed(),
                input: input.snapshot(),
                advance: terminal.as_ref().is_some_and(SystemState::is_advance),
                output: terminal.and_then(|state| state.metadata),
                fragments: sink.emitted(),
                tool_calls: session
                    .metadata
                    .metrics
                    .tool_calls
                    .saturating_sub(tool_calls_before),
            };
            let transition = match self.complete_stage(session, completion) {
                Ok(transition) => transition,
                Err(err) => return self.report(session, &agent_name, stage, err, tx).await,
            };
            self.persist(session).await;

            match self.follow(session, transition, &agent_name, &input.message, tx).await? {
                Some(next) => input = next,
                None => return Ok(()),
            }
        }
    }

    /// 阶段完成后的去向：继续下一个 agent 时返回交接输入
    async fn follow(
        &self,
        session: &Session,
        transition: StageTransition,
        from: &str,
        message: &str,
        tx: &FragmentSender,
    ) -> Result<Option<AgentInput>> {
        match transition {
            StageTransition::Parked => Ok(None),
            StageTransition::Completed => {
                send(tx, completion_fragment(session)).await?;
                Ok(None)
            }
            StageTransition::Advanced(stage) if session.metadata.settings.auto_advance => {
                debug!(session_id = %session.id, from, %stage, "handing off");
                Ok(Some(AgentInput::handoff(from, message)))
            }
            StageTransition::Advanced(stage) => {
                let state = SystemState::park(Intent::Advance)
                    .with_stage(stage.as_str())
                    .with_progress(session.progress())
                    .with_next_agent(self.mapping.agent_for(stage).unwrap_or_default());
                send(tx, StreamableResponse::state(state)).await?;
                Ok(None)
            }
        }
    }

    fn resolve(&self, stage: Stage) -> Result<(String, Arc<dyn StageAgent>)> {
        let name = self
            .mapping
            .agent_for(stage)
            .ok_or_else(|| StageFlowError::UnknownStage(stage.to_string()))?;
        let agent = self
            .agents
            .agent(name)
            .ok_or_else(|| StageFlowError::AgentNotRegistered(name.to_string()))?;
        Ok((name.to_string(), agent))
    }

    /// agent 出错：追加失败记录，然后报告
    #[allow(clippy::too_many_arguments)]
    async fn fail(
        &self,
        session: &mut Session,
        agent: &str,
        stage: Stage,
        started_at: DateTime<Utc>,
        input: Value,
        err: StageFlowError,
        tx: &FragmentSender,
    ) -> Result<()> {
        let elapsed = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        let record = AgentFlowRecord::running(agent, stage, started_at, input).fail(
            err.to_string(),
            FlowMetrics {
                processing_time_ms: elapsed,
                ..FlowMetrics::default()
            },
        );
        session.record_flow(record)?;
        session.record_error();
        self.report(session, agent, stage, err, tx).await
    }

    /// 会话停留在当前阶段，向调用方发出错误片段
    async fn report(
        &self,
        session: &mut Session,
        agent: &str,
        stage: Stage,
        err: StageFlowError,
        tx: &FragmentSender,
    ) -> Result<()> {
        error!(session_id = %session.id, agent, %stage, error = %err, "agent failed");
        session.push_message(
            ConversationEntry::new(Speaker::System, err.to_string())
                .with_metadata(json!({ (fields::ERROR_TYPE): err.kind(), (fields::AGENT): agent })),
        );
        self.persist(session).await;

        let fragment = error_fragment(&err, Some(stage), Some(session.progress()))
            .with_agent(agent)
            .with_session_context(json!({ "session_id": session.id }));
        send(tx, fragment).await
    }

    /// 存储失败只记录日志，内存中的会话仍然有效
    async fn persist(&self, session: &Session) {
        if let Err(err) = self.sessions.save_session(session).await {
            crate::log_warn!(
                "failed to persist session",
                session_id = session.id.as_str(),
                error_type = err.kind()
            );
        }
    }
}

/// agent 内部的 panic 转成普通错误，走和其它失败相同的记录路径
async fn contain_panic<T>(agent: &str, work: impl Future<Output = Result<T>>) -> Result<T> {
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(StageFlowError::Other(anyhow::anyhow!(
            "agent `{agent}` panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

async fn send(tx: &FragmentSender, fragment: StreamableResponse) -> Result<()> {
    tx.send(fragment)
        .await
        .map_err(|_| StageFlowError::StreamClosed)
}

fn error_reply(err: &StageFlowError) -> String {
    match err {
        StageFlowError::ToolTimeout { .. } => {
            "That took longer than expected. Please try again in a moment.".to_string()
        }
        StageFlowError::SessionNotFound(_) => {
            "I couldn't find that conversation. Please start a new one.".to_string()
        }
        StageFlowError::Validation { message, .. } => {
            format!("Something in that input didn't look right: {message}")
        }
        _ => "Sorry, something went wrong while working on your request. Please try again.".to_string(),
    }
}

fn error_fragment(err: &StageFlowError, stage: Option<Stage>, progress: Option<u8>) -> StreamableResponse {
    let mut state = SystemState::park(Intent::Error).with_metadata(json!({
        (fields::ERROR): err.to_string(),
        (fields::ERROR_TYPE): err.kind(),
    }));
    if let Some(stage) = stage {
        state = state.with_stage(stage.as_str());
    }
    if let Some(progress) = progress {
        state = state.with_progress(progress);
    }
    StreamableResponse::reply(error_reply(err)).with_state(state)
}

fn completion_fragment(session: &Session) -> StreamableResponse {
    let state = SystemState::park(Intent::Done)
        .with_progress(progress::COMPLETE)
        .with_stage(session.current_stage().as_str())
        .with_metadata(json!({ (fields::COMPLETED_STAGES): session.completed_stages() }));
    StreamableResponse::reply("Your page is complete.")
        .with_state(state)
        .with_session_context(json!({
            "session_id": session.id,
            "status": session.status,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;

    fn orchestrator() -> Orchestrator {
        let sessions = Arc::new(SessionManager::new(Arc::new(MemorySessionStore::new())));
        Orchestrator::new(sessions, AgentRegistry::new(), StageMapping::standard())
    }

    fn completion(agent: &str, stage: Stage, advance: bool) -> StageCompletion {
        StageCompletion {
            agent: agent.into(),
            stage,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(5),
            input: Value::Null,
            output: None,
            advance,
            fragments: 1,
            tool_calls: 0,
        }
    }

    #[test]
    fn parked_completion_keeps_stage() {
        let orchestrator = orchestrator();
        let mut session = Session::new("p");
        let transition = orchestrator
            .complete_stage(&mut session, completion("welcome", Stage::Welcome, false))
            .unwrap();
        assert_eq!(transition, StageTransition::Parked);
        assert_eq!(session.current_stage(), Stage::Welcome);
        assert_eq!(session.agent_flow().len(), 1);
    }

    #[test]
    fn terminal_agent_completes_session() {
        let orchestrator = orchestrator();
        let mut session = Session::new("t");
        session.reset_to_stage(Stage::CodeGeneration, 90);
        let transition = orchestrator
            .complete_stage(&mut session, completion("coding", Stage::CodeGeneration, true))
            .unwrap();
        assert_eq!(transition, StageTransition::Completed);
        assert!(session.is_completed());
        assert_eq!(session.progress(), 100);
    }

    #[test]
    fn failed_transition_records_failure() {
        let orchestrator = orchestrator();
        let mut session = Session::new("f");
        let err = orchestrator
            .complete_stage(&mut session, completion("unknown", Stage::Welcome, true))
            .unwrap_err();
        assert_eq!(err.kind(), "agent_not_registered");
        assert_eq!(session.failed_flows(), 1);
        assert_eq!(session.metadata.metrics.errors_encountered, 1);
    }

    #[test]
    fn error_fragment_is_terminal() {
        let fragment = error_fragment(
            &StageFlowError::ToolTimeout {
                tool: "analyze_github".into(),
                timeout_ms: 10,
            },
            Some(Stage::InfoCollection),
            Some(40),
        );
        assert!(fragment.is_done());
        assert_eq!(fragment.intent(), Some(Intent::Error));
        let metadata = fragment.system_state.unwrap().metadata.unwrap();
        assert_eq!(metadata[fields::ERROR_TYPE], "timeout");
    }
}
