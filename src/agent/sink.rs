use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Result, StageFlowError};
use crate::flow::Stage;
use crate::protocol::{InteractionRequest, StreamableResponse, SystemState};

/// agent 向调用方发出片段的出口
///
/// 片段按发出顺序送达。sink 记住最后一个终止片段的系统状态，供编排器判断阶段是否完成；
/// 调用方断开后发送返回 [`StageFlowError::StreamClosed`]。
pub struct FragmentSink {
    tx: mpsc::Sender<StreamableResponse>,
    agent: String,
    stage: Stage,
    progress: u8,
    emitted: AtomicU32,
    terminal: Mutex<Option<SystemState>>,
    transcript: Mutex<Vec<String>>,
}

impl FragmentSink {
    pub fn new(
        tx: mpsc::Sender<StreamableResponse>,
        agent: impl Into<String>,
        stage: Stage,
        progress: u8,
    ) -> Self {
        Self {
            tx,
            agent: agent.into(),
            stage,
            progress,
            emitted: AtomicU32::new(0),
            terminal: Mutex::new(None),
            transcript: Mutex::new(Vec::new()),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub async fn emit(&self, mut fragment: StreamableResponse) -> Result<()> {
        if let Some(display) = fragment.immediate_display.as_mut() {
            display.agent_name.get_or_insert_with(|| self.agent.clone());
            display.timestamp.get_or_insert_with(Utc::now);
            if !display.reply.is_empty() {
                self.transcript.lock().push(display.reply.clone());
            }
        }
        if let Some(state) = fragment.system_state.as_ref().filter(|state| state.done) {
            *self.terminal.lock() = Some(state.clone());
        }

        self.tx
            .send(fragment)
            .await
            .map_err(|_| StageFlowError::StreamClosed)?;
        let count = self.emitted.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(agent = %self.agent, count, "fragment emitted");
        Ok(())
    }

    pub async fn reply(&self, text: impl Into<String>) -> Result<()> {
        self.emit(StreamableResponse::reply(text)).await
    }

    pub async fn thinking(&self, text: impl Into<String>, thinking: impl Into<String>) -> Result<()> {
        self.emit(StreamableResponse::reply(text).with_thinking(thinking))
            .await
    }

    /// 附带阶段与进度的系统状态
    pub fn state(&self, state: SystemState) -> SystemState {
        let mut state = state;
        state.current_stage.get_or_insert_with(|| self.stage.to_string());
        state.progress.get_or_insert(self.progress);
        state
    }

    /// 发出终止片段
    pub async fn finish(&self, text: impl Into<String>, state: SystemState) -> Result<()> {
        let state = self.state(SystemState { done: true, ..state });
        self.emit(StreamableResponse::reply(text).with_state(state))
            .await
    }

    /// 发出带交互请求的终止片段，会话停留在当前阶段
    pub async fn ask(
        &self,
        text: impl Into<String>,
        interaction: InteractionRequest,
        state: SystemState,
    ) -> Result<()> {
        let state = self.state(SystemState { done: true, ..state });
        self.emit(
            StreamableResponse::reply(text)
                .with_interaction(interaction)
                .with_state(state),
        )
        .await
    }

    pub fn emitted(&self) -> u32 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn terminal(&self) -> Option<SystemState> {
        self.terminal.lock().clone()
    }

    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Intent;

    #[tokio::test]
    async fn records_terminal_state_and_fills_display_defaults() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = FragmentSink::new(tx, "welcome", Stage::Welcome, 10);
        sink.reply("hello").await.unwrap();
        assert!(sink.terminal().is_none());
        sink.finish("bye", SystemState::advance()).await.unwrap();

        let first = rx.recv().await.unwrap();
        let display = first.immediate_display.unwrap();
        assert_eq!(display.agent_name.as_deref(), Some("welcome"));
        assert!(display.timestamp.is_some());

        let terminal = sink.terminal().unwrap();
        assert_eq!(terminal.intent, Intent::Advance);
        assert_eq!(terminal.current_stage.as_deref(), Some("welcome"));
        assert_eq!(terminal.progress, Some(10));
        assert_eq!(sink.emitted(), 2);
        assert_eq!(sink.transcript(), vec!["hello", "bye"]);
    }

    #[tokio::test]
    async fn closed_receiver_reports_stream_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = FragmentSink::new(tx, "welcome", Stage::Welcome, 10);
        assert!(matches!(sink.reply("anyone?").await, Err(StageFlowError::StreamClosed)));
    }
}
