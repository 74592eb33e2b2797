use std::sync::Arc;

use futures::future;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::executor::{ToolCall, ToolExecutor};
use super::result::ToolExecutionResult;
use crate::error::StageFlowError;

/// 有界并发的工具分发器
///
/// 每个调用先取得一个许可再执行；不允许并行的工具一次取走全部许可，独占执行。
#[derive(Clone)]
pub struct ToolDispatcher {
    executor: Arc<ToolExecutor>,
    permits: Arc<Semaphore>,
    max_parallel: usize,
}

impl ToolDispatcher {
    pub fn new(executor: Arc<ToolExecutor>, max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        Self {
            executor,
            permits: Arc::new(Semaphore::new(max_parallel)),
            max_parallel,
        }
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// 结果顺序与调用顺序一致，与完成顺序无关
    pub async fn dispatch(&self, calls: &[ToolCall]) -> Vec<ToolExecutionResult> {
        debug!(count = calls.len(), limit = self.max_parallel, "dispatching tool calls");
        future::join_all(calls.iter().map(|call| self.run(call))).await
    }

    async fn run(&self, call: &ToolCall) -> ToolExecutionResult {
        let exclusive = self
            .executor
            .resolve_config(&call.name, None)
            .map(|config| !config.parallel)
            .unwrap_or(false);
        let wanted = if exclusive { self.max_parallel as u32 } else { 1 };

        let _permit = match Arc::clone(&self.permits).acquire_many_owned(wanted).await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(tool = %call.name, "tool dispatcher closed");
                let error = StageFlowError::tool_failed(&call.name, "tool dispatcher closed");
                return ToolExecutionResult::failure(&call.name, &error, Default::default());
            }
        };
        self.executor.execute(call).await
    }
}
