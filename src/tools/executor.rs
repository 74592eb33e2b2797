use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{future, FutureExt};
use mini_moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::manifest::{ToolConfigOverride, ToolDefinition};
use super::params::ToolParams;
use super::registry::ToolRegistry;
use super::result::ToolExecutionResult;
use super::tool::Tool;
use crate::config::ToolSettings;
use crate::error::{panic_message, Result, StageFlowError};
use crate::schema::validate_value;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub params: ToolParams,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, params: ToolParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// 解析后的单次调用配置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolExecutionConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub parallel: bool,
    pub cache: bool,
}

impl ToolExecutionConfig {
    pub fn from_settings(settings: &ToolSettings) -> Self {
        Self {
            timeout: settings.timeout(),
            max_retries: settings.max_retries,
            parallel: true,
            cache: false,
        }
    }

    pub fn apply(&mut self, overrides: &ToolConfigOverride) {
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(max_retries) = overrides.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(parallel) = overrides.parallel {
            self.parallel = parallel;
        }
        if let Some(cache) = overrides.cache {
            self.cache = cache;
        }
    }
}

struct Prepared {
    tool: Arc<dyn Tool>,
    config: ToolExecutionConfig,
    cache_key: Option<String>,
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    settings: ToolSettings,
    cache: Cache<String, ToolExecutionResult>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, settings: ToolSettings) -> Self {
        let cache = Cache::builder()
            .max_capacity(settings.cache_capacity)
            .time_to_live(settings.cache_ttl())
            .build();
        Self {
            registry,
            settings,
            cache,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    /// 全局默认 < 类目默认 < 工具定义 < 调用方覆盖
    pub fn resolve_config(
        &self,
        name: &str,
        overrides: Option<&ToolConfigOverride>,
    ) -> Result<ToolExecutionConfig> {
        let definition = self
            .registry
            .get_by_name(name)
            .ok_or_else(|| StageFlowError::ToolNotRegistered(name.to_string()))?;
        Ok(self.config_for(definition, overrides))
    }

    /// 单次调用：超时竞速、错误分类，永远返回结果信封
    pub async fn execute_safely(
        &self,
        name: &str,
        params: &ToolParams,
        overrides: Option<&ToolConfigOverride>,
    ) -> ToolExecutionResult {
        let started = Instant::now();
        match self.prepare(name, params, overrides) {
            Ok(prepared) => self.attempt(name, params, &prepared).await,
            Err(err) => {
                warn!(tool = %name, error = %err, "tool call rejected before dispatch");
                ToolExecutionResult::failure(name, &err, started.elapsed())
            }
        }
    }

    /// 失败后指数退避重试，最多 `max_retries` 次尝试，首次成功即返回
    pub async fn execute_with_retry(
        &self,
        name: &str,
        params: &ToolParams,
        max_retries: u32,
    ) -> ToolExecutionResult {
        let started = Instant::now();
        match self.prepare(name, params, None) {
            Ok(prepared) => self.run_with_retry(name, params, &prepared, max_retries).await,
            Err(err) => {
                warn!(tool = %name, error = %err, "tool call rejected before dispatch");
                ToolExecutionResult::failure(name, &err, started.elapsed())
            }
        }
    }

    /// 按解析后的配置执行（含重试）
    pub async fn execute(&self, call: &ToolCall) -> ToolExecutionResult {
        let started = Instant::now();
        match self.prepare(&call.name, &call.params, None) {
            Ok(prepared) => {
                let retries = prepared.config.max_retries;
                self.run_with_retry(&call.name, &call.params, &prepared, retries)
                    .await
            }
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool call rejected before dispatch");
                ToolExecutionResult::failure(&call.name, &err, started.elapsed())
            }
        }
    }

    /// 全部并发执行，结果顺序与输入一致；并发上限由调用方控制
    pub async fn execute_tools_in_parallel(&self, calls: &[ToolCall]) -> Vec<ToolExecutionResult> {
        info!(count = calls.len(), "executing tool batch");
        future::join_all(calls.iter().map(|call| self.execute(call))).await
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }

    async fn run_with_retry(
        &self,
        name: &str,
        params: &ToolParams,
        prepared: &Prepared,
        max_retries: u32,
    ) -> ToolExecutionResult {
        let allowed = max_retries.max(1);
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut result = self.attempt(name, params, prepared).await;
            if result.success || attempt >= allowed {
                result.attempts = attempt;
                result.execution_time_ms = started.elapsed().as_millis() as u64;
                if !result.success {
                    warn!(
                        tool = %name,
                        attempts = attempt,
                        error_type = ?result.error_type,
                        "tool failed after all attempts"
                    );
                }
                return result;
            }

            let delay = self.settings.backoff_for(attempt);
            warn!(
                tool = %name,
                attempt,
                allowed,
                error = ?result.error,
                delay_ms = delay.as_millis() as u64,
                "tool invocation failed, retrying"
            );
            sleep(delay).await;
        }
    }

    fn prepare(
        &self,
        name: &str,
        params: &ToolParams,
        overrides: Option<&ToolConfigOverride>,
    ) -> Result<Prepared> {
        let definition = self
            .registry
            .get_by_name(name)
            .ok_or_else(|| StageFlowError::ToolNotRegistered(name.to_string()))?;

        if params.category() != definition.category {
            return Err(StageFlowError::Validation {
                tool: name.to_string(),
                message: format!(
                    "expected {} parameters, got {}",
                    definition.category,
                    params.category()
                ),
            });
        }

        let value = params.to_value()?;
        validate_value(&definition.input_schema, &value).map_err(|err| err.into_flow_error(name))?;

        let tool = self
            .registry
            .executor(name)
            .ok_or_else(|| StageFlowError::ToolNotBound(name.to_string()))?;
        let config = self.config_for(definition, overrides);
        let cache_key = config.cache.then(|| format!("{name}:{value}"));

        Ok(Prepared {
            tool,
            config,
            cache_key,
        })
    }

    fn config_for(
        &self,
        definition: &ToolDefinition,
        overrides: Option<&ToolConfigOverride>,
    ) -> ToolExecutionConfig {
        let mut config = ToolExecutionConfig::from_settings(&self.settings);
        config.apply(&definition.category.default_overrides());
        config.apply(&definition.config);
        if let Some(overrides) = overrides {
            config.apply(overrides);
        }
        config
    }

    async fn attempt(
        &self,
        name: &str,
        params: &ToolParams,
        prepared: &Prepared,
    ) -> ToolExecutionResult {
        if let Some(key) = &prepared.cache_key {
            if let Some(hit) = self.cached(key) {
                debug!(tool = %name, "tool result served from cache");
                return hit;
            }
        }

        let started = Instant::now();
        let call = AssertUnwindSafe(prepared.tool.call(params)).catch_unwind();
        let outcome = match timeout(prepared.config.timeout, call).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(payload)) => {
                warn!(tool = %name, "tool panicked");
                Err(StageFlowError::tool_failed(
                    name,
                    format!("tool panicked: {}", panic_message(payload.as_ref())),
                ))
            }
            Err(_) => Err(StageFlowError::ToolTimeout {
                tool: name.to_string(),
                timeout_ms: prepared.config.timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(output) => {
                let result = ToolExecutionResult::success(name, output, started.elapsed());
                debug!(
                    tool = %name,
                    elapsed_ms = result.execution_time_ms,
                    quality = ?result.data_quality,
                    "tool call succeeded"
                );
                if let Some(key) = &prepared.cache_key {
                    self.cache.insert(key.clone(), result.clone());
                }
                result
            }
            Err(err) => {
                debug!(tool = %name, error = %err, "tool call failed");
                ToolExecutionResult::failure(name, &err, started.elapsed())
            }
        }
    }

    fn cached(&self, key: &String) -> Option<ToolExecutionResult> {
        self.cache.get(key).map(|mut result| {
            result.from_cache = true;
            result.execution_time_ms = 0;
            result
        })
    }
}
