use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::params::ToolParams;
use crate::error::Result;

/// 工具执行的原始输出
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    pub data: Value,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ToolOutput {
    pub fn new(data: Value, confidence: f64) -> Self {
        Self {
            data,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    async fn call(&self, params: &ToolParams) -> Result<ToolOutput>;
}

type ToolFn = Arc<dyn Fn(ToolParams) -> BoxFuture<'static, Result<ToolOutput>> + Send + Sync>;

/// 闭包形式的工具，便于外部集成和测试替身
#[derive(Clone)]
pub struct FnTool {
    name: String,
    call: ToolFn,
}

impl FnTool {
    pub fn new<F, Fut>(name: impl Into<String>, call: F) -> Self
    where
        F: Fn(ToolParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Self {
            name: name.into(),
            call: Arc::new(move |params| call(params).boxed()),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, params: &ToolParams) -> Result<ToolOutput> {
        (self.call)(params.clone()).await
    }
}
