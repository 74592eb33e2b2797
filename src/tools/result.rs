use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ToolErrorType;
use super::tool::ToolOutput;
use crate::error::StageFlowError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Low,
    Medium,
    High,
}

impl DataQuality {
    /// 置信度、结构化数据、元数据与建议数量的加权评分
    pub fn assess(
        confidence: f64,
        data: &Value,
        metadata: Option<&Value>,
        suggestions: &[String],
    ) -> Self {
        let structured = match data {
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => false,
        };
        let has_metadata = metadata.is_some_and(|value| !value.is_null());

        let mut score = confidence.clamp(0.0, 1.0) * 0.5;
        if structured {
            score += 0.25;
        }
        if has_metadata {
            score += 0.15;
        }
        if suggestions.is_empty() {
            score += 0.10;
        }

        if score >= 0.8 {
            DataQuality::High
        } else if score >= 0.5 {
            DataQuality::Medium
        } else {
            DataQuality::Low
        }
    }
}

/// 单次工具调用的统一结果信封
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolExecutionResult {
    pub tool_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ToolErrorType>,
    pub confidence: f64,
    pub execution_time_ms: u64,
    pub data_quality: DataQuality,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub attempts: u32,
    #[serde(default)]
    pub from_cache: bool,
}

impl ToolExecutionResult {
    pub fn success(tool: &str, output: ToolOutput, elapsed: Duration) -> Self {
        let data_quality = DataQuality::assess(
            output.confidence,
            &output.data,
            output.metadata.as_ref(),
            &output.suggestions,
        );
        Self {
            tool_name: tool.to_string(),
            success: true,
            data: Some(output.data),
            error: None,
            error_type: None,
            confidence: output.confidence.clamp(0.0, 1.0),
            execution_time_ms: elapsed.as_millis() as u64,
            data_quality,
            suggestions: output.suggestions,
            metadata: output.metadata,
            attempts: 1,
            from_cache: false,
        }
    }

    pub fn failure(tool: &str, error: &StageFlowError, elapsed: Duration) -> Self {
        let error_type = ToolErrorType::classify(error);
        Self {
            tool_name: tool.to_string(),
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_type: Some(error_type),
            confidence: 0.0,
            execution_time_ms: elapsed.as_millis() as u64,
            data_quality: DataQuality::Low,
            suggestions: error_type.suggestions(),
            metadata: None,
            attempts: 1,
            from_cache: false,
        }
    }
}
