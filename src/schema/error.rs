use thiserror::Error;

use crate::error::StageFlowError;

/// Schema 错误类型
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("expected object parameters")]
    NotAnObject,
    #[error("missing required property `{0}`")]
    MissingRequired(String),
    #[error("property `{property}` expected {expected}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
    },
    #[error("property `{property}` must be one of {allowed}")]
    NotInEnum { property: String, allowed: String },
    #[error("property `{property}` is not a valid url: {reason}")]
    InvalidUrl { property: String, reason: String },
}

impl SchemaError {
    pub fn into_flow_error(self, tool: &str) -> StageFlowError {
        StageFlowError::Validation {
            tool: tool.to_string(),
            message: self.to_string(),
        }
    }
}
