use serde::{Deserialize, Serialize};

use crate::error::StageFlowError;

/// 工具执行失败的归一化分类
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorType {
    Timeout,
    Network,
    Permission,
    NotFound,
    InvalidInput,
    Unknown,
}

const TIMEOUT_PATTERNS: &[&str] = &["etimedout", "timeout", "timed out", "deadline exceeded"];
const NETWORK_PATTERNS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "enotfound",
    "eai_again",
    "network",
    "connection",
    "socket",
    "dns",
    "fetch failed",
];
const PERMISSION_PATTERNS: &[&str] = &[
    "permission",
    "forbidden",
    "unauthorized",
    "access denied",
    "rate limit",
    "401",
    "403",
];
const NOT_FOUND_PATTERNS: &[&str] = &["not found", "404", "no such", "does not exist"];
const INVALID_INPUT_PATTERNS: &[&str] = &[
    "invalid",
    "validation",
    "missing required",
    "malformed",
    "unsupported",
    "400",
];

impl ToolErrorType {
    pub const ALL: [ToolErrorType; 6] = [
        ToolErrorType::Timeout,
        ToolErrorType::Network,
        ToolErrorType::Permission,
        ToolErrorType::NotFound,
        ToolErrorType::InvalidInput,
        ToolErrorType::Unknown,
    ];

    /// 按消息文本分类，匹配顺序即优先级
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let hit = |patterns: &[&str]| patterns.iter().any(|pattern| lower.contains(pattern));

        if hit(TIMEOUT_PATTERNS) {
            ToolErrorType::Timeout
        } else if hit(NETWORK_PATTERNS) {
            ToolErrorType::Network
        } else if hit(PERMISSION_PATTERNS) {
            ToolErrorType::Permission
        } else if hit(NOT_FOUND_PATTERNS) {
            ToolErrorType::NotFound
        } else if hit(INVALID_INPUT_PATTERNS) {
            ToolErrorType::InvalidInput
        } else {
            ToolErrorType::Unknown
        }
    }

    /// 结构化错误优先按变体分类，其余按消息文本
    pub fn classify(error: &StageFlowError) -> Self {
        match error {
            StageFlowError::ToolTimeout { .. } => ToolErrorType::Timeout,
            StageFlowError::Validation { .. } => ToolErrorType::InvalidInput,
            StageFlowError::ToolNotRegistered(_) | StageFlowError::ToolNotBound(_) => {
                ToolErrorType::NotFound
            }
            StageFlowError::ToolFailed { message, .. } => Self::classify_message(message),
            other => Self::classify_message(&other.to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorType::Timeout => "timeout",
            ToolErrorType::Network => "network",
            ToolErrorType::Permission => "permission",
            ToolErrorType::NotFound => "not_found",
            ToolErrorType::InvalidInput => "invalid_input",
            ToolErrorType::Unknown => "unknown",
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        let items: &[&str] = match self {
            ToolErrorType::Timeout => &[
                "The source responded too slowly; try again in a moment",
                "Share a smaller page or document if the problem persists",
            ],
            ToolErrorType::Network => &[
                "Check that the link is reachable from the public internet",
                "Retry once the connection is stable",
            ],
            ToolErrorType::Permission => &[
                "Make sure the profile or page is public",
                "Paste the content directly instead of linking to it",
            ],
            ToolErrorType::NotFound => &[
                "Double-check the username or link for typos",
                "The resource may have been moved or deleted",
            ],
            ToolErrorType::InvalidInput => &[
                "Check the link or file format and try again",
                "Supported documents are PDF, DOCX, TXT and Markdown",
            ],
            ToolErrorType::Unknown => &["Try again, or describe the information manually"],
        };
        items.iter().map(|item| item.to_string()).collect()
    }
}

impl std::fmt::Display for ToolErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
