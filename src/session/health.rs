use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::Session;
use crate::config::HealthThresholds;
use crate::error::StageFlowError;
use crate::flow::Stage;
use crate::tools::ToolErrorType;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct HealthMetrics {
    pub errors: u32,
    pub failed_flows: usize,
    pub duration_ms: i64,
    pub interactions: u32,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SessionHealth {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub metrics: HealthMetrics,
}

impl SessionHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

pub fn assess(session: &Session, thresholds: &HealthThresholds) -> SessionHealth {
    assess_at(session, thresholds, Utc::now())
}

/// 按错误数、失败记录数、会话时长与交互次数分级
pub fn assess_at(session: &Session, thresholds: &HealthThresholds, now: DateTime<Utc>) -> SessionHealth {
    let metrics = HealthMetrics {
        errors: session.metadata.metrics.errors_encountered,
        failed_flows: session.failed_flows(),
        duration_ms: (now - session.metadata.created_at).num_milliseconds(),
        interactions: session.metadata.metrics.interactions,
    };

    let mut status = HealthStatus::Healthy;
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();
    let mut raise = |level: HealthStatus| {
        if level > status {
            status = level;
        }
    };

    if metrics.errors >= thresholds.critical_errors {
        raise(HealthStatus::Critical);
        issues.push(format!("{} errors encountered", metrics.errors));
        suggestions.push("Restart the session from the beginning".to_string());
    } else if metrics.errors >= thresholds.warning_errors {
        raise(HealthStatus::Warning);
        issues.push(format!("{} errors encountered", metrics.errors));
        suggestions.push("Retry the current stage or reset it".to_string());
    }

    if metrics.failed_flows >= thresholds.critical_failed_flows {
        raise(HealthStatus::Critical);
        issues.push(format!("{} agent runs failed", metrics.failed_flows));
        suggestions.push("Check tool availability before continuing".to_string());
    } else if metrics.failed_flows >= thresholds.warning_failed_flows {
        raise(HealthStatus::Warning);
        issues.push(format!("{} agent runs failed", metrics.failed_flows));
        suggestions.push("Review the failing stage input".to_string());
    }

    if metrics.duration_ms > thresholds.long_session_ms as i64 {
        raise(HealthStatus::Warning);
        issues.push("Session has been running for a long time".to_string());
        suggestions.push("Save progress and continue in a new session".to_string());
    }

    if metrics.interactions > thresholds.long_conversation_interactions {
        raise(HealthStatus::Warning);
        issues.push(format!("{} interactions in one session", metrics.interactions));
        suggestions.push("Summarize collected data and move to the next stage".to_string());
    }

    SessionHealth {
        status,
        issues,
        suggestions,
        metrics,
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    Retry,
    Reset,
    Restart,
}

/// 恢复建议；只读，不修改会话
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RecoveryRecommendation {
    pub action: RecoveryAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_stage: Option<Stage>,
    pub reason: String,
}

fn is_transient(error: &StageFlowError) -> bool {
    matches!(
        ToolErrorType::classify(error),
        ToolErrorType::Timeout | ToolErrorType::Network
    )
}

fn is_processing_failure(error: &StageFlowError) -> bool {
    match error {
        StageFlowError::AgentNotRegistered(_)
        | StageFlowError::UnknownStage(_)
        | StageFlowError::InvalidTransition { .. } => true,
        other => {
            let message = other.to_string().to_lowercase();
            ["agent", "processing", "stage"]
                .iter()
                .any(|pattern| message.contains(pattern))
        }
    }
}

pub fn recommend(
    session: &Session,
    error: &StageFlowError,
    thresholds: &HealthThresholds,
) -> RecoveryRecommendation {
    if is_transient(error) {
        return RecoveryRecommendation {
            action: RecoveryAction::Retry,
            target_stage: None,
            reason: "transient network or timeout failure".to_string(),
        };
    }

    if is_processing_failure(error) {
        return RecoveryRecommendation {
            action: RecoveryAction::Reset,
            target_stage: Some(session.current_stage()),
            reason: format!("agent failed while processing `{}`", session.current_stage()),
        };
    }

    let health = assess(session, thresholds);
    if health.status == HealthStatus::Critical
        || session.metadata.metrics.errors_encountered > thresholds.restart_errors
    {
        return RecoveryRecommendation {
            action: RecoveryAction::Restart,
            target_stage: Some(Stage::first()),
            reason: "session is in a critical state".to_string(),
        };
    }

    RecoveryRecommendation {
        action: RecoveryAction::Retry,
        target_stage: None,
        reason: "no specific recovery applies".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::session::model::{AgentFlowRecord, FlowMetrics};

    fn session_with_errors(errors: u32) -> Session {
        let mut session = Session::new("health");
        session.metadata.metrics.errors_encountered = errors;
        session
    }

    #[test]
    fn six_errors_is_critical() {
        let thresholds = HealthThresholds::default();
        assert_eq!(assess(&session_with_errors(6), &thresholds).status, HealthStatus::Critical);
        assert_eq!(assess(&session_with_errors(3), &thresholds).status, HealthStatus::Warning);
        assert!(assess(&session_with_errors(0), &thresholds).is_healthy());
    }

    #[test]
    fn failed_flows_and_duration_raise_warnings() {
        let thresholds = HealthThresholds::default();
        let mut session = Session::new("health");
        for _ in 0..2 {
            let record = AgentFlowRecord::running("coding", Stage::CodeGeneration, Utc::now(), Default::default())
                .fail("boom", FlowMetrics::default());
            session.record_flow(record).unwrap();
        }
        let health = assess(&session, &thresholds);
        assert_eq!(health.status, HealthStatus::Warning);
        assert_eq!(health.metrics.failed_flows, 2);

        let later = Utc::now() + Duration::hours(3);
        let health = assess_at(&Session::new("long"), &thresholds, later);
        assert_eq!(health.status, HealthStatus::Warning);
    }

    #[test]
    fn recovery_follows_decision_table() {
        let thresholds = HealthThresholds::default();
        let session = session_with_errors(1);

        let timeout = StageFlowError::ToolTimeout { tool: "t".into(), timeout_ms: 10 };
        assert_eq!(recommend(&session, &timeout, &thresholds).action, RecoveryAction::Retry);

        let network = StageFlowError::tool_failed("t", "ECONNREFUSED");
        assert_eq!(recommend(&session, &network, &thresholds).action, RecoveryAction::Retry);

        let agent = StageFlowError::AgentNotRegistered("coding".into());
        let advice = recommend(&session, &agent, &thresholds);
        assert_eq!(advice.action, RecoveryAction::Reset);
        assert_eq!(advice.target_stage, Some(Stage::Welcome));

        let store = StageFlowError::Store("disk full".into());
        assert_eq!(recommend(&session, &store, &thresholds).action, RecoveryAction::Retry);
        assert_eq!(
            recommend(&session_with_errors(7), &store, &thresholds).action,
            RecoveryAction::Restart
        );
    }
}
