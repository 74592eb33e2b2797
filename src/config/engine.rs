use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::env::EnvConfig;
use crate::error::{Result, StageFlowError};
use crate::utils::validation::ConfigValidator;

/// 引擎配置，所有字段都有默认值
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub tools: ToolSettings,
    pub session: SessionSettings,
    pub health: HealthThresholds,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolSettings {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub max_parallel: usize,
    pub cache_ttl_ms: u64,
    pub cache_capacity: u64,
    pub max_suggestions: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 5_000,
            max_parallel: 3,
            cache_ttl_ms: 300_000,
            cache_capacity: 256,
            max_suggestions: 3,
        }
    }
}

impl ToolSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// 第 `attempt` 次失败后的退避时间（从 1 开始），指数增长并封顶
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.backoff_cap_ms))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    pub expiry_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            expiry_ms: 24 * 60 * 60 * 1_000,
            cleanup_interval_ms: 60 * 60 * 1_000,
        }
    }
}

impl SessionSettings {
    pub fn expiry(&self) -> Duration {
        Duration::from_millis(self.expiry_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthThresholds {
    pub warning_errors: u32,
    pub critical_errors: u32,
    pub warning_failed_flows: usize,
    pub critical_failed_flows: usize,
    pub long_session_ms: u64,
    pub long_conversation_interactions: u32,
    pub restart_errors: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warning_errors: 3,
            critical_errors: 6,
            warning_failed_flows: 2,
            critical_failed_flows: 4,
            long_session_ms: 2 * 60 * 60 * 1_000,
            long_conversation_interactions: 50,
            restart_errors: 5,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 以默认值为基础，叠加 `STAGEFLOW_*` 环境变量
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = EnvConfig::parse_optional("STAGEFLOW_TOOL_TIMEOUT_MS")? {
            self.tools.timeout_ms = value;
        }
        if let Some(value) = EnvConfig::parse_optional("STAGEFLOW_TOOL_MAX_RETRIES")? {
            self.tools.max_retries = value;
        }
        if let Some(value) = EnvConfig::parse_optional("STAGEFLOW_TOOL_MAX_PARALLEL")? {
            self.tools.max_parallel = value;
        }
        if let Some(value) = EnvConfig::parse_optional("STAGEFLOW_SESSION_EXPIRY_MS")? {
            self.session.expiry_ms = value;
        }
        if let Some(value) = EnvConfig::parse_optional("STAGEFLOW_SESSION_CLEANUP_MS")? {
            self.session.cleanup_interval_ms = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ConfigValidator::validate_timeout_ms("tools.timeout_ms", self.tools.timeout_ms)?;
        ConfigValidator::validate_parallelism(self.tools.max_parallel)?;
        ConfigValidator::validate_backoff(self.tools.backoff_base_ms, self.tools.backoff_cap_ms)?;
        ConfigValidator::validate_timeout_ms("session.expiry_ms", self.session.expiry_ms)?;
        ConfigValidator::validate_timeout_ms(
            "session.cleanup_interval_ms",
            self.session.cleanup_interval_ms,
        )?;
        if self.health.warning_errors > self.health.critical_errors {
            return Err(StageFlowError::Config(
                "health.warning_errors must not exceed health.critical_errors".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.tools.timeout(), Duration::from_secs(30));
        assert_eq!(config.tools.max_retries, 3);
        assert_eq!(config.session.expiry(), Duration::from_secs(24 * 3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let tools = ToolSettings::default();
        assert_eq!(tools.backoff_for(1), Duration::from_millis(1_000));
        assert_eq!(tools.backoff_for(2), Duration::from_millis(2_000));
        assert_eq!(tools.backoff_for(3), Duration::from_millis(4_000));
        assert_eq!(tools.backoff_for(4), Duration::from_millis(5_000));
        assert_eq!(tools.backoff_for(40), Duration::from_millis(5_000));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"tools": {"max_parallel": 5}}"#).expect("config");
        assert_eq!(config.tools.max_parallel, 5);
        assert_eq!(config.tools.timeout_ms, 30_000);
        assert_eq!(config.health.critical_errors, 6);
    }

    #[test]
    fn invalid_json_config_is_rejected() {
        assert!(EngineConfig::from_json_str(r#"{"tools": {"max_parallel": 0}}"#).is_err());
        assert!(
            EngineConfig::from_json_str(r#"{"tools": {"backoff_base_ms": 9000}}"#).is_err()
        );
    }
}
