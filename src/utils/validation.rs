use crate::error::{Result, StageFlowError};

/// 配置与输入校验
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证 URL 格式
    pub fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(StageFlowError::Config("url must not be empty".into()));
        }

        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .ok_or_else(|| {
                StageFlowError::Config(format!("url `{url}` must start with http:// or https://"))
            })?;

        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(StageFlowError::Config(format!("url `{url}` has no valid host")));
        }

        Ok(())
    }

    /// 验证超时时间（毫秒）
    pub fn validate_timeout_ms(name: &str, timeout_ms: u64) -> Result<()> {
        if timeout_ms == 0 {
            return Err(StageFlowError::Config(format!("{name} must be greater than zero")));
        }
        Ok(())
    }

    pub fn validate_parallelism(limit: usize) -> Result<()> {
        if limit == 0 {
            return Err(StageFlowError::Config(
                "max_parallel must allow at least one concurrent tool call".into(),
            ));
        }
        Ok(())
    }

    pub fn validate_backoff(base_ms: u64, cap_ms: u64) -> Result<()> {
        if cap_ms < base_ms {
            return Err(StageFlowError::Config(format!(
                "backoff cap {cap_ms}ms is below the base delay {base_ms}ms"
            )));
        }
        Ok(())
    }

    /// 验证会话 ID
    pub fn validate_session_id(session_id: &str) -> Result<()> {
        if session_id.is_empty() {
            return Err(StageFlowError::Config("session id must not be empty".into()));
        }

        if !session_id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(StageFlowError::Config(format!(
                "session id `{session_id}` may only contain letters, digits, `_` and `-`"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(ConfigValidator::validate_url("").is_err());
        assert!(ConfigValidator::validate_url("example.com").is_err());
        assert!(ConfigValidator::validate_url("https://").is_err());
        assert!(ConfigValidator::validate_url("http://example.com").is_ok());
        assert!(ConfigValidator::validate_url("https://github.com/octocat?tab=repos").is_ok());
    }

    #[test]
    fn test_validate_session_id() {
        assert!(ConfigValidator::validate_session_id("").is_err());
        assert!(ConfigValidator::validate_session_id("session-1").is_ok());
        assert!(ConfigValidator::validate_session_id("session_1").is_ok());
        assert!(ConfigValidator::validate_session_id("../etc").is_err());
    }

    #[test]
    fn test_validate_backoff() {
        assert!(ConfigValidator::validate_backoff(1_000, 5_000).is_ok());
        assert!(ConfigValidator::validate_backoff(5_000, 1_000).is_err());
        assert!(ConfigValidator::validate_timeout_ms("timeout", 0).is_err());
        assert!(ConfigValidator::validate_parallelism(0).is_err());
    }
}
