use crate::error::{Result, StageFlowError};
use std::env;
use std::str::FromStr;

/// 环境变量配置管理
pub struct EnvConfig;

impl EnvConfig {
    /// 从环境变量获取值
    pub fn get_env(key: &str) -> Result<String> {
        env::var(key)
            .map_err(|_| StageFlowError::Config(format!("environment variable `{key}` is not set")))
    }

    /// 获取可选的环境变量
    pub fn get_env_optional(key: &str) -> Option<String> {
        env::var(key).ok().filter(|value| !value.trim().is_empty())
    }

    /// 获取并解析可选的环境变量，格式错误时返回错误
    pub fn parse_optional<T>(key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match Self::get_env_optional(key) {
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|err| {
                StageFlowError::Config(format!("environment variable `{key}`=`{raw}`: {err}"))
            }),
            None => Ok(None),
        }
    }

    /// 检查是否启用调试模式
    pub fn is_debug_mode() -> bool {
        env::var("STAGEFLOW_DEBUG").is_ok()
    }
}

/// 宏：简化环境变量获取
#[macro_export]
macro_rules! env_var {
    ($key:expr) => {
        $crate::config::EnvConfig::get_env($key)
    };
}
