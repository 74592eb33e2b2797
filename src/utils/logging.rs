use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::EnvConfig;

const FILTER_VAR: &str = "STAGEFLOW_LOG";
const DEFAULT_FILTER: &str = "stageflow=info,warn";
const DEBUG_FILTER: &str = "stageflow=debug,info";

/// 日志配置
///
/// 过滤规则按 `STAGEFLOW_LOG` > `RUST_LOG` > 内置默认 取值；
/// `STAGEFLOW_DEBUG` 打开时默认规则切到 debug，并输出源码位置和线程。
///
/// ```no_run
/// use stageflow::LoggingConfig;
///
/// LoggingConfig::from_env().install();
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub filter: String,
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::resolve(None, false)
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let explicit = EnvConfig::get_env_optional(FILTER_VAR)
            .or_else(|| EnvConfig::get_env_optional("RUST_LOG"));
        Self::resolve(explicit, EnvConfig::is_debug_mode())
    }

    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            verbose: false,
        }
    }

    fn resolve(explicit: Option<String>, verbose: bool) -> Self {
        let fallback = if verbose { DEBUG_FILTER } else { DEFAULT_FILTER };
        let filter = explicit.unwrap_or_else(|| fallback.to_string());
        Self { filter, verbose }
    }

    /// 安装全局 subscriber；宿主进程已经装过时返回 false
    pub fn install(&self) -> bool {
        let env_filter = EnvFilter::try_new(&self.filter).unwrap_or_else(|err| {
            eprintln!("invalid log filter `{}` ({err}), using `{DEFAULT_FILTER}`", self.filter);
            EnvFilter::new(DEFAULT_FILTER)
        });

        let fmt_layer = fmt::layer()
            .with_target(self.verbose)
            .with_file(self.verbose)
            .with_line_number(self.verbose)
            .with_thread_ids(self.verbose);

        let installed = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!(filter = %self.filter, verbose = self.verbose, "logging installed");
        }
        installed
    }

    pub fn init() {
        Self::from_env().install();
    }

    /// 测试和嵌入场景使用：忽略环境变量
    pub fn init_with_filter(filter: &str) {
        Self::with_filter(filter).install();
    }
}

/// 记录一个 `StageFlowError`，附带它的类别；可追加会话等上下文字段
#[macro_export]
macro_rules! log_error {
    ($err:expr) => {
        tracing::error!(error = %$err, error_type = $err.kind(), "request failed")
    };
    ($err:expr, $($key:tt = $value:expr),+) => {
        tracing::error!(error = %$err, error_type = $err.kind(), $($key = $value),+, "request failed")
    };
}

/// 带结构化字段的警告，消息必须是字面量
#[macro_export]
macro_rules! log_warn {
    ($msg:literal) => {
        tracing::warn!($msg)
    };
    ($msg:literal, $($key:tt = $value:expr),+) => {
        tracing::warn!($($key = $value),+, $msg)
    };
}
