/// 流程相关的常量定义

/// 阶段标识
pub mod stages {
    pub const WELCOME: &str = "welcome";
    pub const INFO_COLLECTION: &str = "info_collection";
    pub const PAGE_DESIGN: &str = "page_design";
    pub const CODE_GENERATION: &str = "code_generation";

    /// 旧版本使用的起始阶段标签
    pub const LEGACY_START: &str = "start";
}

/// 内置 agent 名称
pub mod agents {
    pub const WELCOME: &str = "welcome";
    pub const INFO_COLLECTION: &str = "info_collection";
    pub const PROMPT_OUTPUT: &str = "prompt_output";
    pub const CODING: &str = "coding";
}

/// 各阶段进入时的进度百分比
pub mod progress {
    pub const WELCOME: u8 = 10;
    pub const INFO_COLLECTION: u8 = 40;
    pub const PAGE_DESIGN: u8 = 70;
    pub const CODE_GENERATION: u8 = 90;
    pub const COMPLETE: u8 = 100;
}

/// 片段 metadata 字段名
pub mod fields {
    pub const ERROR: &str = "error";
    pub const ERROR_TYPE: &str = "error_type";
    pub const AGENT: &str = "agent";
    pub const TOOLS: &str = "tools";
    pub const DESIGN: &str = "design";
    pub const HTML_LENGTH: &str = "html_length";
    pub const COMPLETED_STAGES: &str = "completed_stages";
}

/// 单次请求内片段通道的缓冲大小
pub const FRAGMENT_BUFFER: usize = 32;
