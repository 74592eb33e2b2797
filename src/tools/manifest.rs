use serde::{Deserialize, Serialize};

use crate::schema::{InputSchema, PropertySchema};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    CodeHosting,
    WebPage,
    Document,
    SocialProfile,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 4] = [
        ToolCategory::CodeHosting,
        ToolCategory::WebPage,
        ToolCategory::Document,
        ToolCategory::SocialProfile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::CodeHosting => "code_hosting",
            ToolCategory::WebPage => "web_page",
            ToolCategory::Document => "document",
            ToolCategory::SocialProfile => "social_profile",
        }
    }

    /// 类目级默认执行配置，单个工具的配置会覆盖这里
    pub fn default_overrides(&self) -> ToolConfigOverride {
        match self {
            ToolCategory::CodeHosting => ToolConfigOverride {
                timeout_ms: Some(15_000),
                cache: Some(true),
                ..ToolConfigOverride::default()
            },
            ToolCategory::WebPage => ToolConfigOverride {
                max_retries: Some(2),
                ..ToolConfigOverride::default()
            },
            ToolCategory::Document => ToolConfigOverride {
                timeout_ms: Some(60_000),
                max_retries: Some(1),
                parallel: Some(false),
                ..ToolConfigOverride::default()
            },
            ToolCategory::SocialProfile => ToolConfigOverride {
                timeout_ms: Some(20_000),
                max_retries: Some(2),
                ..ToolConfigOverride::default()
            },
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 自动选择工具时使用的输入特征
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Trigger {
    /// 输入中出现的站点域名，例如 `github.com`
    Domain(String),
    /// 输入中出现的服务名，例如 `linkedin`
    Keyword(String),
    /// 输入中出现任意 http(s) 链接
    AnyUrl,
    /// 输入中出现带该扩展名的文件
    FileExtension(String),
}

impl Trigger {
    /// 域名和服务名属于强匹配，其余是模式匹配
    pub fn is_specific(&self) -> bool {
        matches!(self, Trigger::Domain(_) | Trigger::Keyword(_))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolConfigOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolMetadata {
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub estimated_time_ms: u64,
}

impl Default for ToolMetadata {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            tags: Vec::new(),
            estimated_time_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub priority: i32,
    pub input_schema: InputSchema,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub config: ToolConfigOverride,
    #[serde(default)]
    pub metadata: ToolMetadata,
}

impl ToolDefinition {
    pub fn builder(name: impl Into<String>, category: ToolCategory) -> ToolDefinitionBuilder {
        ToolDefinitionBuilder::new(name, category)
    }
}

#[derive(Clone, Debug)]
pub struct ToolDefinitionBuilder {
    definition: ToolDefinition,
}

impl ToolDefinitionBuilder {
    pub fn new(name: impl Into<String>, category: ToolCategory) -> Self {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: String::new(),
                category,
                priority: 5,
                input_schema: InputSchema::new(),
                triggers: Vec::new(),
                config: ToolConfigOverride::default(),
                metadata: ToolMetadata::default(),
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = description.into();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.definition.priority = priority;
        self
    }

    pub fn required(mut self, name: impl Into<String>, property: PropertySchema) -> Self {
        self.definition.input_schema = self.definition.input_schema.required(name, property);
        self
    }

    pub fn optional(mut self, name: impl Into<String>, property: PropertySchema) -> Self {
        self.definition.input_schema = self.definition.input_schema.optional(name, property);
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.definition.triggers.push(trigger);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.definition.metadata.tags.push(tag.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.definition.metadata.version = version.into();
        self
    }

    pub fn estimated_time_ms(mut self, estimated: u64) -> Self {
        self.definition.metadata.estimated_time_ms = estimated;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.definition.config.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.definition.config.max_retries = Some(retries);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.definition.config.parallel = Some(parallel);
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.definition.config.cache = Some(cache);
        self
    }

    pub fn build(self) -> ToolDefinition {
        self.definition
    }
}
