use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::manifest::ToolCategory;
use crate::error::{Result, StageFlowError};

/// 按工具类目区分的调用参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ToolParams {
    CodeHosting(CodeHostingParams),
    WebPage(WebPageParams),
    Document(DocumentParams),
    SocialProfile(SocialProfileParams),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CodeHostingParams {
    pub username_or_url: String,
    #[serde(default)]
    pub include_repos: bool,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    #[default]
    Summary,
    Full,
    Links,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WebPageParams {
    pub url: String,
    #[serde(default)]
    pub extract_mode: ExtractMode,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Docx,
    Txt,
    Markdown,
}

impl DocumentType {
    pub fn from_extension(name: &str) -> Option<Self> {
        let extension = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(DocumentType::Pdf),
            "docx" | "doc" => Some(DocumentType::Docx),
            "txt" => Some(DocumentType::Txt),
            "md" | "markdown" => Some(DocumentType::Markdown),
            _ => None,
        }
    }

    /// 根据文件头判断类型
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(DocumentType::Pdf)
        } else if bytes.starts_with(b"PK\x03\x04") {
            Some(DocumentType::Docx)
        } else if !bytes.is_empty() && std::str::from_utf8(bytes).is_ok() {
            Some(DocumentType::Txt)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentParams {
    /// base64 内容，可带 `data:...;base64,` 前缀
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<DocumentType>,
}

impl DocumentParams {
    pub fn decode_data(&self) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.file_data.as_deref() else {
            return Ok(None);
        };
        let payload = raw.split_once("base64,").map(|(_, data)| data).unwrap_or(raw);
        STANDARD
            .decode(payload.trim())
            .map(Some)
            .map_err(|err| StageFlowError::Serialization(format!("invalid base64 document: {err}")))
    }

    /// 显式类型优先，其次文件头，最后扩展名
    pub fn resolved_type(&self) -> Option<DocumentType> {
        if self.file_type.is_some() {
            return self.file_type;
        }
        if let Ok(Some(bytes)) = self.decode_data() {
            if let Some(kind) = DocumentType::sniff(&bytes) {
                return Some(kind);
            }
        }
        self.file_name.as_deref().and_then(DocumentType::from_extension)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    #[default]
    Linkedin,
    Twitter,
    Other,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SocialProfileParams {
    pub profile_url: String,
    #[serde(default)]
    pub platform: SocialPlatform,
}

impl ToolParams {
    pub fn category(&self) -> ToolCategory {
        match self {
            ToolParams::CodeHosting(_) => ToolCategory::CodeHosting,
            ToolParams::WebPage(_) => ToolCategory::WebPage,
            ToolParams::Document(_) => ToolCategory::Document,
            ToolParams::SocialProfile(_) => ToolCategory::SocialProfile,
        }
    }

    /// 去掉类目标签后的参数对象，用于契约校验和缓存键
    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            ToolParams::CodeHosting(params) => serde_json::to_value(params)?,
            ToolParams::WebPage(params) => serde_json::to_value(params)?,
            ToolParams::Document(params) => {
                let mut resolved = params.clone();
                resolved.file_type = params.resolved_type();
                serde_json::to_value(resolved)?
            }
            ToolParams::SocialProfile(params) => serde_json::to_value(params)?,
        };
        Ok(value)
    }

    pub fn from_value(category: ToolCategory, value: Value) -> Result<Self> {
        let params = match category {
            ToolCategory::CodeHosting => ToolParams::CodeHosting(serde_json::from_value(value)?),
            ToolCategory::WebPage => ToolParams::WebPage(serde_json::from_value(value)?),
            ToolCategory::Document => ToolParams::Document(serde_json::from_value(value)?),
            ToolCategory::SocialProfile => {
                ToolParams::SocialProfile(serde_json::from_value(value)?)
            }
        };
        Ok(params)
    }

    /// 参数指向的目标（链接、用户名或文件名）
    pub fn target(&self) -> Option<&str> {
        match self {
            ToolParams::CodeHosting(params) => Some(&params.username_or_url),
            ToolParams::WebPage(params) => Some(&params.url),
            ToolParams::Document(params) => params.file_name.as_deref(),
            ToolParams::SocialProfile(params) => Some(&params.profile_url),
        }
    }
}
