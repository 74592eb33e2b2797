use serde_json::json;

use super::manifest::{ToolCategory, ToolDefinition, Trigger};
use super::registry::ToolRegistry;
use crate::schema::PropertySchema;

pub const ANALYZE_GITHUB: &str = "analyze_github";
pub const SCRAPE_WEBPAGE: &str = "scrape_webpage";
pub const PARSE_DOCUMENT: &str = "parse_document";
pub const EXTRACT_LINKEDIN: &str = "extract_linkedin";

pub fn analyze_github() -> ToolDefinition {
    ToolDefinition::builder(ANALYZE_GITHUB, ToolCategory::CodeHosting)
        .description("Look up a GitHub user profile with public repositories, languages and activity")
        .priority(9)
        .required(
            "username_or_url",
            PropertySchema::string().with_description("GitHub username or profile URL"),
        )
        .optional(
            "include_repos",
            PropertySchema::boolean().with_default(json!(true)),
        )
        .trigger(Trigger::Domain("github.com".into()))
        .trigger(Trigger::Keyword("github".into()))
        .tag("code")
        .tag("open-source")
        .tag("developer")
        .estimated_time_ms(3_000)
        .build()
}

pub fn scrape_webpage() -> ToolDefinition {
    ToolDefinition::builder(SCRAPE_WEBPAGE, ToolCategory::WebPage)
        .description("Fetch a public web page and extract its title, description and readable text")
        .priority(6)
        .required("url", PropertySchema::string().with_description("Page URL"))
        .optional(
            "extract_mode",
            PropertySchema::string()
                .with_enum(["summary", "full", "links"])
                .with_default(json!("summary")),
        )
        .trigger(Trigger::AnyUrl)
        .tag("portfolio")
        .tag("blog")
        .estimated_time_ms(5_000)
        .build()
}

pub fn parse_document() -> ToolDefinition {
    ToolDefinition::builder(PARSE_DOCUMENT, ToolCategory::Document)
        .description("Parse an uploaded resume or document into structured profile sections")
        .priority(8)
        .required(
            "file_type",
            PropertySchema::string().with_enum(["pdf", "docx", "txt", "markdown"]),
        )
        .optional(
            "file_data",
            PropertySchema::string().with_description("Base64 encoded file content"),
        )
        .optional("file_name", PropertySchema::string())
        .trigger(Trigger::FileExtension("pdf".into()))
        .trigger(Trigger::FileExtension("docx".into()))
        .trigger(Trigger::FileExtension("doc".into()))
        .trigger(Trigger::FileExtension("txt".into()))
        .trigger(Trigger::FileExtension("md".into()))
        .tag("resume")
        .tag("cv")
        .estimated_time_ms(10_000)
        .build()
}

pub fn extract_linkedin() -> ToolDefinition {
    ToolDefinition::builder(EXTRACT_LINKEDIN, ToolCategory::SocialProfile)
        .description("Extract work history, education and skills from a public LinkedIn profile")
        .priority(8)
        .required("profile_url", PropertySchema::string())
        .optional(
            "platform",
            PropertySchema::string().with_enum(["linkedin"]),
        )
        .trigger(Trigger::Domain("linkedin.com".into()))
        .trigger(Trigger::Keyword("linkedin".into()))
        .tag("career")
        .tag("professional-network")
        .estimated_time_ms(8_000)
        .build()
}

pub fn builtin_definitions() -> Vec<ToolDefinition> {
    vec![
        analyze_github(),
        scrape_webpage(),
        parse_document(),
        extract_linkedin(),
    ]
}

/// 内置工具目录；启用 `http-tools` 时为 GitHub 与网页工具绑定真实执行器
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for definition in builtin_definitions() {
        registry.register(definition);
    }

    #[cfg(feature = "http-tools")]
    super::http::bind_http_tools(&mut registry);

    registry
}
