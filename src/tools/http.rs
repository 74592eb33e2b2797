//! 基于 HTTP 的内置工具执行器（`http-tools` 特性）

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::builtin::{ANALYZE_GITHUB, SCRAPE_WEBPAGE};
use super::params::{ExtractMode, ToolParams};
use super::registry::ToolRegistry;
use super::tool::{Tool, ToolOutput};
use crate::error::{Result, StageFlowError};

const USER_AGENT: &str = concat!("stageflow/", env!("CARGO_PKG_VERSION"));
const SUMMARY_CHARS: usize = 1_500;

fn build_client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|err| {
            warn!(error = %err, "falling back to default http client");
            Client::new()
        })
}

/// reqwest 错误转成带分类关键字的工具错误
fn transport_error(tool: &str, err: reqwest::Error) -> StageFlowError {
    let message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() || err.is_request() {
        format!("network error: {err}")
    } else {
        err.to_string()
    };
    StageFlowError::tool_failed(tool, message)
}

fn status_error(tool: &str, status: StatusCode) -> StageFlowError {
    let message = match status {
        StatusCode::NOT_FOUND => "resource not found (404)".to_string(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("permission denied ({})", status.as_u16())
        }
        StatusCode::TOO_MANY_REQUESTS => "rate limit exceeded (429)".to_string(),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            format!("upstream timeout ({})", status.as_u16())
        }
        other if other.is_server_error() => format!("network error: upstream returned {other}"),
        other => format!("unexpected status {other}"),
    };
    StageFlowError::tool_failed(tool, message)
}

pub struct GithubTool {
    client: Client,
    api_base: String,
}

impl Default for GithubTool {
    fn default() -> Self {
        Self::new("https://api.github.com")
    }
}

impl GithubTool {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: build_client(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn username(input: &str) -> Option<String> {
        let trimmed = input.trim().trim_end_matches('/');
        let candidate = match trimmed.rsplit_once("github.com/") {
            Some((_, rest)) => rest.split('/').next().unwrap_or_default(),
            None => trimmed.trim_start_matches('@'),
        };
        let valid = !candidate.is_empty()
            && candidate.len() <= 39
            && candidate.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        valid.then(|| candidate.to_string())
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|err| transport_error(ANALYZE_GITHUB, err))?;
        if !response.status().is_success() {
            return Err(status_error(ANALYZE_GITHUB, response.status()));
        }
        response
            .json::<Value>()
            .await
            .map_err(|err| StageFlowError::tool_failed(ANALYZE_GITHUB, format!("invalid response body: {err}")))
    }
}

#[async_trait]
impl Tool for GithubTool {
    fn name(&self) -> &str {
        ANALYZE_GITHUB
    }

    async fn call(&self, params: &ToolParams) -> Result<ToolOutput> {
        let ToolParams::CodeHosting(params) = params else {
            return Err(StageFlowError::tool_failed(ANALYZE_GITHUB, "invalid parameters for github lookup"));
        };
        let username = Self::username(&params.username_or_url).ok_or_else(|| {
            StageFlowError::tool_failed(
                ANALYZE_GITHUB,
                format!("invalid github username `{}`", params.username_or_url),
            )
        })?;

        debug!(%username, "looking up github profile");
        let profile = self.get_json(&format!("{}/users/{username}", self.api_base)).await?;

        let mut output = json!({
            "username": username,
            "name": profile.get("name").cloned().unwrap_or(Value::Null),
            "bio": profile.get("bio").cloned().unwrap_or(Value::Null),
            "avatar_url": profile.get("avatar_url").cloned().unwrap_or(Value::Null),
            "location": profile.get("location").cloned().unwrap_or(Value::Null),
            "blog": profile.get("blog").cloned().unwrap_or(Value::Null),
            "followers": profile.get("followers").cloned().unwrap_or(json!(0)),
            "public_repos": profile.get("public_repos").cloned().unwrap_or(json!(0)),
        });

        let mut confidence = 0.85;
        if params.include_repos {
            let repos = self
                .get_json(&format!(
                    "{}/users/{username}/repos?sort=updated&per_page=10",
                    self.api_base
                ))
                .await?;
            let summary: Vec<Value> = repos
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter(|repo| !repo["fork"].as_bool().unwrap_or(false))
                        .map(|repo| {
                            json!({
                                "name": repo["name"],
                                "description": repo["description"],
                                "language": repo["language"],
                                "stars": repo["stargazers_count"],
                                "url": repo["html_url"],
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            if !summary.is_empty() {
                confidence = 0.95;
            }
            output["repositories"] = Value::Array(summary);
        }

        Ok(ToolOutput::new(output, confidence)
            .with_metadata(json!({ "source": "github_api", "api_base": self.api_base })))
    }
}

pub struct WebPageTool {
    client: Client,
}

impl Default for WebPageTool {
    fn default() -> Self {
        Self {
            client: build_client(),
        }
    }
}

fn title_regex() -> &'static Regex {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    TITLE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"))
}

fn description_regex() -> &'static Regex {
    static DESCRIPTION: OnceLock<Regex> = OnceLock::new();
    DESCRIPTION.get_or_init(|| {
        Regex::new(r#"(?is)<meta[^>]+name=["']description["'][^>]+content=["']([^"']*)["']"#)
            .expect("valid description regex")
    })
}

fn link_regex() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(r#"(?i)href=["'](https?://[^"']+)["']"#).expect("valid link regex"))
}

const TEXT_WIDTH: usize = 120;

impl WebPageTool {
    /// 渲染成纯文本，实体解码，注释和脚本丢弃，空白折叠成单个空格
    fn readable_text(html: &str) -> String {
        let rendered = html2text::from_read(html.as_bytes(), TEXT_WIDTH).unwrap_or_else(|err| {
            debug!(error = %err, "html render failed, page treated as empty");
            String::new()
        });
        rendered.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[async_trait]
impl Tool for WebPageTool {
    fn name(&self) -> &str {
        SCRAPE_WEBPAGE
    }

    async fn call(&self, params: &ToolParams) -> Result<ToolOutput> {
        let ToolParams::WebPage(params) = params else {
            return Err(StageFlowError::tool_failed(SCRAPE_WEBPAGE, "invalid parameters for web page"));
        };

        let response = self
            .client
            .get(&params.url)
            .send()
            .await
            .map_err(|err| transport_error(SCRAPE_WEBPAGE, err))?;
        if !response.status().is_success() {
            return Err(status_error(SCRAPE_WEBPAGE, response.status()));
        }
        let html = response
            .text()
            .await
            .map_err(|err| transport_error(SCRAPE_WEBPAGE, err))?;

        let title = title_regex()
            .captures(&html)
            .map(|caps| caps[1].trim().to_string());
        let description = description_regex()
            .captures(&html)
            .map(|caps| caps[1].trim().to_string());
        let text = Self::readable_text(&html);

        let mut data = json!({
            "url": params.url,
            "title": title,
            "description": description,
        });
        match params.extract_mode {
            ExtractMode::Summary => {
                data["content"] = json!(text.chars().take(SUMMARY_CHARS).collect::<String>());
            }
            ExtractMode::Full => data["content"] = json!(text),
            ExtractMode::Links => {
                let links: Vec<&str> = link_regex()
                    .captures_iter(&html)
                    .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
                    .collect();
                data["links"] = json!(links);
            }
        }

        let confidence = if title.is_some() && !text.is_empty() { 0.8 } else { 0.5 };
        let mut output = ToolOutput::new(data, confidence)
            .with_metadata(json!({ "source": "http", "bytes": html.len() }));
        if text.is_empty() {
            output = output.with_suggestion("The page has little readable text; it may be rendered client-side");
        }
        Ok(output)
    }
}

pub fn bind_http_tools(registry: &mut ToolRegistry) {
    let tools: [Arc<dyn Tool>; 2] = [Arc::new(GithubTool::default()), Arc::new(WebPageTool::default())];
    for tool in tools {
        if let Err(err) = registry.bind(tool) {
            warn!(error = %err, "failed to bind http tool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_username_is_extracted_from_urls() {
        assert_eq!(GithubTool::username("https://github.com/octocat/"), Some("octocat".into()));
        assert_eq!(GithubTool::username("@octocat"), Some("octocat".into()));
        assert_eq!(GithubTool::username("not a user"), None);
    }

    #[test]
    fn readable_text_decodes_entities_and_drops_markup() {
        let html = "<html><head><title>t</title><script>track()</script></head>\
                    <body><!-- draft note --><p>Fish &amp; chips</p>\
                    <p>open   daily</p></body></html>";
        let text = WebPageTool::readable_text(html);
        assert!(text.contains("Fish & chips"), "{text}");
        assert!(text.contains("open daily"), "{text}");
        assert!(!text.contains("&amp;"));
        assert!(!text.contains("draft note"));
        assert!(!text.contains('<'));
    }
}
