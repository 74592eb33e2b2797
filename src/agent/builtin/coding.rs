use std::fmt::Write as _;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::design::derive_design;
use crate::agent::{AgentInput, FragmentSink, StageAgent};
use crate::error::Result;
use crate::flow::constants::{agents, fields};
use crate::protocol::SystemState;
use crate::session::{CollectedData, PageDesign, Session};

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

const LINK_SCHEMES: [&str; 3] = ["http://", "https://", "mailto:"];

/// 只有 http(s) 和 mailto 链接可以进入 href，返回转义后的地址
fn safe_href(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let lower = trimmed.to_ascii_lowercase();
    LINK_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme))
        .then(|| escape(trimmed))
}

fn item_title(item: &Value) -> Option<String> {
    ["name", "title", "company", "school", "degree"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .map(escape)
}

fn item_list(out: &mut String, heading: &str, items: &[Value]) {
    let _ = writeln!(out, "<section class=\"{}\"><h2>{}</h2><ul>", heading.to_lowercase(), heading);
    for item in items {
        let Some(title) = item_title(item) else {
            continue;
        };
        let description = item
            .get("description")
            .and_then(Value::as_str)
            .map(escape)
            .unwrap_or_default();
        match item.get("url").and_then(Value::as_str).and_then(safe_href) {
            Some(href) => {
                let _ = writeln!(out, "<li><a href=\"{href}\">{title}</a> {description}</li>");
            }
            None => {
                let _ = writeln!(out, "<li><strong>{title}</strong> {description}</li>");
            }
        }
    }
    out.push_str("</ul></section>\n");
}

/// 渲染静态页面
pub fn render_page(design: &PageDesign, data: &CollectedData) -> String {
    let name = escape(data.personal.name.as_deref().unwrap_or("Hello"));
    let headline = escape(design.headline.as_deref().unwrap_or_default());
    let theme = &design.theme;

    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">");
    let _ = writeln!(out, "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">");
    let _ = writeln!(out, "<title>{name}</title>");
    let _ = writeln!(
        out,
        "<style>:root{{--primary:{};--accent:{};--bg:{}}}body{{font-family:{};background:var(--bg);margin:0 auto;max-width:960px;padding:2rem}}h1,h2{{color:var(--primary)}}a{{color:var(--accent)}}</style>",
        theme.primary_color, theme.accent_color, theme.background_color, theme.font_family
    );
    let _ = writeln!(out, "</head>\n<body class=\"layout-{}\">", escape(&design.layout));

    for section in &design.sections {
        match section.as_str() {
            "hero" => {
                let _ = writeln!(out, "<header class=\"hero\"><h1>{name}</h1><p>{headline}</p></header>");
            }
            "about" => {
                let about = data
                    .personal
                    .bio
                    .as_deref()
                    .or(data.professional.summary.as_deref())
                    .map(escape)
                    .unwrap_or_default();
                let _ = writeln!(out, "<section class=\"about\"><h2>About</h2><p>{about}</p></section>");
            }
            "projects" => item_list(&mut out, "Projects", &data.projects),
            "experience" => item_list(&mut out, "Experience", &data.experience),
            "education" => item_list(&mut out, "Education", &data.education),
            "achievements" => {
                let items: Vec<Value> = data
                    .achievements
                    .iter()
                    .chain(&data.certifications)
                    .cloned()
                    .collect();
                item_list(&mut out, "Achievements", &items);
            }
            "skills" => {
                let skills: Vec<String> = data.professional.skills.iter().map(|skill| escape(skill)).collect();
                let _ = writeln!(
                    out,
                    "<section class=\"skills\"><h2>Skills</h2><p>{}</p></section>",
                    skills.join(" · ")
                );
            }
            "contact" => {
                out.push_str("<footer class=\"contact\">");
                if let Some(email) = &data.personal.email {
                    let email = escape(email);
                    let _ = write!(out, "<a href=\"mailto:{email}\">{email}</a> ");
                }
                for link in data.sources.iter().chain(data.personal.website.iter()) {
                    match safe_href(link) {
                        Some(href) => {
                            let _ = write!(out, "<a href=\"{href}\">{href}</a> ");
                        }
                        None => {
                            let _ = write!(out, "<span>{}</span> ", escape(link));
                        }
                    }
                }
                out.push_str("</footer>\n");
            }
            _ => {}
        }
    }

    out.push_str("</body>\n</html>\n");
    out
}

/// 生成阶段：把设计和资料渲染成页面
#[derive(Clone, Copy, Debug, Default)]
pub struct CodingAgent;

impl CodingAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageAgent for CodingAgent {
    fn name(&self) -> &str {
        agents::CODING
    }

    async fn process(&self, _input: &AgentInput, session: &mut Session, sink: &FragmentSink) -> Result<()> {
        let design = match &session.artifacts.page_design {
            Some(design) => design.clone(),
            None => {
                let design = derive_design(session);
                session.artifacts.page_design = Some(design.clone());
                design
            }
        };

        sink.reply("Generating your page...").await?;
        let html = render_page(&design, &session.collected_data);
        info!(session_id = %session.id, bytes = html.len(), "page generated");

        let metadata = json!({ (fields::HTML_LENGTH): html.len() });
        session.artifacts.html = Some(html);
        sink.finish("Your page is ready.", SystemState::advance().with_metadata(metadata))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_page_escapes_user_text() {
        let mut session = Session::new("c");
        session.collected_data.personal.name = Some("<script>alert(1)</script>".into());
        session
            .collected_data
            .projects
            .push(json!({"name": "hello & world", "url": "https://github.com/octocat/hello"}));
        let design = derive_design(&session);

        let html = render_page(&design, &session.collected_data);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("hello &amp; world"));
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn script_urls_never_become_links() {
        let mut session = Session::new("c");
        session.collected_data.personal.name = Some("Octo".into());
        session
            .collected_data
            .projects
            .push(json!({"name": "trap", "url": " JavaScript:alert(1)"}));
        session.collected_data.sources.push("javascript:alert(2)".into());
        session.collected_data.sources.push("https://octo.dev".into());
        let mut design = derive_design(&session);
        design.sections = vec!["projects".into(), "contact".into()];

        let html = render_page(&design, &session.collected_data);
        assert!(!html.to_lowercase().contains("href=\"javascript"));
        assert!(!html.to_lowercase().contains("href=\" javascript"));
        assert!(html.contains("<strong>trap</strong>"));
        assert!(html.contains("<span>javascript:alert(2)</span>"));
        assert!(html.contains("<a href=\"https://octo.dev\">"));
    }
}
