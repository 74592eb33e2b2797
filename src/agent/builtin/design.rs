use async_trait::async_trait;
use serde_json::json;

use crate::agent::{AgentInput, FragmentSink, StageAgent};
use crate::error::Result;
use crate::flow::constants::{agents, fields};
use crate::protocol::SystemState;
use crate::session::{PageDesign, Personalization, Session, Theme};
use crate::tools::Role;

fn layout_for(role: Option<Role>) -> &'static str {
    match role {
        Some(Role::Developer) => "portfolio-grid",
        Some(Role::Designer) => "gallery",
        Some(Role::ProductManager) => "case-study",
        Some(Role::Marketer) => "landing",
        Some(Role::Student) => "resume",
        Some(Role::Researcher) => "publication-list",
        Some(Role::Other) | None => "single-page",
    }
}

fn theme_for(personalization: &Personalization) -> Theme {
    let (primary, accent, background, font) = match personalization.style.to_lowercase().as_str() {
        "minimal" => ("#111111", "#555555", "#ffffff", "Inter, sans-serif"),
        "creative" => ("#6c2bd9", "#ff6f61", "#fdf8f2", "Poppins, sans-serif"),
        "classic" => ("#1f3a5f", "#b08d57", "#fbfaf7", "Georgia, serif"),
        _ => ("#2563eb", "#14b8a6", "#f8fafc", "system-ui, sans-serif"),
    };
    Theme {
        primary_color: primary.to_string(),
        accent_color: accent.to_string(),
        background_color: background.to_string(),
        font_family: font.to_string(),
    }
}

/// 由个性化设置与已收集资料推导页面设计
pub fn derive_design(session: &Session) -> PageDesign {
    let data = &session.collected_data;
    let mut sections = vec!["hero".to_string(), "about".to_string()];
    let mut optional = |present: bool, name: &str| {
        if present {
            sections.push(name.to_string());
        }
    };
    optional(!data.projects.is_empty(), "projects");
    optional(!data.experience.is_empty(), "experience");
    optional(!data.professional.skills.is_empty(), "skills");
    optional(!data.education.is_empty(), "education");
    optional(
        !data.achievements.is_empty() || !data.certifications.is_empty(),
        "achievements",
    );
    sections.push("contact".to_string());

    let headline = data
        .professional
        .title
        .clone()
        .or_else(|| session.personalization.profession.clone())
        .or_else(|| session.intent.role.map(|role| role.as_str().replace('_', " ")));

    PageDesign {
        layout: layout_for(session.intent.role).to_string(),
        theme: theme_for(&session.personalization),
        sections,
        tone: session.personalization.tone.clone(),
        headline,
    }
}

/// 设计阶段：产出页面结构与主题
#[derive(Clone, Copy, Debug, Default)]
pub struct PromptOutputAgent;

impl PromptOutputAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageAgent for PromptOutputAgent {
    fn name(&self) -> &str {
        agents::PROMPT_OUTPUT
    }

    async fn process(&self, _input: &AgentInput, session: &mut Session, sink: &FragmentSink) -> Result<()> {
        let design = derive_design(session);
        sink.thinking(
            "Sketching the page layout...",
            format!("layout={} sections={}", design.layout, design.sections.join(",")),
        )
        .await?;

        let summary = format!(
            "I'll use a {} layout with {} sections: {}.",
            design.layout,
            design.sections.len(),
            design.sections.join(", ")
        );
        let metadata = json!({ (fields::DESIGN): design });
        session.artifacts.page_design = Some(design);

        sink.finish(
            summary,
            SystemState::advance()
                .with_next_agent(agents::CODING)
                .with_metadata(metadata),
        )
        .await
    }
}
