use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::agent::{AgentInput, FragmentSink, InteractionOutcome, StageAgent};
use crate::error::Result;
use crate::flow::constants::{agents, fields};
use crate::protocol::{
    Intent, InteractionElement, InteractionRequest, InteractionType, SystemState, UserInteraction,
};
use crate::session::{CollectedData, Session};
use crate::tools::{
    MatchStrength, SelectionRequest, ToolCall, ToolCategory, ToolDispatcher, ToolExecutionResult,
    ToolSelector, ToolSuggestion,
};

const SKIP_WORDS: &[&str] = &["skip", "done", "next", "continue", "that's all", "nothing else"];
const FORM_FIELDS: [&str; 4] = ["github", "website", "linkedin", "resume"];

/// 资料收集阶段：从用户给出的链接和文件中调用工具提取资料
pub struct InfoCollectionAgent {
    dispatcher: ToolDispatcher,
    selector: ToolSelector,
    max_tools: usize,
}

impl InfoCollectionAgent {
    pub fn new(dispatcher: ToolDispatcher, max_tools: usize) -> Self {
        Self {
            dispatcher,
            selector: ToolSelector::new(),
            max_tools: max_tools.max(1),
        }
    }

    /// 只保留能直接调用的建议；同一目标只保留得分最高的工具
    fn actionable(suggestions: Vec<ToolSuggestion>) -> Vec<ToolCall> {
        let mut seen = HashSet::new();
        suggestions
            .into_iter()
            .filter(|suggestion| suggestion.matched != MatchStrength::None)
            .filter_map(|suggestion| {
                let params = suggestion.params?;
                let target = params.target().map(str::to_lowercase);
                if let Some(target) = target {
                    if !seen.insert(target) {
                        return None;
                    }
                }
                Some(ToolCall::new(suggestion.name, params))
            })
            .collect()
    }

    fn wants_to_skip(message: &str) -> bool {
        let lower = message.trim().to_lowercase();
        SKIP_WORDS.iter().any(|word| lower == *word || lower.starts_with(&format!("{word} ")))
    }

    fn sources_form() -> InteractionRequest {
        InteractionRequest::new(InteractionType::Form)
            .titled("Where can I learn about your work?")
            .described("Share any links you have. Leave the rest empty.")
            .element(InteractionElement::input("github", "GitHub profile").with_placeholder("https://github.com/you"))
            .element(InteractionElement::input("website", "Personal website or blog").with_placeholder("https://you.dev"))
            .element(InteractionElement::input("linkedin", "LinkedIn profile").with_placeholder("https://linkedin.com/in/you"))
            .element(InteractionElement::input("resume", "Resume file name").with_placeholder("resume.pdf"))
            .element(InteractionElement::button("skip", "Continue without sources", "skip"))
    }

    fn summary(result: &ToolExecutionResult) -> Value {
        json!({
            "tool": result.tool_name,
            "success": result.success,
            "error_type": result.error_type,
            "confidence": result.confidence,
            "data_quality": result.data_quality,
            "attempts": result.attempts,
        })
    }

    async fn ask_for_sources(&self, sink: &FragmentSink, text: &str) -> Result<()> {
        sink.ask(text, Self::sources_form(), SystemState::park(Intent::Collecting))
            .await
    }

    async fn advance(&self, sink: &FragmentSink, text: &str, metadata: Value) -> Result<()> {
        sink.finish(
            text,
            SystemState::advance()
                .with_next_agent(agents::PROMPT_OUTPUT)
                .with_metadata(metadata),
        )
        .await
    }
}

/// 把一次成功的工具结果映射到会话资料
pub fn collected_from_tool(category: ToolCategory, data: &Value) -> CollectedData {
    let text = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let mut collected = CollectedData::default();
    match category {
        ToolCategory::CodeHosting => {
            collected.personal.name = text("name").or_else(|| text("username"));
            collected.personal.bio = text("bio");
            collected.personal.location = text("location");
            collected.personal.avatar_url = text("avatar_url");
            collected.personal.website = text("blog");
            if let Some(repos) = data.get("repositories").and_then(Value::as_array) {
                collected.projects = repos.clone();
                let mut seen = HashSet::new();
                collected.professional.skills = repos
                    .iter()
                    .filter_map(|repo| repo.get("language").and_then(Value::as_str))
                    .filter(|language| seen.insert(*language))
                    .map(str::to_string)
                    .collect();
            }
        }
        ToolCategory::WebPage => {
            collected.personal.website = text("url");
            collected.professional.summary = text("description");
        }
        ToolCategory::Document | ToolCategory::SocialProfile => {
            // 解析器按会话资料的结构返回，缺失的部分保持为空
            match serde_json::from_value::<CollectedData>(data.clone()) {
                Ok(parsed) => collected = parsed,
                Err(err) => debug!(%category, error = %err, "tool data does not match profile shape"),
            }
            if collected.professional.title.is_none() {
                collected.professional.title = text("headline");
            }
        }
    }
    collected
}

#[async_trait]
impl StageAgent for InfoCollectionAgent {
    fn name(&self) -> &str {
        agents::INFO_COLLECTION
    }

    async fn process(&self, input: &AgentInput, session: &mut Session, sink: &FragmentSink) -> Result<()> {
        if !input.is_handoff() && Self::wants_to_skip(&input.message) {
            return self
                .advance(sink, "Alright, I'll work with what we have.", json!({ (fields::TOOLS): [] }))
                .await;
        }

        let request = SelectionRequest::new(&input.message)
            .with_role(session.intent.role)
            .with_max_results(self.max_tools);
        let suggestions = self
            .selector
            .select(self.dispatcher.executor().registry(), &request);
        let calls = Self::actionable(suggestions);

        if calls.is_empty() {
            let text = if input.is_handoff() {
                "Do you have a GitHub profile, website, LinkedIn page or resume I can look at?"
            } else {
                "I couldn't find a link or file in that message. Could you share one, or skip this step?"
            };
            return self.ask_for_sources(sink, text).await;
        }

        let names: Vec<&str> = calls.iter().map(|call| call.name.as_str()).collect();
        info!(session_id = %session.id, tools = ?names, "collecting profile data");
        sink.thinking(
            format!("Looking at {} source(s)...", calls.len()),
            format!("Selected tools: {}", names.join(", ")),
        )
        .await?;

        let results = self.dispatcher.dispatch(&calls).await;
        session.record_tool_calls(results.len() as u32);

        let mut succeeded = 0;
        for (call, result) in calls.iter().zip(&results) {
            let target = call.params.target().unwrap_or(&call.name).to_string();
            match (&result.data, result.success) {
                (Some(data), true) => {
                    succeeded += 1;
                    let mut collected = collected_from_tool(call.params.category(), data);
                    collected.sources.push(target.clone());
                    session.collected_data.merge(collected);
                    sink.reply(format!("Collected details from {target}.")).await?;
                }
                _ => {
                    warn!(
                        session_id = %session.id,
                        tool = %result.tool_name,
                        error = ?result.error,
                        "tool result unusable"
                    );
                    let hint = result.suggestions.first().cloned().unwrap_or_default();
                    sink.reply(format!("I couldn't read {target}. {hint}").trim_end().to_string())
                        .await?;
                }
            }
        }

        let metadata = json!({ (fields::TOOLS): results.iter().map(Self::summary).collect::<Vec<_>>() });
        if succeeded > 0 {
            self.advance(sink, "Thanks, I have enough to start designing your page.", metadata)
                .await
        } else {
            sink.ask(
                "None of those sources worked. Want to try another link, or skip this step?",
                Self::sources_form(),
                SystemState::park(Intent::Collecting).with_metadata(metadata),
            )
            .await
        }
    }

    async fn handle_interaction(
        &self,
        interaction: &UserInteraction,
        _session: &mut Session,
    ) -> Result<InteractionOutcome> {
        if interaction.field("value") == Some("skip") || interaction.field("action") == Some("skip") {
            return Ok(InteractionOutcome::advance());
        }

        let submitted: Vec<String> = FORM_FIELDS
            .iter()
            .filter_map(|field| interaction.field(field).map(|value| (*field, value)))
            .map(|(field, value)| match field {
                "github" if !value.contains("github.com") => format!("https://github.com/{value}"),
                "linkedin" if !value.contains("linkedin.com") => {
                    format!("https://www.linkedin.com/in/{value}")
                }
                _ => value.to_string(),
            })
            .collect();
        if submitted.is_empty() {
            return Ok(InteractionOutcome::stay());
        }
        Ok(InteractionOutcome::resubmit(submitted.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CodeHostingParams, ToolParams, WebPageParams};

    fn suggestion(name: &str, params: ToolParams, score: i32) -> ToolSuggestion {
        ToolSuggestion {
            name: name.into(),
            category: params.category(),
            priority: score,
            score,
            confidence: 0.9,
            matched: MatchStrength::Specific,
            params: Some(params),
            reason: String::new(),
        }
    }

    #[test]
    fn same_target_is_dispatched_once() {
        let github = ToolParams::CodeHosting(CodeHostingParams {
            username_or_url: "https://github.com/octocat".into(),
            include_repos: true,
        });
        let page = ToolParams::WebPage(WebPageParams {
            url: "https://github.com/octocat".into(),
            extract_mode: Default::default(),
        });
        let calls = InfoCollectionAgent::actionable(vec![
            suggestion("analyze_github", github, 19),
            suggestion("scrape_webpage", page, 11),
        ]);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "analyze_github");
    }

    #[test]
    fn github_data_maps_to_profile() {
        let data = json!({
            "username": "octocat",
            "name": "The Octocat",
            "location": "San Francisco",
            "repositories": [
                {"name": "hello-world", "language": "Rust"},
                {"name": "spoon-knife", "language": "Rust"}
            ]
        });
        let collected = collected_from_tool(ToolCategory::CodeHosting, &data);
        assert_eq!(collected.personal.name.as_deref(), Some("The Octocat"));
        assert_eq!(collected.projects.len(), 2);
        assert_eq!(collected.professional.skills, vec!["Rust"]);
    }

    #[tokio::test]
    async fn form_values_become_resubmitted_input() {
        let agent_input = UserInteraction::new(
            InteractionType::Form,
            json!({"github": "octocat", "website": "https://octo.dev", "linkedin": ""}),
        );
        let dispatcher = ToolDispatcher::new(
            std::sync::Arc::new(crate::tools::ToolExecutor::new(
                std::sync::Arc::new(crate::tools::ToolRegistry::new()),
                Default::default(),
            )),
            1,
        );
        let outcome = InfoCollectionAgent::new(dispatcher, 3)
            .handle_interaction(&agent_input, &mut Session::new("c"))
            .await
            .unwrap();
        assert_eq!(
            outcome.action,
            crate::agent::InteractionAction::Resubmit("https://github.com/octocat https://octo.dev".into())
        );
    }

    #[test]
    fn skip_words_are_recognized() {
        assert!(InfoCollectionAgent::wants_to_skip("skip"));
        assert!(InfoCollectionAgent::wants_to_skip("Next please"));
        assert!(!InfoCollectionAgent::wants_to_skip("https://github.com/octocat"));
    }
}
