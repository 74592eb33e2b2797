use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::manifest::{ToolCategory, ToolDefinition, Trigger};
use super::params::{
    CodeHostingParams, DocumentParams, DocumentType, ExtractMode, SocialPlatform,
    SocialProfileParams, ToolParams, WebPageParams,
};
use super::registry::ToolRegistry;

pub const DEFAULT_MAX_RESULTS: usize = 3;
pub const SPECIFIC_MATCH_BONUS: i32 = 10;
pub const PATTERN_MATCH_BONUS: i32 = 5;

/// 用户角色提示，影响各类目工具的权重
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Developer,
    Designer,
    ProductManager,
    Marketer,
    Student,
    Researcher,
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Developer => "developer",
            Role::Designer => "designer",
            Role::ProductManager => "product_manager",
            Role::Marketer => "marketer",
            Role::Student => "student",
            Role::Researcher => "researcher",
            Role::Other => "other",
        }
    }

    pub fn parse(label: &str) -> Option<Role> {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "developer" => Some(Role::Developer),
            "designer" => Some(Role::Designer),
            "product_manager" => Some(Role::ProductManager),
            "marketer" => Some(Role::Marketer),
            "student" => Some(Role::Student),
            "researcher" => Some(Role::Researcher),
            "other" => Some(Role::Other),
            _ => None,
        }
    }

    /// 从自由文本中识别角色
    pub fn detect(text: &str) -> Option<Role> {
        let lower = text.to_lowercase();
        if lower.contains("product manager") {
            return Some(Role::ProductManager);
        }
        let words: HashSet<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .collect();
        let any = |candidates: &[&str]| candidates.iter().any(|word| words.contains(word));

        if any(&["developer", "engineer", "programmer", "coder", "devops"]) {
            Some(Role::Developer)
        } else if any(&["designer", "ux", "ui", "illustrator"]) {
            Some(Role::Designer)
        } else if any(&["pm", "product"]) {
            Some(Role::ProductManager)
        } else if any(&["marketing", "marketer", "growth"]) {
            Some(Role::Marketer)
        } else if any(&["student", "graduate", "undergraduate", "intern"]) {
            Some(Role::Student)
        } else if any(&["researcher", "research", "phd", "scientist"]) {
            Some(Role::Researcher)
        } else {
            None
        }
    }
}

pub fn role_weight(category: ToolCategory, role: Option<Role>) -> i32 {
    use ToolCategory::*;
    match (role, category) {
        (Some(Role::Developer), CodeHosting) => 3,
        (Some(Role::Developer), _) => 1,
        (Some(Role::Designer), WebPage) => 3,
        (Some(Role::Designer), CodeHosting) => 0,
        (Some(Role::Designer), _) => 1,
        (Some(Role::ProductManager), SocialProfile) => 3,
        (Some(Role::ProductManager), Document) => 2,
        (Some(Role::ProductManager), WebPage) => 1,
        (Some(Role::ProductManager), CodeHosting) => 0,
        (Some(Role::Marketer), SocialProfile) => 3,
        (Some(Role::Marketer), WebPage) => 2,
        (Some(Role::Marketer), _) => 0,
        (Some(Role::Student), Document) => 3,
        (Some(Role::Student), CodeHosting) => 2,
        (Some(Role::Student), _) => 1,
        (Some(Role::Researcher), Document) => 3,
        (Some(Role::Researcher), WebPage) => 2,
        (Some(Role::Researcher), _) => 1,
        (Some(Role::Other), _) | (None, _) => 0,
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrength {
    None,
    Pattern,
    Specific,
}

impl MatchStrength {
    pub fn bonus(&self) -> i32 {
        match self {
            MatchStrength::Specific => SPECIFIC_MATCH_BONUS,
            MatchStrength::Pattern => PATTERN_MATCH_BONUS,
            MatchStrength::None => 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SelectionRequest<'a> {
    pub input: &'a str,
    pub role: Option<Role>,
    pub category: Option<ToolCategory>,
    pub max_results: usize,
}

impl<'a> SelectionRequest<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            role: None,
            category: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_role(mut self, role: Option<Role>) -> Self {
        self.role = role;
        self
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ToolSuggestion {
    pub name: String,
    pub category: ToolCategory,
    pub priority: i32,
    pub score: i32,
    pub confidence: f64,
    pub matched: MatchStrength,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<ToolParams>,
    pub reason: String,
}

/// 工具选择器：对 (注册表快照, 输入, 角色) 是纯函数
#[derive(Clone, Copy, Debug, Default)]
pub struct ToolSelector;

impl ToolSelector {
    pub fn new() -> Self {
        Self
    }

    pub fn select(&self, registry: &ToolRegistry, request: &SelectionRequest<'_>) -> Vec<ToolSuggestion> {
        let mut suggestions: Vec<ToolSuggestion> = registry
            .get_all()
            .into_iter()
            .filter(|definition| request.category.map_or(true, |c| c == definition.category))
            .map(|definition| self.score(definition, request))
            .collect();

        // 稳定排序：同分按优先级，再按注册顺序
        suggestions.sort_by(|a, b| b.score.cmp(&a.score).then(b.priority.cmp(&a.priority)));
        suggestions.truncate(request.max_results);
        suggestions
    }

    fn score(&self, definition: &ToolDefinition, request: &SelectionRequest<'_>) -> ToolSuggestion {
        let matched = match_strength(&definition.triggers, request.input);
        let weight = role_weight(definition.category, request.role);
        let params = match matched {
            MatchStrength::None => None,
            _ => infer_params(definition.category, request.input),
        };
        let score = definition.priority + weight + matched.bonus();

        let confidence = match (matched, params.is_some()) {
            (MatchStrength::Specific, true) => 0.95,
            (MatchStrength::Specific, false) => 0.6,
            (MatchStrength::Pattern, true) => 0.75,
            (MatchStrength::Pattern, false) => 0.5,
            (MatchStrength::None, _) => (0.3 + 0.05 * f64::from(weight)).min(0.5),
        };

        let reason = match matched {
            MatchStrength::Specific => format!("input mentions a {} source", definition.category),
            MatchStrength::Pattern => format!("input contains a {} pattern", definition.category),
            MatchStrength::None if weight > 0 => {
                format!("commonly useful for the {} role", request.role.map(|r| r.as_str()).unwrap_or("given"))
            }
            MatchStrength::None => "ranked by priority only".to_string(),
        };

        ToolSuggestion {
            name: definition.name.clone(),
            category: definition.category,
            priority: definition.priority,
            score,
            confidence,
            matched,
            params,
            reason,
        }
    }
}

fn url_regex() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r#"https?://[^\s<>"'()]+"#).expect("valid url regex"))
}

fn github_regex() -> &'static Regex {
    static GITHUB: OnceLock<Regex> = OnceLock::new();
    GITHUB.get_or_init(|| {
        Regex::new(r"(?i)(?:https?://)?(?:www\.)?github\.com/([A-Za-z0-9](?:[A-Za-z0-9-]{0,38}))")
            .expect("valid github regex")
    })
}

fn linkedin_regex() -> &'static Regex {
    static LINKEDIN: OnceLock<Regex> = OnceLock::new();
    LINKEDIN.get_or_init(|| {
        Regex::new(r"(?i)(?:https?://)?(?:[a-z]{2,3}\.)?linkedin\.com/in/([A-Za-z0-9_%-]+)")
            .expect("valid linkedin regex")
    })
}

fn file_regex() -> &'static Regex {
    static FILE: OnceLock<Regex> = OnceLock::new();
    FILE.get_or_init(|| {
        Regex::new(r"(?i)\b([\w.-]+\.(pdf|docx|doc|txt|md|markdown))\b").expect("valid file regex")
    })
}

/// 输入中的第一个 http(s) 链接，去掉句末标点
pub fn first_url(input: &str) -> Option<String> {
    url_regex().find(input).map(|m| {
        m.as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?'])
            .to_string()
    })
}

/// 网页工具的目标：优先取不属于 GitHub/LinkedIn 主页的链接，都被占用时退回第一个链接
pub fn page_url(input: &str) -> Option<String> {
    let claimed = |url: &str| github_regex().is_match(url) || linkedin_regex().is_match(url);
    url_regex()
        .find_iter(input)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']))
        .find(|url| !claimed(url))
        .map(str::to_string)
        .or_else(|| first_url(input))
}

pub fn match_strength(triggers: &[Trigger], input: &str) -> MatchStrength {
    let lower = input.to_lowercase();
    triggers
        .iter()
        .map(|trigger| {
            let hit = match trigger {
                Trigger::Domain(domain) | Trigger::Keyword(domain) => {
                    lower.contains(&domain.to_lowercase())
                }
                Trigger::AnyUrl => url_regex().is_match(input),
                Trigger::FileExtension(extension) => file_regex()
                    .captures_iter(input)
                    .any(|caps| caps[2].eq_ignore_ascii_case(extension)),
            };
            match (hit, trigger.is_specific()) {
                (false, _) => MatchStrength::None,
                (true, true) => MatchStrength::Specific,
                (true, false) => MatchStrength::Pattern,
            }
        })
        .max()
        .unwrap_or(MatchStrength::None)
}

/// 从自由文本推断某一类目的调用参数
pub fn infer_params(category: ToolCategory, input: &str) -> Option<ToolParams> {
    match category {
        ToolCategory::CodeHosting => github_regex().captures(input).map(|caps| {
            ToolParams::CodeHosting(CodeHostingParams {
                username_or_url: format!("https://github.com/{}", &caps[1]),
                include_repos: true,
            })
        }),
        ToolCategory::SocialProfile => linkedin_regex().captures(input).map(|caps| {
            ToolParams::SocialProfile(SocialProfileParams {
                profile_url: format!("https://www.linkedin.com/in/{}", &caps[1]),
                platform: SocialPlatform::Linkedin,
            })
        }),
        ToolCategory::WebPage => page_url(input).map(|url| {
            ToolParams::WebPage(WebPageParams {
                url,
                extract_mode: ExtractMode::Summary,
            })
        }),
        ToolCategory::Document => file_regex().captures(input).map(|caps| {
            let file_name = caps[1].to_string();
            ToolParams::Document(DocumentParams {
                file_type: DocumentType::from_extension(&file_name),
                file_name: Some(file_name),
                file_data: None,
            })
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_roles_from_free_text() {
        assert_eq!(Role::detect("I'm a backend engineer"), Some(Role::Developer));
        assert_eq!(Role::detect("Senior UX designer here"), Some(Role::Designer));
        assert_eq!(Role::detect("working as a product manager"), Some(Role::ProductManager));
        assert_eq!(Role::detect("I build things"), None);
        assert_eq!(Role::parse("Product Manager"), Some(Role::ProductManager));
    }

    #[test]
    fn infers_params_from_urls_and_files() {
        let github = infer_params(ToolCategory::CodeHosting, "see github.com/octocat please");
        assert_eq!(
            github.and_then(|p| p.target().map(str::to_string)).as_deref(),
            Some("https://github.com/octocat")
        );

        let page = infer_params(ToolCategory::WebPage, "my site: https://jane.dev/about.");
        assert_eq!(
            page.and_then(|p| p.target().map(str::to_string)).as_deref(),
            Some("https://jane.dev/about")
        );

        match infer_params(ToolCategory::Document, "attached resume_2024.pdf") {
            Some(ToolParams::Document(params)) => {
                assert_eq!(params.file_name.as_deref(), Some("resume_2024.pdf"));
                assert_eq!(params.file_type, Some(DocumentType::Pdf));
            }
            other => panic!("unexpected params {other:?}"),
        }
        assert!(infer_params(ToolCategory::SocialProfile, "no links here").is_none());
    }

    #[test]
    fn page_target_skips_profile_links() {
        let page = infer_params(ToolCategory::WebPage, "https://github.com/octocat https://octo.dev");
        assert_eq!(
            page.and_then(|p| p.target().map(str::to_string)).as_deref(),
            Some("https://octo.dev")
        );
        assert_eq!(
            page_url("https://www.linkedin.com/in/octo, https://github.com/octocat").as_deref(),
            Some("https://www.linkedin.com/in/octo")
        );
    }

    #[test]
    fn strength_prefers_specific_triggers() {
        let triggers = vec![Trigger::Domain("github.com".into()), Trigger::AnyUrl];
        assert_eq!(
            match_strength(&triggers, "https://github.com/octocat"),
            MatchStrength::Specific
        );
        assert_eq!(match_strength(&triggers, "https://example.com"), MatchStrength::Pattern);
        assert_eq!(match_strength(&triggers, "hello"), MatchStrength::None);
    }
}
