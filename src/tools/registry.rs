use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::manifest::{ToolCategory, ToolDefinition};
use super::tool::Tool;
use crate::error::{Result, StageFlowError};
use crate::registry::Registry;

/// 描述短于该长度的工具很难被自动选中
pub const MIN_DESCRIPTION_LEN: usize = 20;

struct ToolEntry {
    definition: ToolDefinition,
    executor: Option<Arc<dyn Tool>>,
    order: usize,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
    next_order: usize,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct IntegrityReport {
    pub unbound: Vec<String>,
    pub weak_descriptions: Vec<String>,
    pub empty_categories: Vec<ToolCategory>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.unbound.is_empty() && self.weak_descriptions.is_empty() && self.empty_categories.is_empty()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            next_order: 0,
        }
    }

    /// 注册或覆盖定义；覆盖时保留已绑定的执行器和原有顺序
    pub fn register(&mut self, definition: ToolDefinition) {
        match self.tools.get_mut(&definition.name) {
            Some(entry) => {
                debug!(tool = %definition.name, "overwriting tool definition");
                entry.definition = definition;
            }
            None => {
                let order = self.next_order;
                self.next_order += 1;
                self.tools.insert(
                    definition.name.clone(),
                    ToolEntry {
                        definition,
                        executor: None,
                        order,
                    },
                );
            }
        }
    }

    pub fn register_with_tool(&mut self, definition: ToolDefinition, tool: Arc<dyn Tool>) -> Result<()> {
        if definition.name != tool.name() {
            return Err(StageFlowError::Config(format!(
                "tool executor `{}` does not match definition `{}`",
                tool.name(),
                definition.name
            )));
        }
        self.register(definition);
        self.bind(tool)
    }

    pub fn bind(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let entry = self
            .tools
            .get_mut(tool.name())
            .ok_or_else(|| StageFlowError::ToolNotRegistered(tool.name().to_string()))?;
        entry.executor = Some(tool);
        Ok(())
    }

    pub fn get_by_name(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|entry| &entry.definition)
    }

    pub fn executor(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .and_then(|entry| entry.executor.as_ref().map(Arc::clone))
    }

    /// 全部定义，按注册顺序
    pub fn get_all(&self) -> Vec<&ToolDefinition> {
        let mut entries: Vec<&ToolEntry> = self.tools.values().collect();
        entries.sort_by_key(|entry| entry.order);
        entries.into_iter().map(|entry| &entry.definition).collect()
    }

    /// 某一类目的定义，优先级降序，同优先级按注册顺序
    pub fn get_by_category(&self, category: ToolCategory) -> Vec<&ToolDefinition> {
        let mut tools: Vec<&ToolDefinition> = self
            .get_all()
            .into_iter()
            .filter(|definition| definition.category == category)
            .collect();
        tools.sort_by(|a, b| b.priority.cmp(&a.priority));
        tools
    }

    pub fn search(&self, query: &str) -> Vec<&ToolDefinition> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.get_all();
        }
        self.get_all()
            .into_iter()
            .filter(|definition| {
                definition.name.to_lowercase().contains(&needle)
                    || definition.description.to_lowercase().contains(&needle)
                    || definition.category.as_str().contains(&needle)
                    || definition
                        .metadata
                        .tags
                        .iter()
                        .any(|tag| tag.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn order_of(&self, name: &str) -> Option<usize> {
        self.tools.get(name).map(|entry| entry.order)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn validate_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();
        for definition in self.get_all() {
            let entry = &self.tools[&definition.name];
            if entry.executor.is_none() {
                report.unbound.push(definition.name.clone());
            }
            if definition.description.trim().chars().count() < MIN_DESCRIPTION_LEN {
                report.weak_descriptions.push(definition.name.clone());
            }
        }
        report.empty_categories = ToolCategory::ALL
            .into_iter()
            .filter(|category| self.get_all().iter().all(|d| d.category != *category))
            .collect();
        report
    }
}

impl Registry for ToolRegistry {
    type Key = str;
    type Entry = ToolDefinition;

    fn register(&mut self, entry: ToolDefinition) {
        ToolRegistry::register(self, entry);
    }

    fn get(&self, key: &str) -> Option<&ToolDefinition> {
        self.get_by_name(key)
    }

    fn all(&self) -> Vec<&ToolDefinition> {
        self.get_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FnTool, ToolOutput};

    fn definition(name: &str, category: ToolCategory, priority: i32) -> ToolDefinition {
        ToolDefinition::builder(name, category)
            .description(format!("{name} extracts profile data for the user"))
            .priority(priority)
            .tag("profile")
            .build()
    }

    #[test]
    fn category_listing_is_sorted_by_priority_then_insertion() {
        let mut registry = ToolRegistry::new();
        registry.register(definition("low", ToolCategory::WebPage, 1));
        registry.register(definition("first_high", ToolCategory::WebPage, 7));
        registry.register(definition("second_high", ToolCategory::WebPage, 7));
        registry.register(definition("other", ToolCategory::Document, 9));

        let names: Vec<_> = registry
            .get_by_category(ToolCategory::WebPage)
            .into_iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["first_high", "second_high", "low"]);
    }

    #[test]
    fn search_matches_name_tags_and_category() {
        let mut registry = ToolRegistry::new();
        registry.register(definition("analyze_github", ToolCategory::CodeHosting, 9));
        registry.register(definition("parse_document", ToolCategory::Document, 8));

        assert_eq!(registry.search("GITHUB").len(), 1);
        assert_eq!(registry.search("document").len(), 1);
        assert_eq!(registry.search("profile").len(), 2);
        assert!(registry.search("weather").is_empty());
    }

    #[test]
    fn integrity_report_flags_unbound_weak_and_empty() {
        let mut registry = ToolRegistry::new();
        registry.register(definition("analyze_github", ToolCategory::CodeHosting, 9));
        registry.register(
            ToolDefinition::builder("short", ToolCategory::WebPage)
                .description("scrape")
                .build(),
        );
        registry
            .bind(Arc::new(FnTool::new("analyze_github", |_| async {
                Ok(ToolOutput::default())
            })))
            .unwrap();

        let report = registry.validate_integrity();
        assert_eq!(report.unbound, vec!["short".to_string()]);
        assert_eq!(report.weak_descriptions, vec!["short".to_string()]);
        assert_eq!(
            report.empty_categories,
            vec![ToolCategory::Document, ToolCategory::SocialProfile]
        );
        assert!(!report.is_healthy());
    }

    #[test]
    fn binding_unknown_tool_fails() {
        let mut registry = ToolRegistry::new();
        let result = registry.bind(Arc::new(FnTool::new("ghost", |_| async {
            Ok(ToolOutput::default())
        })));
        assert!(matches!(result, Err(StageFlowError::ToolNotRegistered(_))));
    }
}
