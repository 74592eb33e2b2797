use std::collections::HashMap;
use std::sync::Arc;

use super::agent::StageAgent;
use crate::registry::Registry;

/// 按名称索引的 agent 注册表
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn StageAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    pub fn agent(&self, name: &str) -> Option<Arc<dyn StageAgent>> {
        self.agents.get(name).map(Arc::clone)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Registry for AgentRegistry {
    type Key = str;
    type Entry = Arc<dyn StageAgent>;

    fn register(&mut self, agent: Arc<dyn StageAgent>) {
        self.agents.insert(agent.name().to_string(), agent);
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn StageAgent>> {
        self.agents.get(name)
    }

    fn all(&self) -> Vec<&Arc<dyn StageAgent>> {
        self.names()
            .into_iter()
            .filter_map(|name| self.agents.get(name))
            .collect()
    }
}
