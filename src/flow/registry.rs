use std::collections::HashMap;

use serde::Serialize;

use super::constants::{agents, progress};
use super::stage::Stage;
use crate::registry::Registry;

/// 阶段与 agent 的绑定
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StageBinding {
    pub stage: Stage,
    pub agent: String,
    pub progress: u8,
}

impl StageBinding {
    pub fn new(stage: Stage, agent: impl Into<String>, progress: u8) -> Self {
        Self {
            stage,
            agent: agent.into(),
            progress: progress.min(100),
        }
    }
}

/// 阶段映射注册表
///
/// 阶段与 agent 双向映射、规范的 agent 顺序以及阶段进度表。
#[derive(Clone, Debug, Default)]
pub struct StageMapping {
    bindings: HashMap<Stage, StageBinding>,
    by_agent: HashMap<String, Stage>,
}

impl StageMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// `welcome → info_collection → prompt_output → coding`
    pub fn standard() -> Self {
        let mut mapping = Self::new();
        mapping.register(StageBinding::new(Stage::Welcome, agents::WELCOME, progress::WELCOME));
        mapping.register(StageBinding::new(
            Stage::InfoCollection,
            agents::INFO_COLLECTION,
            progress::INFO_COLLECTION,
        ));
        mapping.register(StageBinding::new(
            Stage::PageDesign,
            agents::PROMPT_OUTPUT,
            progress::PAGE_DESIGN,
        ));
        mapping.register(StageBinding::new(
            Stage::CodeGeneration,
            agents::CODING,
            progress::CODE_GENERATION,
        ));
        mapping
    }

    pub fn agent_for(&self, stage: Stage) -> Option<&str> {
        self.bindings.get(&stage).map(|binding| binding.agent.as_str())
    }

    /// 阶段标签到 agent；旧标签与未知标签按第一阶段处理
    pub fn get_agent_from_stage(&self, label: &str) -> Option<&str> {
        self.agent_for(Stage::normalize(label))
    }

    pub fn get_stage_from_agent(&self, agent: &str) -> Option<Stage> {
        self.by_agent.get(agent).copied()
    }

    /// 已绑定阶段按规范顺序排列
    pub fn sequence(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| self.bindings.contains_key(stage))
            .collect()
    }

    pub fn agent_sequence(&self) -> Vec<&str> {
        self.sequence()
            .into_iter()
            .filter_map(|stage| self.agent_for(stage))
            .collect()
    }

    pub fn next_stage(&self, stage: Stage) -> Option<Stage> {
        self.sequence().into_iter().find(|candidate| *candidate > stage)
    }

    /// 规范顺序中的后继 agent；终止 agent 返回 `None`
    pub fn get_next_agent(&self, current: &str) -> Option<&str> {
        let stage = self.get_stage_from_agent(current)?;
        self.next_stage(stage).and_then(|next| self.agent_for(next))
    }

    /// 是否允许从 `current` 继续到下一个 agent
    ///
    /// 目前只禁止越过终止 agent，提前结束的策略挂在这里。
    pub fn should_continue_to_next_agent(&self, current: &str) -> bool {
        self.get_next_agent(current).is_some()
    }

    pub fn progress_for(&self, stage: Stage) -> u8 {
        self.bindings
            .get(&stage)
            .map(|binding| binding.progress)
            .unwrap_or(0)
    }

    pub fn is_terminal(&self, stage: Stage) -> bool {
        self.next_stage(stage).is_none()
    }
}

impl Registry for StageMapping {
    type Key = Stage;
    type Entry = StageBinding;

    fn register(&mut self, binding: StageBinding) {
        if let Some(previous) = self.bindings.get(&binding.stage) {
            self.by_agent.remove(&previous.agent);
        }
        self.by_agent.insert(binding.agent.clone(), binding.stage);
        self.bindings.insert(binding.stage, binding);
    }

    fn get(&self, stage: &Stage) -> Option<&StageBinding> {
        self.bindings.get(stage)
    }

    fn all(&self) -> Vec<&StageBinding> {
        self.sequence()
            .into_iter()
            .filter_map(|stage| self.bindings.get(&stage))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::constants::stages;

    #[test]
    fn stage_agent_mapping_round_trips() {
        let mapping = StageMapping::standard();
        for stage in mapping.sequence() {
            let agent = mapping.agent_for(stage).unwrap();
            assert_eq!(mapping.get_stage_from_agent(agent), Some(stage));
        }
    }

    #[test]
    fn next_agent_follows_canonical_order() {
        let mapping = StageMapping::standard();
        assert_eq!(
            mapping.agent_sequence(),
            vec![agents::WELCOME, agents::INFO_COLLECTION, agents::PROMPT_OUTPUT, agents::CODING]
        );
        assert_eq!(mapping.get_next_agent(agents::PROMPT_OUTPUT), Some(agents::CODING));
        assert_eq!(mapping.get_next_agent(agents::CODING), None);
        assert!(!mapping.should_continue_to_next_agent(agents::CODING));
        assert!(mapping.should_continue_to_next_agent(agents::WELCOME));
        assert_eq!(mapping.get_next_agent("unknown"), None);
    }

    #[test]
    fn legacy_start_label_maps_to_first_agent() {
        let mapping = StageMapping::standard();
        assert_eq!(mapping.get_agent_from_stage(stages::LEGACY_START), Some(agents::WELCOME));
        assert_eq!(mapping.get_agent_from_stage("bogus"), Some(agents::WELCOME));
    }

    #[test]
    fn rebinding_a_stage_replaces_reverse_lookup() {
        let mut mapping = StageMapping::standard();
        mapping.register(StageBinding::new(Stage::PageDesign, "designer_v2", 65));
        assert_eq!(mapping.get_stage_from_agent("designer_v2"), Some(Stage::PageDesign));
        assert_eq!(mapping.get_stage_from_agent(agents::PROMPT_OUTPUT), None);
        assert_eq!(mapping.progress_for(Stage::PageDesign), 65);
    }
}
