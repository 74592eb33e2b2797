use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::constants::stages;
use crate::error::StageFlowError;

/// 流水线的四个阶段，按声明顺序推进
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Welcome,
    InfoCollection,
    PageDesign,
    CodeGeneration,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Welcome,
        Stage::InfoCollection,
        Stage::PageDesign,
        Stage::CodeGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Welcome => stages::WELCOME,
            Stage::InfoCollection => stages::INFO_COLLECTION,
            Stage::PageDesign => stages::PAGE_DESIGN,
            Stage::CodeGeneration => stages::CODE_GENERATION,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn first() -> Stage {
        Stage::Welcome
    }

    /// 宽松解析：旧标签（如 `start`）和未知标签都归一到第一阶段
    pub fn normalize(label: &str) -> Stage {
        label.parse().unwrap_or_else(|_| Stage::first())
    }
}

impl FromStr for Stage {
    type Err = StageFlowError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.trim() {
            stages::WELCOME => Ok(Stage::Welcome),
            stages::INFO_COLLECTION => Ok(Stage::InfoCollection),
            stages::PAGE_DESIGN => Ok(Stage::PageDesign),
            stages::CODE_GENERATION => Ok(Stage::CodeGeneration),
            other => Err(StageFlowError::UnknownStage(other.to_string())),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// 持久化数据里可能残留旧标签，读取时统一归一化
impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Stage::normalize(&label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_labels_normalize_to_first_stage() {
        assert_eq!(Stage::normalize("start"), Stage::Welcome);
        assert_eq!(Stage::normalize("page_design"), Stage::PageDesign);
        assert!("start".parse::<Stage>().is_err());

        let stage: Stage = serde_json::from_str("\"start\"").unwrap();
        assert_eq!(stage, Stage::Welcome);
        assert_eq!(serde_json::to_string(&Stage::CodeGeneration).unwrap(), "\"code_generation\"");
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Welcome < Stage::InfoCollection);
        assert_eq!(Stage::CodeGeneration.index(), 3);
    }
}
