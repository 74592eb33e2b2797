mod engine;
mod env;

pub use engine::{EngineConfig, HealthThresholds, SessionSettings, ToolSettings};
pub use env::EnvConfig;
