//! 会话模型、持久化与健康诊断

mod file;
pub mod health;
mod manager;
mod model;
pub mod store;

pub use file::FileSessionStore;
pub use health::{HealthStatus, RecoveryAction, RecoveryRecommendation, SessionHealth};
pub use manager::SessionManager;
pub use model::{
    AgentFlowRecord, CollectedData, ConversationEntry, FlowMetrics, FlowStatus, PageDesign,
    PersonalInfo, Personalization, ProfessionalInfo, Session, SessionArtifacts, SessionMetadata,
    SessionMetrics, SessionPreferences, SessionStatus, Speaker, StageProgress, Theme, Urgency,
    UserIntent,
};
#[cfg(feature = "redis-store")]
pub use store::redis::RedisSessionStore;
pub use store::{MemorySessionStore, SessionStore};
