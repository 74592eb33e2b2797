// Flow 模块 - 阶段定义、阶段映射与编排

pub mod constants;
pub mod orchestrator;
pub mod registry;
mod stage;

pub use orchestrator::{FragmentStream, Orchestrator, StageCompletion, StageTransition};
pub use registry::{StageBinding, StageMapping};
pub use stage::Stage;
