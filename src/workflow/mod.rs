//! 工作流：有界迭代的 规划 → 调度 → 校验 → 合成 状态机

pub mod builder;
pub mod engine;
pub mod prompts;

pub use builder::WorkflowEngineBuilder;
pub use engine::{fallback_response, EngineSettings, WorkflowEngine, ERROR_MARKER};
pub use prompts::{planning_prompt, synthesis_prompt, TOOL_OUTPUT_DELIMITER};
