//! 引擎错误分类
//!
//! 只有 InvalidInput 会从 WorkflowEngine::run 逃逸；其余错误都在节点内部被吸收，
//! 并以诊断文本或降级回复的形式写回 WorkflowState。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;
use crate::plan::DecodeError;

/// 引擎入口可能返回的错误
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// 输入状态不满足结构性前置条件（例如复用了已执行过的 WorkflowState）
    #[error("Invalid workflow input: {0}")]
    InvalidInput(String),
}

/// 单个工具执行失败的原因；由 Dispatcher 转换为 "Error executing <id>: <message>"
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("unknown tool")]
    UnknownTool,
}

impl From<String> for ToolError {
    fn from(msg: String) -> Self {
        ToolError::Failed(msg)
    }
}

impl From<&str> for ToolError {
    fn from(msg: &str) -> Self {
        ToolError::Failed(msg.to_string())
    }
}

/// PLAN 节点内「调用模型 + 解码」这一整步的失败原因
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("model call failed: {0}")]
    Model(#[from] LlmError),

    #[error("plan decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// 启动期配置错误（缺少模型、凭据等），进程级致命
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Missing configuration value: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}
