//! Chimera - Rust 认知编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、重试策略、工作流状态与进度事件
//! - **health**: 存储与模型后端的就绪检查
//! - **llm**: LLM 客户端抽象与实现（Ollama / OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化与进程内指标
//! - **plan**: 计划 Schema 校验解码与查询清洗
//! - **store**: 向量存储、实体图存储、文档导入与快照
//! - **tools**: 工具注册表、调度器与内置检索工具
//! - **workflow**: 规划 → 调度 → 校验 → 合成 状态机

pub mod config;
pub mod core;
pub mod health;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod store;
pub mod tools;
pub mod workflow;

pub use crate::config::{load_config, AppConfig};
pub use crate::core::{RetryPolicy, WorkflowError, WorkflowEvent, WorkflowState};
pub use crate::observability::Metrics;
pub use crate::workflow::{WorkflowEngine, WorkflowEngineBuilder};
