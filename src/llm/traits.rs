//! LLM 客户端抽象
//!
//! 所有后端（Ollama / OpenAI 兼容 / Mock）实现 LlmClient：generate（单次非流式补全）。

use async_trait::async_trait;
use thiserror::Error;

/// 一次补全的结果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    pub text: String,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// 模型调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 后端不可达（连接失败、服务未启动）
    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("model request timed out after {0}s")]
    Timeout(u64),

    #[error("model API error: {0}")]
    Api(String),

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error("model call cancelled")]
    Cancelled,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 单次补全：给定模型名与提示词，返回生成文本
    async fn generate(&self, model: &str, prompt: &str) -> Result<Completion, LlmError>;

    /// 后端名称（日志与健康检查用）
    fn name(&self) -> &str;

    /// 连通性探测；默认视为可用
    async fn ping(&self) -> Result<(), LlmError> {
        Ok(())
    }
}
