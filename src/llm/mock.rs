//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 默认行为：规划提示词 → `{"plan": ["vector_search"]}`；
//! 合成提示词 → 回显 "Context from tools:" 之后的工具输出。
//! 也可以按顺序脚本化返回值，或用闭包完全自定义。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::llm::{Completion, LlmClient, LlmError};

/// 合成提示词中工具上下文的起始标记
pub const CONTEXT_MARKER: &str = "Context from tools:";

type ResponderFn = Arc<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<ResponderFn>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回脚本中的结果；脚本耗尽后回到默认行为
    pub fn scripted<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// 用闭包决定每次返回
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Arc::new(f)),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn default_response(prompt: &str) -> String {
        match prompt.find(CONTEXT_MARKER) {
            Some(idx) => {
                let context = &prompt[idx + CONTEXT_MARKER.len()..];
                // 去掉合成提示词尾部的问题与指令
                let context = context
                    .split("\n\nQuestion:")
                    .next()
                    .unwrap_or(context)
                    .trim();
                if context.is_empty() {
                    "I could not find any relevant information.".to_string()
                } else {
                    format!("Based on the available context: {context}")
                }
            }
            None => r#"{"plan": ["vector_search"]}"#.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, _model: &str, prompt: &str) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let text = match (scripted, &self.responder) {
            (Some(result), _) => result?,
            (None, Some(f)) => f(prompt)?,
            (None, None) => Self::default_response(prompt),
        };
        Ok(Completion::new(text))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
