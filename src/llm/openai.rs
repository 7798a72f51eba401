//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；提示词作为单条 user 消息发送。

use std::sync::{Mutex, PoisonError};

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde::Serialize;

use crate::llm::{Completion, LlmClient, LlmError};

/// 累计 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

/// OpenAI 兼容客户端；generate 传入的 model 为空时使用构造时的默认模型
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    default_model: String,
    usage: Mutex<TokenUsage>,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            default_model: model.to_string(),
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn usage(&self) -> TokenUsage {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn user_message(prompt: &str) -> Result<ChatCompletionRequestMessage, LlmError> {
        ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map(ChatCompletionRequestMessage::User)
            .map_err(|e| LlmError::Api(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<Completion, LlmError> {
        let model = if model.is_empty() {
            self.default_model.as_str()
        } else {
            model
        };
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![Self::user_message(prompt)?])
            .build()
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        if let Some(u) = &response.usage {
            let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
            usage.prompt += u64::from(u.prompt_tokens);
            usage.completion += u64::from(u.completion_tokens);
            tracing::debug!(model, total_tokens = usage.total(), "token usage updated");
        }

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(LlmError::InvalidResponse("no choices in response".to_string()));
        };
        Ok(Completion::new(choice.message.content.unwrap_or_default()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_starts_empty() {
        let client = OpenAiClient::new(Some("http://localhost:1234/v1"), "gpt-4o-mini", "sk-test");
        assert_eq!(client.usage(), TokenUsage::default());
        assert_eq!(client.name(), "openai");
    }

    #[test]
    fn test_usage_total() {
        let usage = TokenUsage { prompt: 12, completion: 30 };
        assert_eq!(usage.total(), 42);
    }
}
