//! LLM 层：客户端抽象与实现（Ollama / OpenAI 兼容 / Mock）

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockLlmClient;
pub use ollama::OllamaClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{Completion, LlmClient, LlmError};

use crate::config::AppConfig;
use crate::core::ConfigError;

/// 按 [llm] 段创建客户端；provider 未知或缺少凭据时返回 ConfigError
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, ConfigError> {
    let provider = cfg.llm.provider.to_lowercase();
    match provider.as_str() {
        "ollama" => {
            let host = cfg.llm.ollama.host.as_deref().or(cfg.llm.base_url.as_deref());
            let client = OllamaClient::new(host, cfg.llm.timeouts.request).map_err(|e| {
                ConfigError::Invalid {
                    key: "llm.ollama.host".to_string(),
                    reason: e.to_string(),
                }
            })?;
            tracing::info!(host = client.host(), model = %cfg.llm.model, "Using Ollama LLM");
            Ok(Arc::new(client))
        }
        "openai" => {
            let api_key = cfg
                .llm
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| ConfigError::Missing("llm.api_key / OPENAI_API_KEY".to_string()))?;
            tracing::info!(model = %cfg.llm.model, "Using OpenAI-compatible LLM");
            Ok(Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                &api_key,
            )))
        }
        "mock" => {
            tracing::warn!("Using Mock LLM");
            Ok(Arc::new(MockLlmClient::new()))
        }
        other => Err(ConfigError::Invalid {
            key: "llm.provider".to_string(),
            reason: format!("unknown provider '{other}' (expected ollama, openai or mock)"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "Mock".to_string();
        let llm = create_llm_from_config(&cfg).unwrap();
        assert_eq!(llm.name(), "mock");
    }

    #[test]
    fn test_ollama_provider_is_default() {
        let llm = create_llm_from_config(&AppConfig::default()).unwrap();
        assert_eq!(llm.name(), "ollama");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "carrier-pigeon".to_string();
        assert!(matches!(
            create_llm_from_config(&cfg),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_openai_with_explicit_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "openai".to_string();
        cfg.llm.api_key = Some("sk-test".to_string());
        assert_eq!(create_llm_from_config(&cfg).unwrap().name(), "openai");
    }
}
