//! Ollama 客户端：POST {host}/api/generate（stream = false）

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::{Completion, LlmClient, LlmError};

/// 默认 Ollama 地址
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// 先看状态码再解码：错误页（404 / 502 等）常常不是 JSON
fn parse_generate(status: reqwest::StatusCode, body: &str) -> Result<Completion, LlmError> {
    if !status.is_success() {
        let detail = serde_json::from_str::<GenerateResponse>(body)
            .ok()
            .and_then(|b| b.error);
        return Err(match detail {
            Some(err) => LlmError::Api(format!("HTTP {status}: {err}")),
            None => LlmError::Api(format!("HTTP {status}")),
        });
    }
    let body: GenerateResponse =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    if let Some(err) = body.error {
        return Err(LlmError::Api(err));
    }
    body.response
        .map(Completion::new)
        .ok_or_else(|| LlmError::InvalidResponse("missing 'response' field".to_string()))
}

pub struct OllamaClient {
    http: reqwest::Client,
    host: String,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(host: Option<&str>, timeout_secs: u64) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            host: host
                .unwrap_or(DEFAULT_OLLAMA_HOST)
                .trim_end_matches('/')
                .to_string(),
            timeout_secs,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn map_transport(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            LlmError::Unavailable(e.to_string())
        } else {
            LlmError::Api(e.to_string())
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<Completion, LlmError> {
        let url = format!("{}/api/generate", self.host);
        let resp = self
            .http
            .post(&url)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parse_generate(status, &body)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    /// GET /api/tags 探测服务是否在线
    async fn ping(&self) -> Result<(), LlmError> {
        let url = format!("{}/api/tags", self.host);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(LlmError::Api(format!("HTTP {}", resp.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_normalized() {
        let client = OllamaClient::new(Some("http://ollama:11434/"), 5).unwrap();
        assert_eq!(client.host(), "http://ollama:11434");
        let client = OllamaClient::new(None, 5).unwrap();
        assert_eq!(client.host(), DEFAULT_OLLAMA_HOST);
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(GenerateRequest {
            model: "llama3.1",
            prompt: "hi",
            stream: false,
        })
        .unwrap();
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_error_status_checked_before_decoding() {
        let err = parse_generate(reqwest::StatusCode::BAD_GATEWAY, "<html>Bad Gateway</html>")
            .unwrap_err();
        assert_eq!(err, LlmError::Api("HTTP 502 Bad Gateway".to_string()));

        let err = parse_generate(
            reqwest::StatusCode::NOT_FOUND,
            r#"{"error": "model 'llama9' not found"}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            LlmError::Api("HTTP 404 Not Found: model 'llama9' not found".to_string())
        );
    }

    #[test]
    fn test_success_body_decoded() {
        let ok = parse_generate(reqwest::StatusCode::OK, r#"{"response": "Paris", "done": true}"#);
        assert_eq!(ok.unwrap().text, "Paris");

        let err = parse_generate(reqwest::StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));

        let err = parse_generate(reqwest::StatusCode::OK, r#"{"done": true}"#).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        let client = OllamaClient::new(Some("http://127.0.0.1:9"), 2).unwrap();
        let err = client.generate("m", "p").await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::Unavailable(_) | LlmError::Timeout(_) | LlmError::Api(_)
        ));
    }
}
