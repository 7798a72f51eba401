//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CHIMERA__*` 覆盖（双下划线表示嵌套，如 `CHIMERA__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{ConfigError, RetryPolicy};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub workflow: WorkflowSection,
}

/// [app] 段：应用名、日志级别、索引快照路径
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 存储快照（JSON）路径；未设置时不持久化
    pub index_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            log_level: default_log_level(),
            index_path: None,
        }
    }
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：ollama / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// OpenAI 兼容端点的 Key；未设置时读 OPENAI_API_KEY
    pub api_key: Option<String>,
    #[serde(default)]
    pub ollama: LlmOllamaSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "llama3.1".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            ollama: LlmOllamaSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOllamaSection {
    pub host: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次模型请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [tools] 段：工具超时、检索条数、向量存储参数
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub vector: VectorSection,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_top_k() -> usize {
    5
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            top_k: default_top_k(),
            vector: VectorSection::default(),
        }
    }
}

/// [tools.vector] 段：分块与嵌入维度
#[derive(Debug, Clone, Deserialize)]
pub struct VectorSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// 最多保留的块数，超出后丢弃最旧的
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    64
}

fn default_dimensions() -> usize {
    256
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for VectorSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            dimensions: default_dimensions(),
            max_entries: default_max_entries(),
        }
    }
}

/// [workflow] 段：迭代上限、查询长度、规划重试与兜底工具
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default = "default_plan_attempts")]
    pub plan_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_fallback_tool")]
    pub fallback_tool: String,
}

fn default_max_iterations() -> u32 {
    2
}

fn default_max_query_chars() -> usize {
    10_000
}

fn default_plan_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    4_000
}

fn default_fallback_tool() -> String {
    "vector_search".to_string()
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_query_chars: default_max_query_chars(),
            plan_attempts: default_plan_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            fallback_tool: default_fallback_tool(),
        }
    }
}

impl WorkflowSection {
    /// PLAN 节点「模型调用 + 解码」整步的重试策略
    pub fn plan_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.plan_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
        )
    }
}

impl AppConfig {
    /// 启动期校验；失败即致命
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Missing("llm.model".to_string()));
        }
        let provider = self.llm.provider.to_lowercase();
        if !matches!(provider.as_str(), "ollama" | "openai" | "mock") {
            return Err(ConfigError::Invalid {
                key: "llm.provider".to_string(),
                reason: format!("unknown provider '{}'", self.llm.provider),
            });
        }
        if provider == "openai"
            && self.llm.api_key.is_none()
            && std::env::var("OPENAI_API_KEY").is_err()
        {
            return Err(ConfigError::Missing(
                "llm.api_key / OPENAI_API_KEY".to_string(),
            ));
        }
        if self.workflow.plan_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "workflow.plan_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.workflow.fallback_tool.trim().is_empty() {
            return Err(ConfigError::Missing("workflow.fallback_tool".to_string()));
        }
        if self.tools.vector.chunk_size == 0
            || self.tools.vector.chunk_overlap >= self.tools.vector.chunk_size
        {
            return Err(ConfigError::Invalid {
                key: "tools.vector.chunk_overlap".to_string(),
                reason: "chunk_size must be positive and larger than chunk_overlap".to_string(),
            });
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 CHIMERA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CHIMERA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            return Err(ConfigError::Missing(format!(
                "config file {}",
                path.display()
            )));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CHIMERA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    Ok(c.try_deserialize()?)
}
