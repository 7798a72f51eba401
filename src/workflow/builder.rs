//! 工作流引擎构建器
//!
//! 提供流畅的API组装引擎：模型客户端、工具注册表、指标与参数

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{ConfigError, RetryPolicy};
use crate::llm::LlmClient;
use crate::observability::Metrics;
use crate::tools::{Dispatcher, ToolRegistry};
use crate::workflow::engine::{EngineSettings, WorkflowEngine};

/// 工作流引擎构建器
#[derive(Default)]
pub struct WorkflowEngineBuilder {
    llm: Option<Arc<dyn LlmClient>>,
    registry: Option<ToolRegistry>,
    metrics: Option<Arc<Metrics>>,
    settings: EngineSettings,
    plan_retry: RetryPolicy,
}

impl WorkflowEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置文件设置参数与规划重试策略
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            settings: EngineSettings::from(cfg),
            plan_retry: cfg.workflow.plan_retry(),
            ..Self::default()
        }
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 共享指标；不设置时引擎自建一个
    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.settings.model = model.into();
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.settings.max_iterations = max_iterations;
        self
    }

    pub fn fallback_plan<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.fallback_plan = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.settings.tool_timeout = timeout;
        self
    }

    pub fn model_timeout(mut self, timeout: Duration) -> Self {
        self.settings.model_timeout = timeout;
        self
    }

    pub fn plan_retry(mut self, policy: RetryPolicy) -> Self {
        self.plan_retry = policy;
        self
    }

    /// 构建引擎；缺少组件或兜底计划引用了未注册工具时返回错误
    pub fn build(self) -> Result<WorkflowEngine, ConfigError> {
        let llm = self
            .llm
            .ok_or_else(|| ConfigError::Missing("llm client".to_string()))?;
        let registry = self
            .registry
            .ok_or_else(|| ConfigError::Missing("tool registry".to_string()))?;
        if registry.is_empty() {
            return Err(ConfigError::Invalid {
                key: "tools".to_string(),
                reason: "registry has no tools".to_string(),
            });
        }
        if self.settings.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "llm.model".to_string(),
                reason: "model name is empty".to_string(),
            });
        }
        if self.settings.fallback_plan.is_empty() {
            return Err(ConfigError::Invalid {
                key: "workflow.fallback_tool".to_string(),
                reason: "fallback plan is empty".to_string(),
            });
        }
        if let Some(missing) = self
            .settings
            .fallback_plan
            .iter()
            .find(|t| !registry.contains(t))
        {
            return Err(ConfigError::Invalid {
                key: "workflow.fallback_tool".to_string(),
                reason: format!("tool '{missing}' is not registered"),
            });
        }

        let metrics = self.metrics.unwrap_or_else(|| Arc::new(Metrics::new()));
        let schema = registry.plan_schema();
        let dispatcher = Dispatcher::new(Arc::new(registry), self.settings.tool_timeout)
            .with_metrics(metrics.clone());

        tracing::info!(
            model = %self.settings.model,
            tools = ?schema.allowed(),
            max_iterations = self.settings.max_iterations,
            "workflow engine ready"
        );

        Ok(WorkflowEngine {
            llm,
            dispatcher,
            metrics,
            settings: self.settings,
            plan_retry: self.plan_retry,
            schema,
        })
    }
}
