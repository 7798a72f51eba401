//! 工作流引擎
//!
//! 状态机：PLAN → DISPATCH → VALIDATE → (SYNTHESIZE | 强制结束) → DONE。
//! 除入口状态校验外，所有失败都在节点内部吸收：规划失败用兜底计划，工具失败写诊断文本，
//! 合成失败用成功的工具输出拼出降级回复。引擎总是返回一个终态 WorkflowState。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{PlanError, RetryPolicy, WorkflowError, WorkflowEvent, WorkflowState};
use crate::llm::{Completion, LlmClient, LlmError};
use crate::observability::Metrics;
use crate::plan::{decode, sanitize_query, PlanDocument, PlanSchema};
use crate::tools::{is_diagnostic, Dispatcher};
use crate::workflow::prompts;

use crate::workflow::builder::WorkflowEngineBuilder;

/// 无可用答案时回复的前缀
pub const ERROR_MARKER: &str = "[chimera:error]";

/// 引擎参数
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub model: String,
    /// 迭代上限：iteration 超过它即强制结束
    pub max_iterations: u32,
    pub max_query_chars: usize,
    /// 规划重试耗尽后使用的计划
    pub fallback_plan: Vec<String>,
    pub tool_timeout: Duration,
    pub model_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            model: cfg.llm.model.clone(),
            max_iterations: cfg.workflow.max_iterations,
            max_query_chars: cfg.workflow.max_query_chars,
            fallback_plan: vec![cfg.workflow.fallback_tool.clone()],
            tool_timeout: Duration::from_secs(cfg.tools.tool_timeout_secs),
            model_timeout: Duration::from_secs(cfg.llm.timeouts.request),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Node {
    Plan,
    Dispatch,
    Validate,
    Synthesize,
    Done,
}

/// VALIDATE 之后的路由：iteration 未超过上限则合成，否则强制结束
pub(crate) fn route_after_validate(iteration: u32, ceiling: u32) -> Node {
    if iteration > ceiling {
        Node::Done
    } else {
        Node::Synthesize
    }
}

/// 从工具输出拼出降级回复：只取成功的输出；全部失败时返回 ERROR_MARKER 开头的说明
pub fn fallback_response(tool_output: &[String], reason: &str) -> String {
    let successes: Vec<&str> = tool_output
        .iter()
        .map(String::as_str)
        .filter(|o| !is_diagnostic(o) && !o.trim().is_empty())
        .collect();
    if successes.is_empty() {
        format!("{ERROR_MARKER} No answer could be produced: {reason}")
    } else {
        successes.join(prompts::TOOL_OUTPUT_DELIMITER)
    }
}

pub struct WorkflowEngine {
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) settings: EngineSettings,
    pub(crate) plan_retry: RetryPolicy,
    pub(crate) schema: PlanSchema,
}

impl WorkflowEngine {
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// 以新状态执行一次请求
    pub async fn invoke(&self, query: impl Into<String>) -> Result<WorkflowState, WorkflowError> {
        self.run(WorkflowState::new(query)).await
    }

    /// 执行状态机直到 DONE；只有入口状态不合法时返回 Err
    pub async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        state.check_fresh()?;
        self.metrics.record_request();
        let _total = self.metrics.start_timer("workflow.total");
        tracing::info!(request_id = %state.request_id, iteration = state.iteration, "workflow started");

        let mut node = Node::Plan;
        loop {
            if node != Node::Done && state.cancel.is_cancelled() {
                tracing::warn!(request_id = %state.request_id, ?node, "workflow cancelled");
                node = Node::Done;
            }
            tracing::debug!(request_id = %state.request_id, ?node, "entering node");
            node = match node {
                Node::Plan => {
                    self.plan(&mut state).await;
                    Node::Dispatch
                }
                Node::Dispatch => {
                    self.dispatch(&mut state).await;
                    Node::Validate
                }
                Node::Validate => self.validate(&mut state),
                Node::Synthesize => {
                    self.synthesize(&mut state).await;
                    Node::Done
                }
                Node::Done => break,
            };
        }

        if state.response.is_empty() {
            let reason = if state.cancel.is_cancelled() {
                "request cancelled"
            } else {
                "iteration limit reached before synthesis"
            };
            state.response = fallback_response(&state.tool_output, reason);
        }

        if state.response.starts_with(ERROR_MARKER) {
            self.metrics.error_count("workflow_no_answer", 1);
        } else {
            self.metrics.record_success();
        }
        tracing::info!(
            request_id = %state.request_id,
            iteration = state.iteration,
            tools = state.plan.len(),
            "workflow finished"
        );
        Ok(state)
    }

    /// 同步入口：在独立线程上的单线程运行时中执行
    pub fn run_blocking(&self, state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        std::thread::scope(|scope| {
            let worker = scope.spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| WorkflowError::InvalidInput(format!("runtime unavailable: {e}")))?;
                rt.block_on(self.run(state))
            });
            worker.join().unwrap_or_else(|_| {
                Err(WorkflowError::InvalidInput(
                    "workflow thread panicked".to_string(),
                ))
            })
        })
    }

    async fn plan(&self, state: &mut WorkflowState) {
        let _t = self.metrics.start_timer("workflow.plan");
        let sanitized = sanitize_query(&state.query, self.settings.max_query_chars);
        let prompt = prompts::planning_prompt(
            &sanitized,
            &self.dispatcher.registry().tool_descriptions(),
            &self.schema.json_schema(),
        );
        state.sanitized_query = Some(sanitized);

        let cancel = state.cancel.clone();
        let attempt = self.plan_retry.run(|| self.request_plan(&prompt, &cancel));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PlanError::Model(LlmError::Cancelled)),
            r = attempt => r,
        };

        match result {
            Ok(doc) => {
                tracing::info!(request_id = %state.request_id, plan = ?doc.plan, "plan generated");
                state.plan = doc.into_plan();
                state.emit(WorkflowEvent::PlanningComplete);
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %state.request_id,
                    error = %e,
                    fallback = ?self.settings.fallback_plan,
                    "planning failed, using fallback plan"
                );
                self.metrics.increment("plan_fallback", 1);
                state.plan = self.settings.fallback_plan.clone();
            }
        }
        self.metrics.histogram("plan.length", state.plan.len() as f64);
    }

    /// 一次「模型调用 + 解码」；解码失败同样触发重试
    async fn request_plan(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<PlanDocument, PlanError> {
        let completion = self.call_model(prompt, cancel).await?;
        let doc = decode(&completion.text, &self.schema).map_err(|e| {
            tracing::debug!(error = %e, raw = %completion.text, "plan rejected");
            e
        })?;
        Ok(doc)
    }

    async fn call_model(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Completion, LlmError> {
        let _t = self.metrics.start_timer("llm.generate");
        let call = self.llm.generate(&self.settings.model, prompt);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            r = tokio::time::timeout(self.settings.model_timeout, call) => match r {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.settings.model_timeout.as_secs())),
            },
        }
    }

    async fn dispatch(&self, state: &mut WorkflowState) {
        let _t = self.metrics.start_timer("workflow.dispatch");
        let outputs = self.dispatcher.dispatch(&state.plan, state).await;
        state.tool_output = outputs;
    }

    fn validate(&self, state: &mut WorkflowState) -> Node {
        state.iteration = state.iteration.saturating_add(1);
        let next = route_after_validate(state.iteration, self.settings.max_iterations);
        if next == Node::Done {
            tracing::warn!(
                request_id = %state.request_id,
                iteration = state.iteration,
                "max iterations reached, finishing"
            );
            self.metrics.increment("workflow.forced_termination", 1);
        } else {
            tracing::info!(request_id = %state.request_id, "plan execution complete, proceeding to synthesize");
        }
        next
    }

    async fn synthesize(&self, state: &mut WorkflowState) {
        let _t = self.metrics.start_timer("workflow.synthesize");
        state.emit(WorkflowEvent::SynthStart);
        let prompt = prompts::synthesis_prompt(state.search_text(), &state.tool_output);

        match self.call_model(&prompt, &state.cancel).await {
            Ok(c) if !c.text.trim().is_empty() => {
                state.response = c.text.trim().to_string();
            }
            Ok(_) => {
                tracing::warn!(request_id = %state.request_id, "model returned empty answer");
                state.response = fallback_response(&state.tool_output, "model returned empty answer");
            }
            Err(e) => {
                tracing::warn!(request_id = %state.request_id, error = %e, "synthesis failed, degrading response");
                self.metrics.increment("synth_fallback", 1);
                state.response = fallback_response(&state.tool_output, &e.to_string());
            }
        }
        state.emit(WorkflowEvent::AnswerReady);
    }
}
