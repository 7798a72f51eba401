//! 工具调度器
//!
//! 按计划顺序先就地执行同步工具，再并发执行全部异步工具（fan-out / fan-in），
//! 结果按原计划顺序回填，保证 `outputs.len() == plan.len()`。
//! 单个工具的任何失败（返回错误、panic、超时、取消、未知 ID）都转为诊断文本
//! "Error executing <id>: <message>"，不影响其余工具。每次调用输出结构化审计日志（JSON）。

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use futures_util::FutureExt;

use crate::core::{ToolError, WorkflowEvent, WorkflowState};
use crate::observability::Metrics;
use crate::tools::registry::{AsyncTool, SyncTool, ToolHandler, ToolRegistry};

/// 诊断文本前缀
pub const ERROR_PREFIX: &str = "Error executing";

pub fn diagnostic(tool: &str, err: &ToolError) -> String {
    format!("{ERROR_PREFIX} {tool}: {err}")
}

pub fn is_diagnostic(output: &str) -> bool {
    output.starts_with(ERROR_PREFIX)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行整份计划，返回与 plan 等长、同序的输出
    pub async fn dispatch(&self, plan: &[String], state: &WorkflowState) -> Vec<String> {
        let mut slots: Vec<Option<String>> = vec![None; plan.len()];
        let mut pending: Vec<(usize, &str, Arc<dyn AsyncTool>)> = Vec::new();

        for (idx, id) in plan.iter().enumerate() {
            let handler = self.registry.get(id).map(|d| d.handler.clone());
            match handler {
                Some(ToolHandler::Async(tool)) => pending.push((idx, id.as_str(), tool)),
                Some(ToolHandler::Sync(tool)) => {
                    state.emit(WorkflowEvent::ToolStart(id.clone()));
                    let start = Instant::now();
                    let result = self.run_sync(tool.as_ref(), state);
                    slots[idx] = Some(self.finish(id, result, start));
                    state.emit(WorkflowEvent::ToolDone(id.clone()));
                }
                None => {
                    state.emit(WorkflowEvent::ToolStart(id.clone()));
                    slots[idx] = Some(self.finish(id, Err(ToolError::UnknownTool), Instant::now()));
                    state.emit(WorkflowEvent::ToolDone(id.clone()));
                }
            }
        }

        let runs = pending.into_iter().map(|(idx, id, tool)| async move {
            state.emit(WorkflowEvent::ToolStart(id.to_string()));
            let start = Instant::now();
            let result = self.run_async(tool.as_ref(), state).await;
            let output = self.finish(id, result, start);
            state.emit(WorkflowEvent::ToolDone(id.to_string()));
            (idx, output)
        });
        for (idx, output) in join_all(runs).await {
            slots[idx] = Some(output);
        }

        slots
            .into_iter()
            .zip(plan)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| diagnostic(id, &ToolError::Failed("no output".to_string())))
            })
            .collect()
    }

    /// 同步入口：在独立线程上的单线程运行时里执行，不占用调用方的事件循环
    pub fn dispatch_blocking(&self, plan: &[String], state: &WorkflowState) -> Vec<String> {
        std::thread::scope(|scope| {
            let worker = scope.spawn(|| {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt.block_on(self.dispatch(plan, state)),
                    Err(e) => {
                        let err = ToolError::Failed(format!("runtime unavailable: {e}"));
                        plan.iter().map(|id| diagnostic(id, &err)).collect()
                    }
                }
            });
            worker.join().unwrap_or_else(|payload| {
                let err = ToolError::Panicked(panic_message(payload));
                plan.iter().map(|id| diagnostic(id, &err)).collect()
            })
        })
    }

    fn run_sync(&self, tool: &dyn SyncTool, state: &WorkflowState) -> Result<String, ToolError> {
        if state.cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        catch_unwind(AssertUnwindSafe(|| tool.call(state)))
            .unwrap_or_else(|payload| Err(ToolError::Panicked(panic_message(payload))))
    }

    async fn run_async(
        &self,
        tool: &dyn AsyncTool,
        state: &WorkflowState,
    ) -> Result<String, ToolError> {
        let call = AssertUnwindSafe(tool.call(state)).catch_unwind();
        tokio::select! {
            biased;
            _ = state.cancel.cancelled() => Err(ToolError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, call) => match outcome {
                Err(_) => Err(ToolError::Timeout(self.timeout)),
                Ok(Err(payload)) => Err(ToolError::Panicked(panic_message(payload))),
                Ok(Ok(result)) => result,
            },
        }
    }

    /// 审计日志 + 指标，并把结果转为输出文本
    fn finish(&self, tool: &str, result: Result<String, ToolError>, start: Instant) -> String {
        let duration = start.elapsed();
        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Timeout(_)) => "timeout",
            Err(ToolError::Cancelled) => "cancelled",
            Err(ToolError::Panicked(_)) => "panic",
            Err(ToolError::UnknownTool) => "unknown",
            Err(ToolError::Failed(_)) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": duration.as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        if let Some(metrics) = &self.metrics {
            metrics.timing(&format!("tool.{tool}"), duration.as_secs_f64() * 1000.0);
            metrics.increment(&format!("tool.{tool}.{outcome}"), 1);
        }

        match result {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(tool, error = %err, "tool failed");
                diagnostic(tool, &err)
            }
        }
    }
}
