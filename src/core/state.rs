//! WorkflowState：单次请求在各节点之间传递的可变记录
//!
//! 每个请求新建一个（iteration = 0，plan / tool_output / response 为空），
//! 由一次引擎调用独占，返回后即丢弃，不跨请求持久化。

use std::fmt;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::events::{notify, ProgressFn, WorkflowEvent};
use crate::core::WorkflowError;

/// 单次请求的工作流状态
#[derive(Clone)]
pub struct WorkflowState {
    /// 请求 ID（日志关联用）
    pub request_id: String,
    /// 原始查询
    pub query: String,
    /// PLAN 节点清洗后的查询；工具优先使用它
    pub sanitized_query: Option<String>,
    /// 有序工具 ID 列表
    pub plan: Vec<String>,
    /// 每个已尝试工具一条输出（失败为诊断文本）
    pub tool_output: Vec<String>,
    /// 最终回复
    pub response: String,
    /// 已完成的 Plan→Dispatch→Validate 轮数
    pub iteration: u32,
    /// 可选进度回调
    pub progress: Option<ProgressFn>,
    /// 取消令牌：取消后剩余节点、工具与模型调用尽快结束
    pub cancel: CancellationToken,
}

impl WorkflowState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            request_id: format!("req_{}", Uuid::new_v4()),
            query: query.into(),
            sanitized_query: None,
            plan: Vec::new(),
            tool_output: Vec::new(),
            response: String::new(),
            iteration: 0,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self
    }

    /// 工具检索使用的文本：清洗后的查询，未经过 PLAN 时退回原始查询
    pub fn search_text(&self) -> &str {
        self.sanitized_query.as_deref().unwrap_or(&self.query)
    }

    pub fn emit(&self, event: WorkflowEvent) {
        notify(self.progress.as_ref(), event);
    }

    /// 入口前置条件：状态必须是新的（未写入 tool_output / response）
    pub fn check_fresh(&self) -> Result<(), WorkflowError> {
        if !self.tool_output.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "tool_output must be empty on entry".to_string(),
            ));
        }
        if !self.response.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "response must be empty on entry".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowState")
            .field("request_id", &self.request_id)
            .field("query", &self.query)
            .field("sanitized_query", &self.sanitized_query)
            .field("plan", &self.plan)
            .field("tool_output", &self.tool_output)
            .field("response", &self.response)
            .field("iteration", &self.iteration)
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_fresh() {
        let state = WorkflowState::new("What is AI?");
        assert_eq!(state.iteration, 0);
        assert!(state.plan.is_empty());
        assert!(state.tool_output.is_empty());
        assert!(state.response.is_empty());
        assert!(state.request_id.starts_with("req_"));
        assert!(state.check_fresh().is_ok());
    }

    #[test]
    fn test_reused_state_rejected() {
        let mut state = WorkflowState::new("q");
        state.response = "old answer".to_string();
        assert!(matches!(state.check_fresh(), Err(WorkflowError::InvalidInput(_))));

        let mut state = WorkflowState::new("q");
        state.tool_output.push("stale".to_string());
        assert!(state.check_fresh().is_err());
    }

    #[test]
    fn test_search_text_prefers_sanitized() {
        let mut state = WorkflowState::new("raw query");
        assert_eq!(state.search_text(), "raw query");
        state.sanitized_query = Some("clean".to_string());
        assert_eq!(state.search_text(), "clean");
    }

    #[test]
    fn test_debug_hides_callback() {
        let state = WorkflowState::new("q");
        let dbg = format!("{:?}", state);
        assert!(dbg.contains("progress: false"));
    }
}
