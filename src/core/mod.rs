//! 核心层：错误分类、重试策略、工作流状态与进度事件

pub mod error;
pub mod events;
pub mod retry;
pub mod state;

pub use error::{ConfigError, PlanError, ToolError, WorkflowError};
pub use events::{progress_channel, ProgressFn, WorkflowEvent, ANSWER_READY};
pub use retry::RetryPolicy;
pub use state::WorkflowState;
