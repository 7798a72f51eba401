//! 工作流进度事件：规划完成、工具开始/结束、合成开始、答案就绪
//!
//! 观察者回调由引擎同步调用，必须自身保证不阻塞；缓冲与展示是观察者的责任。

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

/// 最终「答案就绪」事件的文本
pub const ANSWER_READY: &str = "Answer ready ✨";

/// 单个进度事件；Display 输出即观察者看到的事件字符串
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "tool", rename_all = "snake_case")]
pub enum WorkflowEvent {
    PlanningComplete,
    ToolStart(String),
    ToolDone(String),
    SynthStart,
    AnswerReady,
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowEvent::PlanningComplete => f.write_str("planning_complete"),
            WorkflowEvent::ToolStart(id) => write!(f, "tool_start:{id}"),
            WorkflowEvent::ToolDone(id) => write!(f, "tool_done:{id}"),
            WorkflowEvent::SynthStart => f.write_str("synth_start"),
            WorkflowEvent::AnswerReady => f.write_str(ANSWER_READY),
        }
    }
}

/// 进度回调
pub type ProgressFn = Arc<dyn Fn(&WorkflowEvent) + Send + Sync>;

/// 调用观察者；观察者 panic 不影响引擎
pub(crate) fn notify(observer: Option<&ProgressFn>, event: WorkflowEvent) {
    if let Some(cb) = observer {
        if catch_unwind(AssertUnwindSafe(|| cb(&event))).is_err() {
            tracing::warn!(event = %event, "progress observer panicked");
        }
    }
}

/// 将回调接到无界通道上：引擎侧 send 永不阻塞，接收端自行消费
pub fn progress_channel() -> (ProgressFn, mpsc::UnboundedReceiver<WorkflowEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cb: ProgressFn = Arc::new(move |ev: &WorkflowEvent| {
        let _ = tx.send(ev.clone());
    });
    (cb, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_event_strings() {
        assert_eq!(WorkflowEvent::PlanningComplete.to_string(), "planning_complete");
        assert_eq!(
            WorkflowEvent::ToolStart("vector_search".into()).to_string(),
            "tool_start:vector_search"
        );
        assert_eq!(
            WorkflowEvent::ToolDone("graph_search".into()).to_string(),
            "tool_done:graph_search"
        );
        assert_eq!(WorkflowEvent::SynthStart.to_string(), "synth_start");
        assert_eq!(WorkflowEvent::AnswerReady.to_string(), ANSWER_READY);
    }

    #[test]
    fn test_panicking_observer_is_contained() {
        let cb: ProgressFn = Arc::new(|_ev: &WorkflowEvent| panic!("observer bug"));
        notify(Some(&cb), WorkflowEvent::SynthStart);
    }

    #[test]
    fn test_notify_without_observer() {
        notify(None, WorkflowEvent::PlanningComplete);
    }

    #[test]
    fn test_callback_receives_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: ProgressFn = Arc::new(move |ev: &WorkflowEvent| {
            sink.lock().unwrap().push(ev.to_string());
        });
        notify(Some(&cb), WorkflowEvent::ToolStart("a".into()));
        notify(Some(&cb), WorkflowEvent::ToolDone("a".into()));
        assert_eq!(*seen.lock().unwrap(), vec!["tool_start:a", "tool_done:a"]);
    }

    #[tokio::test]
    async fn test_progress_channel() {
        let (cb, mut rx) = progress_channel();
        notify(Some(&cb), WorkflowEvent::PlanningComplete);
        notify(Some(&cb), WorkflowEvent::AnswerReady);
        assert_eq!(rx.recv().await, Some(WorkflowEvent::PlanningComplete));
        assert_eq!(rx.recv().await, Some(WorkflowEvent::AnswerReady));
    }
}
