//! 工具注册表
//!
//! 工具分同步（SyncTool）与异步（AsyncTool）两类，均以 &WorkflowState 为输入、
//! 返回 Result<String, ToolError>。ToolRegistry 按名注册与查找；
//! 用 BTreeMap 保存，工具列表与 Schema 枚举顺序稳定。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{ToolError, WorkflowState};
use crate::plan::PlanSchema;

/// 同步工具：在调度器当前上下文中直接调用
pub trait SyncTool: Send + Sync {
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    fn call(&self, state: &WorkflowState) -> Result<String, ToolError>;
}

/// 异步工具：由调度器并发 await
#[async_trait]
pub trait AsyncTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn call(&self, state: &WorkflowState) -> Result<String, ToolError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Sync,
    Async,
}

#[derive(Clone)]
pub enum ToolHandler {
    Sync(Arc<dyn SyncTool>),
    Async(Arc<dyn AsyncTool>),
}

/// 注册表中的一项
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub handler: ToolHandler,
}

impl ToolDescriptor {
    pub fn kind(&self) -> ToolKind {
        match self.handler {
            ToolHandler::Sync(_) => ToolKind::Sync,
            ToolHandler::Async(_) => ToolKind::Async,
        }
    }

    /// 用闭包构造同步工具
    pub fn from_fn<F>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(&WorkflowState) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        let name = name.into();
        let description = description.into();
        Self {
            handler: ToolHandler::Sync(Arc::new(FnTool {
                name: name.clone(),
                description: description.clone(),
                f,
            })),
            name,
            description,
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}

struct FnTool<F> {
    name: String,
    description: String,
    f: F,
}

impl<F> SyncTool for FnTool<F>
where
    F: Fn(&WorkflowState) -> Result<String, ToolError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn call(&self, state: &WorkflowState) -> Result<String, ToolError> {
        (self.f)(state)
    }
}

/// 工具注册表：按名称存储 ToolDescriptor
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册；同名覆盖
    pub fn register(&mut self, descriptor: ToolDescriptor) {
        if self.tools.contains_key(&descriptor.name) {
            tracing::warn!(tool = %descriptor.name, "tool re-registered, replacing previous handler");
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    pub fn register_sync(&mut self, tool: impl SyncTool + 'static) {
        self.register(ToolDescriptor {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            handler: ToolHandler::Sync(Arc::new(tool)),
        });
    }

    pub fn register_async(&mut self, tool: impl AsyncTool + 'static) {
        self.register(ToolDescriptor {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            handler: ToolHandler::Async(Arc::new(tool)),
        });
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的工具段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .values()
            .map(|d| (d.name.clone(), d.description.clone()))
            .collect()
    }

    /// 以当前注册的工具作为枚举的计划 Schema
    pub fn plan_schema(&self) -> PlanSchema {
        PlanSchema::planner(self.tools.keys().cloned())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
