//! 图检索工具：graph_search（同步）与 graph_search_async（异步）
//!
//! 每条记录渲染为一行紧凑 JSON。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::core::{ToolError, WorkflowState};
use crate::store::{GraphStore, Record};
use crate::tools::registry::{AsyncTool, SyncTool};

pub const GRAPH_SEARCH: &str = "graph_search";
pub const GRAPH_SEARCH_ASYNC: &str = "graph_search_async";

/// 无命中时的输出
pub const NO_ENTITIES: &str = "No related entities found.";

fn params(limit: usize) -> Record {
    let mut p = Record::new();
    p.insert("limit".to_string(), json!(limit));
    p
}

fn render(records: Vec<Record>) -> String {
    if records.is_empty() {
        return NO_ENTITIES.to_string();
    }
    records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct GraphSearchTool {
    store: Arc<dyn GraphStore>,
    limit: usize,
}

impl GraphSearchTool {
    pub fn new(store: Arc<dyn GraphStore>, limit: usize) -> Self {
        Self { store, limit }
    }
}

impl SyncTool for GraphSearchTool {
    fn name(&self) -> &str {
        GRAPH_SEARCH
    }

    fn description(&self) -> &str {
        "Look up named entities and their relationships in the knowledge graph."
    }

    fn call(&self, state: &WorkflowState) -> Result<String, ToolError> {
        self.store
            .query(state.search_text(), &params(self.limit))
            .map(render)
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

pub struct AsyncGraphSearchTool {
    store: Arc<dyn GraphStore>,
    limit: usize,
}

impl AsyncGraphSearchTool {
    pub fn new(store: Arc<dyn GraphStore>, limit: usize) -> Self {
        Self { store, limit }
    }
}

#[async_trait]
impl AsyncTool for AsyncGraphSearchTool {
    fn name(&self) -> &str {
        GRAPH_SEARCH_ASYNC
    }

    fn description(&self) -> &str {
        "Same as graph_search, but runs concurrently with other async tools."
    }

    async fn call(&self, state: &WorkflowState) -> Result<String, ToolError> {
        let store = self.store.clone();
        let query = state.search_text().to_string();
        let p = params(self.limit);
        tokio::task::spawn_blocking(move || store.query(&query, &p))
            .await
            .map_err(|e| ToolError::Panicked(e.to_string()))?
            .map(render)
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGraphStore;

    fn store() -> Arc<dyn GraphStore> {
        let g = MemoryGraphStore::new();
        g.upsert_entity("Paris", "Entity", "geo.md");
        g.upsert_entity("France", "Entity", "geo.md");
        g.relate("Paris", "France", "MENTIONED_WITH");
        Arc::new(g)
    }

    #[test]
    fn test_graph_search_renders_records() {
        let out = GraphSearchTool::new(store(), 5)
            .call(&WorkflowState::new("Where is Paris?"))
            .unwrap();
        assert_eq!(out.lines().count(), 1);
        let record: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(record["name"], "Paris");
        assert_eq!(record["related"][0], "France");
    }

    #[test]
    fn test_graph_search_no_entities() {
        let out = GraphSearchTool::new(store(), 5)
            .call(&WorkflowState::new("nothing relevant"))
            .unwrap();
        assert_eq!(out, NO_ENTITIES);
    }

    #[tokio::test]
    async fn test_graph_search_async() {
        let out = AsyncGraphSearchTool::new(store(), 1)
            .call(&WorkflowState::new("Paris France"))
            .await
            .unwrap();
        assert_eq!(out.lines().count(), 1);
    }
}
