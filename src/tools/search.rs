//! 向量检索工具：vector_search（同步）与 vector_search_async（异步，存储调用放到阻塞线程池）
//!
//! 命中结果按相似度排序、以换行拼接；无命中时返回明确的提示行。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{ToolError, WorkflowState};
use crate::store::VectorStore;
use crate::tools::registry::{AsyncTool, SyncTool};

pub const VECTOR_SEARCH: &str = "vector_search";
pub const VECTOR_SEARCH_ASYNC: &str = "vector_search_async";

/// 无命中时的输出
pub const NO_DOCUMENTS: &str = "No relevant documents found.";

fn render(hits: Vec<String>) -> String {
    if hits.is_empty() {
        NO_DOCUMENTS.to_string()
    } else {
        hits.join("\n")
    }
}

pub struct VectorSearchTool {
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl VectorSearchTool {
    pub fn new(store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }
}

impl SyncTool for VectorSearchTool {
    fn name(&self) -> &str {
        VECTOR_SEARCH
    }

    fn description(&self) -> &str {
        "Semantic similarity search over ingested documents. Best for factual or descriptive questions."
    }

    fn call(&self, state: &WorkflowState) -> Result<String, ToolError> {
        self.store
            .search(state.search_text(), self.top_k)
            .map(render)
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

pub struct AsyncVectorSearchTool {
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl AsyncVectorSearchTool {
    pub fn new(store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }
}

#[async_trait]
impl AsyncTool for AsyncVectorSearchTool {
    fn name(&self) -> &str {
        VECTOR_SEARCH_ASYNC
    }

    fn description(&self) -> &str {
        "Same as vector_search, but runs concurrently with other async tools."
    }

    async fn call(&self, state: &WorkflowState) -> Result<String, ToolError> {
        let store = self.store.clone();
        let query = state.search_text().to_string();
        let k = self.top_k;
        tokio::task::spawn_blocking(move || store.search(&query, k))
            .await
            .map_err(|e| ToolError::Panicked(e.to_string()))?
            .map(render)
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryVectorStore, StoreError};

    struct Down;

    impl VectorStore for Down {
        fn search(&self, _query: &str, _k: usize) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("vector index offline".to_string()))
        }
        fn len(&self) -> usize {
            0
        }
    }

    fn store() -> Arc<dyn VectorStore> {
        let store = MemoryVectorStore::with_defaults();
        store
            .add_document("geo", "Paris is the capital of France.")
            .unwrap();
        store
            .add_document("ml", "Machine learning is a subset of AI.")
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_sync_search_uses_sanitized_query() {
        let tool = VectorSearchTool::new(store(), 1);
        let mut state = WorkflowState::new("ignored raw text");
        state.sanitized_query = Some("capital of France".to_string());
        assert_eq!(tool.call(&state).unwrap(), "Paris is the capital of France.");
    }

    #[test]
    fn test_results_joined_with_newline() {
        let tool = VectorSearchTool::new(store(), 5);
        let out = tool.call(&WorkflowState::new("France machine learning")).unwrap();
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn test_empty_query_reports_no_documents() {
        let tool = VectorSearchTool::new(store(), 5);
        assert_eq!(tool.call(&WorkflowState::new("")).unwrap(), NO_DOCUMENTS);
    }

    #[tokio::test]
    async fn test_async_search() {
        let tool = AsyncVectorSearchTool::new(store(), 1);
        let out = tool.call(&WorkflowState::new("What is the capital of France?")).await;
        assert!(out.unwrap().contains("Paris"));
    }

    #[tokio::test]
    async fn test_store_error_is_tool_failure() {
        let state = WorkflowState::new("q");
        let err = VectorSearchTool::new(Arc::new(Down), 3).call(&state).unwrap_err();
        assert_eq!(err, ToolError::Failed("store unavailable: vector index offline".to_string()));
        let err = AsyncVectorSearchTool::new(Arc::new(Down), 3)
            .call(&state)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }
}
