//! 工具箱：注册表、调度器与内置检索工具（向量 / 图，各有同步与异步版本）

pub mod dispatcher;
pub mod graph;
pub mod registry;
pub mod search;

use std::sync::Arc;

pub use dispatcher::{diagnostic, is_diagnostic, Dispatcher, ERROR_PREFIX};
pub use graph::{
    AsyncGraphSearchTool, GraphSearchTool, GRAPH_SEARCH, GRAPH_SEARCH_ASYNC, NO_ENTITIES,
};
pub use registry::{AsyncTool, SyncTool, ToolDescriptor, ToolHandler, ToolKind, ToolRegistry};
pub use search::{
    AsyncVectorSearchTool, VectorSearchTool, NO_DOCUMENTS, VECTOR_SEARCH, VECTOR_SEARCH_ASYNC,
};

use crate::store::{GraphStore, VectorStore};

/// 注册四个内置检索工具
pub fn default_registry(
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    top_k: usize,
) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register_sync(VectorSearchTool::new(vector.clone(), top_k));
    tools.register_async(AsyncVectorSearchTool::new(vector, top_k));
    tools.register_sync(GraphSearchTool::new(graph.clone(), top_k));
    tools.register_async(AsyncGraphSearchTool::new(graph, top_k));
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryGraphStore, MemoryVectorStore};

    #[test]
    fn test_default_registry_has_builtin_tools() {
        let tools = default_registry(
            Arc::new(MemoryVectorStore::with_defaults()),
            Arc::new(MemoryGraphStore::new()),
            5,
        );
        assert_eq!(
            tools.tool_names(),
            vec![GRAPH_SEARCH, GRAPH_SEARCH_ASYNC, VECTOR_SEARCH, VECTOR_SEARCH_ASYNC]
        );
        assert_eq!(tools.get(VECTOR_SEARCH).unwrap().kind(), ToolKind::Sync);
        assert_eq!(tools.get(GRAPH_SEARCH_ASYNC).unwrap().kind(), ToolKind::Async);
    }
}
