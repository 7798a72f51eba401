//! 检索存储：向量相似度存储与实体图存储，以及离线导入与 JSON 快照
//!
//! 工具只依赖 VectorStore / GraphStore 两个 trait；进程内实现见 vector.rs / graph.rs。

pub mod graph;
pub mod ingest;
pub mod tokenizer;
pub mod vector;

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use graph::{Entity, MemoryGraphStore, Relation};
pub use ingest::{ingest_dir, IngestReport};
pub use vector::{Chunk, Chunker, ChunkingConfig, Embedder, HashingEmbedder, MemoryVectorStore};

/// 图查询返回的一条记录
pub type Record = Map<String, Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("invalid query parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// 向量相似度检索
pub trait VectorStore: Send + Sync {
    /// 返回与 query 最相似的至多 k 段文本
    fn search(&self, query: &str, k: usize) -> Result<Vec<String>, StoreError>;

    /// 已索引条目数
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 图查询
pub trait GraphStore: Send + Sync {
    /// 按文本查询相关实体；params 支持 "limit"
    fn query(&self, query_text: &str, params: &Record) -> Result<Vec<Record>, StoreError>;

    /// 实体数
    fn entity_count(&self) -> usize;
}

/// 两个存储的 JSON 快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl StoreSnapshot {
    pub fn capture(vector: &MemoryVectorStore, graph: &MemoryGraphStore) -> Self {
        let (entities, relations) = graph.export();
        Self {
            chunks: vector.chunks(),
            entities,
            relations,
        }
    }

    /// 写入 path（先写临时文件再 rename）
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.partial");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        tracing::info!(
            path = %path.display(),
            chunks = self.chunks.len(),
            entities = self.entities.len(),
            "store snapshot saved"
        );
        Ok(())
    }

    /// 文件不存在时返回空快照
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 把快照内容灌回存储
    pub fn restore_into(
        self,
        vector: &MemoryVectorStore,
        graph: &MemoryGraphStore,
    ) -> Result<(), StoreError> {
        for chunk in self.chunks {
            vector.add_chunk(chunk)?;
        }
        graph.import(self.entities, self.relations);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_save_load_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index").join("store.json");

        let vector = MemoryVectorStore::with_defaults();
        vector
            .add_document("doc1", "Paris is the capital of France.")
            .unwrap();
        let graph = MemoryGraphStore::new();
        graph.upsert_entity("Paris", "Entity", "doc1");
        graph.upsert_entity("France", "Entity", "doc1");
        graph.relate("Paris", "France", "MENTIONED_WITH");

        StoreSnapshot::capture(&vector, &graph).save(&path).unwrap();

        let restored_vector = MemoryVectorStore::with_defaults();
        let restored_graph = MemoryGraphStore::new();
        StoreSnapshot::load(&path)
            .unwrap()
            .restore_into(&restored_vector, &restored_graph)
            .unwrap();

        assert_eq!(VectorStore::len(&restored_vector), 1);
        assert_eq!(restored_graph.entity_count(), 2);
        let hits = restored_vector.search("capital of France", 3).unwrap();
        assert!(hits[0].contains("Paris"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snap = StoreSnapshot::load(&dir.path().join("nope.json")).unwrap();
        assert!(snap.chunks.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(StoreSnapshot::load(&path), Err(StoreError::Serde(_))));
    }
}
