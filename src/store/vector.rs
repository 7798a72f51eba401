//! 进程内向量存储：文档分块、哈希嵌入、余弦 + 关键词混合检索
//!
//! 嵌入器可替换（Embedder trait）；默认 HashingEmbedder 不依赖外部服务。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::VectorSection;
use crate::store::tokenizer;
use crate::store::{StoreError, VectorStore};

/// 文档块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// 来源文档 ID
    pub source_id: String,
    /// 在原文档中的字节偏移
    pub offset: usize,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source_id: source_id.into(),
            offset: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
            separators: ["\n\n", "\n", "。", ". ", "！", "？", "! ", "? ", " "]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl From<&VectorSection> for ChunkingConfig {
    fn from(section: &VectorSection) -> Self {
        Self {
            chunk_size: section.chunk_size.max(1),
            chunk_overlap: section.chunk_overlap,
            ..Self::default()
        }
    }
}

/// 文档分块器（UTF-8 安全）
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn chunk(&self, doc_id: &str, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let chunk_size = self.config.chunk_size.max(1);

        let mut current_idx = 0;
        let mut chunk_idx = 0;

        while current_idx < total_chars {
            let target_end = (current_idx + chunk_size).min(total_chars);
            let mut actual_end = target_end;

            // 未到文末时优先在分隔符处断开
            if target_end < total_chars {
                let slice: String = chars[current_idx..target_end].iter().collect();
                for sep in &self.config.separators {
                    if let Some(pos) = slice.rfind(sep.as_str()) {
                        let chars_to_sep = slice[..pos].chars().count() + sep.chars().count();
                        if chars_to_sep > 0 {
                            actual_end = current_idx + chars_to_sep;
                            break;
                        }
                    }
                }
            }

            if actual_end <= current_idx {
                actual_end = (current_idx + 1).min(total_chars);
            }

            let chunk_text: String = chars[current_idx..actual_end].iter().collect();
            let trimmed = chunk_text.trim();
            if !trimmed.is_empty() {
                let byte_offset: usize = chars[..current_idx].iter().map(|c| c.len_utf8()).sum();
                chunks.push(
                    Chunk::new(format!("{}_{}", doc_id, chunk_idx), trimmed, doc_id)
                        .with_offset(byte_offset),
                );
                chunk_idx += 1;
            }

            if actual_end >= total_chars {
                break;
            }
            let overlap = self.config.chunk_overlap.min(actual_end - current_idx);
            let next_start = actual_end.saturating_sub(overlap);
            current_idx = if next_start > current_idx {
                next_start
            } else {
                actual_end
            };
        }

        chunks
    }
}

/// 文本 → 向量
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;

    fn dimensions(&self) -> usize;
}

/// 特征哈希嵌入：每个词 FNV-1a 哈希到固定维度桶中计数，再做 L2 归一化
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenizer::tokenize(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// 检索结果
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
}

struct Entry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// 进程内向量存储；读写锁保护，search 可并发
pub struct MemoryVectorStore {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<Entry>>,
    max_entries: usize,
}

impl MemoryVectorStore {
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, max_entries: usize) -> Self {
        Self {
            chunker,
            embedder,
            entries: RwLock::new(Vec::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn with_defaults() -> Self {
        Self::from_config(&VectorSection::default())
    }

    pub fn from_config(section: &VectorSection) -> Self {
        Self::new(
            Chunker::new(ChunkingConfig::from(section)),
            Arc::new(HashingEmbedder::new(section.dimensions)),
            section.max_entries,
        )
    }

    /// 添加单个块；超出上限时丢弃最旧的
    pub fn add_chunk(&self, chunk: Chunk) -> Result<(), StoreError> {
        let embedding = self.embedder.embed(&chunk.text)?;
        if embedding.iter().all(|x| *x == 0.0) {
            tracing::debug!(chunk = %chunk.id, "chunk has no indexable tokens");
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push(Entry { chunk, embedding });
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(0..excess);
        }
        Ok(())
    }

    /// 索引文档：先删除同一来源的旧块，再分块写入；返回写入块数
    pub fn add_document(&self, doc_id: &str, text: &str) -> Result<usize, StoreError> {
        self.add_document_with_metadata(doc_id, text, &BTreeMap::new())
    }

    pub fn add_document_with_metadata(
        &self,
        doc_id: &str,
        text: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<usize, StoreError> {
        self.remove_by_source(doc_id);
        let chunks = self.chunker.chunk(doc_id, text);
        let mut added = 0;
        for mut chunk in chunks {
            chunk.metadata.extend(metadata.clone());
            self.add_chunk(chunk)?;
            added += 1;
        }
        Ok(added)
    }

    pub fn remove_by_source(&self, source_id: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|e| e.chunk.source_id != source_id);
    }

    pub fn chunks(&self) -> Vec<Chunk> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.chunk.clone())
            .collect()
    }

    /// 纯向量检索
    pub fn vector_search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>, StoreError> {
        let query_embedding = self.embedder.embed(query)?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<RetrievalResult> = entries
            .iter()
            .map(|e| RetrievalResult {
                score: cosine_similarity(&query_embedding, &e.embedding),
                chunk: e.chunk.clone(),
            })
            .filter(|r| r.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// 混合检索：向量检索与关键词 Jaccard 检索按 RRF 融合
    pub fn hybrid_search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector_results = self.vector_search(query, k * 2)?;

        let query_tokens = tokenizer::tokenize_to_set(query);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keyword_scored: Vec<(f32, &Chunk)> = entries
            .iter()
            .map(|e| {
                let chunk_tokens = tokenizer::tokenize_to_set(&e.chunk.text);
                (tokenizer::jaccard_similarity(&query_tokens, &chunk_tokens), &e.chunk)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();
        keyword_scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        const RRF_K: f32 = 60.0;
        let mut fused: HashMap<&str, (f32, &Chunk)> = HashMap::new();
        for (rank, result) in vector_results.iter().enumerate() {
            let slot = fused
                .entry(result.chunk.id.as_str())
                .or_insert((0.0, &result.chunk));
            slot.0 += 1.0 / (RRF_K + rank as f32);
        }
        for (rank, (_, chunk)) in keyword_scored.iter().take(k * 2).enumerate() {
            let slot = fused.entry(chunk.id.as_str()).or_insert((0.0, *chunk));
            slot.0 += 1.0 / (RRF_K + rank as f32);
        }

        let mut results: Vec<RetrievalResult> = fused
            .into_values()
            .map(|(score, chunk)| RetrievalResult {
                chunk: chunk.clone(),
                score,
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        results.truncate(k);
        Ok(results)
    }
}

impl VectorStore for MemoryVectorStore {
    fn search(&self, query: &str, k: usize) -> Result<Vec<String>, StoreError> {
        Ok(self
            .hybrid_search(query, k)?
            .into_iter()
            .map(|r| r.chunk.text)
            .collect())
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryVectorStore {
        let store = MemoryVectorStore::with_defaults();
        store
            .add_document("geo", "Paris is the capital and largest city of France.")
            .unwrap();
        store
            .add_document("lang", "Rust is a systems programming language focused on safety.")
            .unwrap();
        store
            .add_document("ml", "Machine learning is a subset of artificial intelligence.")
            .unwrap();
        store
    }

    #[test]
    fn test_chunking_respects_size_and_source() {
        let chunker = Chunker::new(ChunkingConfig {
            chunk_size: 20,
            chunk_overlap: 5,
            ..Default::default()
        });
        let text = "这是第一段话。这是第二句话。这是第三句话。\n\n这是第二段。这里有更多内容。";
        let chunks = chunker.chunk("doc1", text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 20);
            assert_eq!(chunk.source_id, "doc1");
        }
    }

    #[test]
    fn test_chunk_empty_text() {
        assert!(Chunker::default().chunk("d", "").is_empty());
    }

    #[test]
    fn test_hashing_embedder_normalized_and_deterministic() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("capital of France").unwrap();
        let b = e.embed("capital of France").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(e.embed("").unwrap().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_search_ranks_relevant_first() {
        let hits = store().search("What is the capital of France?", 2).unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].contains("Paris"));
    }

    #[test]
    fn test_search_empty_cases() {
        assert!(MemoryVectorStore::with_defaults()
            .search("France", 3)
            .unwrap()
            .is_empty());
        assert!(store().search("France", 0).unwrap().is_empty());
    }

    #[test]
    fn test_reindex_replaces_source_and_cap() {
        let s = MemoryVectorStore::new(Chunker::default(), Arc::new(HashingEmbedder::new(32)), 2);
        s.add_document("a", "first version").unwrap();
        s.add_document("a", "second version").unwrap();
        assert_eq!(VectorStore::len(&s), 1);
        s.add_document("b", "bee").unwrap();
        s.add_document("c", "sea").unwrap();
        assert_eq!(VectorStore::len(&s), 2);
        assert!(s.chunks().iter().all(|c| c.source_id != "a"));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-3);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-3);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
