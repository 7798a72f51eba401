//! 离线导入：遍历目录，把文本文档写入向量存储，并抽取实体与共现关系写入图存储
//!
//! 支持 .md / .markdown / .txt；跳过 .tmp 与隐藏文件；Markdown 头部的 `---` front matter
//! 以 `key: value` 形式并入块元数据。

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use crate::store::{MemoryGraphStore, MemoryVectorStore, StoreError};

/// 共现关系类型
pub const MENTIONED_WITH: &str = "MENTIONED_WITH";

const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// 句首常见大写虚词，不视为实体
const NON_ENTITIES: &[&str] = &[
    "A", "An", "And", "As", "At", "But", "By", "For", "From", "He", "How", "I", "If", "In", "It",
    "Its", "No", "Not", "Of", "On", "Or", "She", "So", "That", "The", "There", "These", "They",
    "This", "To", "We", "What", "When", "Where", "Which", "Who", "Why", "With", "You",
];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files: usize,
    pub skipped: usize,
    pub chunks: usize,
    pub entities: usize,
    pub relations: usize,
}

/// 去掉 `---` 包裹的 front matter，返回 (元数据, 正文)
pub fn split_front_matter(content: &str) -> (BTreeMap<String, String>, &str) {
    let mut metadata = BTreeMap::new();
    let Some(rest) = content.strip_prefix("---") else {
        return (metadata, content);
    };
    let Some(end) = rest.find("\n---") else {
        return (metadata, content);
    };
    for line in rest[..end].lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                metadata.insert(
                    key.to_string(),
                    value.trim().trim_matches('"').to_string(),
                );
            }
        }
    }
    // 跳过闭合 `---` 所在行的剩余部分
    let body = rest[end + 4..]
        .split_once('\n')
        .map(|(_, b)| b)
        .unwrap_or("");
    (metadata, body.trim())
}

fn entity_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][\w'-]*(?:\s+[A-Z][\w'-]*)*").ok())
        .as_ref()
}

/// 抽取大写开头的词组作为实体（去重，保持首次出现顺序）
pub fn extract_entities(text: &str) -> Vec<String> {
    let Some(re) = entity_pattern() else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for m in re.find_iter(text) {
        let words: Vec<&str> = m
            .as_str()
            .split_whitespace()
            .skip_while(|w| NON_ENTITIES.contains(w))
            .collect();
        if words.is_empty() {
            continue;
        }
        let phrase = words.join(" ");
        if phrase.chars().count() < 2 {
            continue;
        }
        if seen.insert(phrase.to_lowercase()) {
            out.push(phrase);
        }
    }
    out
}

fn is_supported(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if name.starts_with('.') || name.ends_with(".tmp") {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// 导入目录下所有支持的文档
pub fn ingest_dir(
    dir: &Path,
    vector: &MemoryVectorStore,
    graph: &MemoryGraphStore,
) -> Result<IngestReport, StoreError> {
    if !dir.is_dir() {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("source directory {} does not exist", dir.display()),
        )));
    }

    let mut report = IngestReport::default();
    let relations_before = graph.relation_count();
    let mut all_entities = BTreeSet::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                report.skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !is_supported(path) {
            tracing::debug!(file = %path.display(), "skipping unsupported file");
            report.skipped += 1;
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to read document");
                report.skipped += 1;
                continue;
            }
        };

        let doc_id = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let (mut metadata, body) = split_front_matter(&content);
        metadata.insert("filename".to_string(), doc_id.clone());

        report.chunks += vector.add_document_with_metadata(&doc_id, body, &metadata)?;
        report.files += 1;

        for chunk_text in body.split("\n\n") {
            let entities = extract_entities(chunk_text);
            for name in &entities {
                graph.upsert_entity(name, "Entity", &doc_id);
                all_entities.insert(name.to_lowercase());
            }
            for (i, a) in entities.iter().enumerate() {
                for b in &entities[i + 1..] {
                    graph.relate(a, b, MENTIONED_WITH);
                }
            }
        }
        tracing::info!(file = %doc_id, "document ingested");
    }

    report.entities = all_entities.len();
    report.relations = graph.relation_count().saturating_sub(relations_before);
    tracing::info!(
        files = report.files,
        skipped = report.skipped,
        chunks = report.chunks,
        entities = report.entities,
        "ingestion complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GraphStore, Record, VectorStore};

    #[test]
    fn test_front_matter_stripped() {
        let (meta, body) =
            split_front_matter("---\ntitle: \"Capitals\"\nsource: aris\n---\n\nParis is nice.");
        assert_eq!(meta.get("title").map(String::as_str), Some("Capitals"));
        assert_eq!(meta.get("source").map(String::as_str), Some("aris"));
        assert_eq!(body, "Paris is nice.");

        let (meta, body) = split_front_matter("No front matter here.");
        assert!(meta.is_empty());
        assert_eq!(body, "No front matter here.");
    }

    #[test]
    fn test_extract_entities() {
        let entities =
            extract_entities("The Eiffel Tower is in Paris. Paris is the capital of France.");
        assert_eq!(entities, vec!["Eiffel Tower", "Paris", "France"]);
        assert!(extract_entities("all lowercase text").is_empty());
    }

    #[test]
    fn test_ingest_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("geo.md"),
            "---\ntitle: Geography\n---\nParis is the capital of France.",
        )
        .unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(
            dir.path().join("nested").join("lang.txt"),
            "Rust was started at Mozilla.",
        )
        .unwrap();
        std::fs::write(dir.path().join("draft.md.tmp"), "Ignored Draft").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let vector = MemoryVectorStore::with_defaults();
        let graph = MemoryGraphStore::new();
        let report = ingest_dir(dir.path(), &vector, &graph).unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.entities, 4);
        assert_eq!(report.relations, 2);
        assert_eq!(VectorStore::len(&vector), 2);

        let hits = vector.search("capital of France", 1).unwrap();
        assert!(hits[0].contains("Paris"));
        assert!(!vector.chunks().iter().any(|c| c.text.contains("title")));

        let records = graph.query("France", &Record::new()).unwrap();
        assert_eq!(records[0]["related"][0], "Paris");
    }

    #[test]
    fn test_ingest_missing_dir() {
        let vector = MemoryVectorStore::with_defaults();
        let graph = MemoryGraphStore::new();
        assert!(ingest_dir(Path::new("/no/such/dir"), &vector, &graph).is_err());
    }
}
