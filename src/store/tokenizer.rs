//! 分词：中英文混合，供哈希嵌入与关键词匹配使用
//!
//! 包含 CJK 字符时使用 jieba-rs 搜索引擎模式分词，否则按非字母数字字符切分。
//! 结果统一小写，并去掉常见英文停用词与纯标点。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

fn segmenter() -> &'static Jieba {
    static SEGMENTER: OnceLock<Jieba> = OnceLock::new();
    SEGMENTER.get_or_init(Jieba::new)
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "in",
    "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when", "where",
    "which", "who", "why", "with",
];

/// 汉字（含扩展 A 与兼容区）与假名
const CJK_RANGES: &[(char, char)] = &[
    ('\u{3040}', '\u{30FF}'),
    ('\u{3400}', '\u{4DBF}'),
    ('\u{4E00}', '\u{9FFF}'),
    ('\u{F900}', '\u{FAFF}'),
];

fn is_cjk(c: char) -> bool {
    CJK_RANGES.iter().any(|&(lo, hi)| (lo..=hi).contains(&c))
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

fn keep(token: &str) -> bool {
    let Some(first) = token.chars().next() else {
        return false;
    };
    if is_cjk(first) {
        return true;
    }
    token.chars().count() > 1
        && token.chars().any(char::is_alphanumeric)
        && !STOPWORDS.contains(&token)
}

/// 分词并小写
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    let pieces: Vec<&str> = if text.is_empty() {
        Vec::new()
    } else if contains_cjk(text) {
        segmenter().cut_for_search(text, true)
    } else {
        text.split(|c: char| !c.is_alphanumeric()).collect()
    };
    pieces
        .into_iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|t| keep(t))
        .collect()
}

pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 共有词数
pub fn overlap_score(query: &HashSet<String>, other: &HashSet<String>) -> usize {
    query.iter().filter(|t| other.contains(*t)).count()
}

/// |A∩B| / |A∪B|，任一为空时为 0
pub fn jaccard_similarity(query: &HashSet<String>, other: &HashSet<String>) -> f32 {
    let shared = overlap_score(query, other);
    if shared == 0 {
        return 0.0;
    }
    shared as f32 / (query.len() + other.len() - shared) as f32
}
