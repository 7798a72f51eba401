//! 进程内实体图：实体（名称、类型、来源）与无向共现关系，按关键词检索

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::store::tokenizer;
use crate::store::{GraphStore, Record, StoreError};

/// 默认返回条数
pub const DEFAULT_GRAPH_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default)]
    pub mentions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub from: String,
    pub to: String,
    pub kind: String,
    #[serde(default)]
    pub weight: u32,
}

#[derive(Default)]
struct Graph {
    /// 小写名 → 实体
    entities: BTreeMap<String, Entity>,
    /// (from, to, kind) 小写键 → 关系
    relations: BTreeMap<(String, String, String), Relation>,
}

#[derive(Default)]
pub struct MemoryGraphStore {
    inner: RwLock<Graph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入或合并实体；重复出现累加 mentions
    pub fn upsert_entity(&self, name: &str, label: &str, source: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entity = g
            .entities
            .entry(name.to_lowercase())
            .or_insert_with(|| Entity {
                name: name.to_string(),
                label: label.to_string(),
                sources: BTreeSet::new(),
                mentions: 0,
            });
        entity.mentions += 1;
        if !source.is_empty() {
            entity.sources.insert(source.to_string());
        }
    }

    /// 建立关系（两端实体需已存在）；重复建立累加 weight
    pub fn relate(&self, from: &str, to: &str, kind: &str) {
        let (from_key, to_key) = (from.trim().to_lowercase(), to.trim().to_lowercase());
        if from_key == to_key {
            return;
        }
        // 无向关系按字典序存一份
        let (a, b) = if from_key <= to_key {
            (from_key, to_key)
        } else {
            (to_key, from_key)
        };
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let (Some(ea), Some(eb)) = (g.entities.get(&a), g.entities.get(&b)) else {
            return;
        };
        let (name_a, name_b) = (ea.name.clone(), eb.name.clone());
        g.relations
            .entry((a, b, kind.to_string()))
            .or_insert_with(|| Relation {
                from: name_a,
                to: name_b,
                kind: kind.to_string(),
                weight: 0,
            })
            .weight += 1;
    }

    pub fn export(&self) -> (Vec<Entity>, Vec<Relation>) {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        (
            g.entities.values().cloned().collect(),
            g.relations.values().cloned().collect(),
        )
    }

    pub fn import(&self, entities: Vec<Entity>, relations: Vec<Relation>) {
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for e in entities {
            g.entities.insert(e.name.to_lowercase(), e);
        }
        for r in relations {
            g.relations.insert(
                (r.from.to_lowercase(), r.to.to_lowercase(), r.kind.clone()),
                r,
            );
        }
    }

    pub fn relation_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .relations
            .len()
    }
}

fn parse_limit(params: &Record) -> Result<usize, StoreError> {
    match params.get("limit") {
        None | Some(Value::Null) => Ok(DEFAULT_GRAPH_LIMIT),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| StoreError::InvalidParameter {
                name: "limit".to_string(),
                reason: format!("expected a non-negative integer, got {v}"),
            }),
    }
}

impl GraphStore for MemoryGraphStore {
    /// 名称分词与查询分词有交集的实体，按 (交集大小, mentions) 降序
    fn query(&self, query_text: &str, params: &Record) -> Result<Vec<Record>, StoreError> {
        let limit = parse_limit(params)?;
        let query_tokens = tokenizer::tokenize_to_set(query_text);
        if query_tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<(usize, &Entity)> = g
            .entities
            .values()
            .filter_map(|e| {
                let name_tokens: HashSet<String> = tokenizer::tokenize_to_set(&e.name);
                let score = tokenizer::overlap_score(&query_tokens, &name_tokens);
                (score > 0).then_some((score, e))
            })
            .collect();
        hits.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(b.1.mentions.cmp(&a.1.mentions))
                .then_with(|| a.1.name.cmp(&b.1.name))
        });
        hits.truncate(limit);

        let records = hits
            .into_iter()
            .map(|(_, e)| {
                let key = e.name.to_lowercase();
                let mut related: Vec<(&str, u32)> = g
                    .relations
                    .iter()
                    .filter_map(|((a, b, _), r)| {
                        if *a == key {
                            Some((r.to.as_str(), r.weight))
                        } else if *b == key {
                            Some((r.from.as_str(), r.weight))
                        } else {
                            None
                        }
                    })
                    .collect();
                related.sort_by(|x, y| y.1.cmp(&x.1).then(x.0.cmp(y.0)));
                let related: Vec<&str> = related.into_iter().map(|(n, _)| n).collect();

                let mut record = Record::new();
                record.insert("name".into(), json!(e.name));
                record.insert("label".into(), json!(e.label));
                record.insert("mentions".into(), json!(e.mentions));
                record.insert("sources".into(), json!(e.sources));
                record.insert("related".into(), json!(related));
                record
            })
            .collect();
        Ok(records)
    }

    fn entity_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entities
            .len()
    }
}
