//! 计划解码：模型自由文本 → 经过 Schema 校验的 PlanDocument
//!
//! 纯函数、无副作用；解析失败立即返回 DecodeError，重试由 PLAN 节点的重试策略负责。

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

use crate::plan::document::{plan_schema_json, PlanDocument, MAX_PLAN_ITEMS, MIN_PLAN_ITEMS};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty model output")]
    Empty,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("plan document must be a JSON object")]
    NotAnObject,

    #[error("missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("unexpected keys: {}", .0.join(", "))]
    UnexpectedKeys(Vec<String>),

    #[error("'plan' must be an array of strings")]
    NotAnArray,

    #[error("plan item {0} is not a string")]
    NonStringItem(usize),

    #[error("plan has {len} items, at least {min} required")]
    TooFew { len: usize, min: usize },

    #[error("plan has {len} items, at most {max} allowed")]
    TooMany { len: usize, max: usize },

    #[error("Invalid tools in plan: {{{}}}", .0.join(", "))]
    UnknownTools(Vec<String>),
}

/// 计划约束：工具枚举 + 条目上下限
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSchema {
    allowed: BTreeSet<String>,
    min_items: usize,
    max_items: usize,
}

impl PlanSchema {
    /// 以注册表中的工具 ID 构造规划用 Schema（1..=10 项）
    pub fn planner<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: tools.into_iter().map(Into::into).collect(),
            min_items: MIN_PLAN_ITEMS,
            max_items: MAX_PLAN_ITEMS,
        }
    }

    pub fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }

    pub fn is_allowed(&self, tool: &str) -> bool {
        self.allowed.contains(tool)
    }

    /// 渲染 JSON Schema，用于规划提示词
    pub fn json_schema(&self) -> String {
        plan_schema_json(&self.allowed)
    }
}

/// 去掉 ```json ... ``` 或 ``` ... ``` 包裹；无围栏时原样返回（去首尾空白）
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_ticks = &trimmed[start + 3..];
    // 围栏首行可能带语言标记（json / JSON / 空）
    let body = match after_ticks.find('\n') {
        Some(nl) => {
            let tag = after_ticks[..nl].trim();
            if tag.is_empty() || tag.chars().all(|c| c.is_ascii_alphanumeric()) {
                &after_ticks[nl + 1..]
            } else {
                after_ticks
            }
        }
        None => after_ticks.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// 解码并校验模型输出
pub fn decode(raw: &str, schema: &PlanSchema) -> Result<PlanDocument, DecodeError> {
    let text = strip_code_fence(raw);
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    validate_value(value, schema)
}

fn validate_value(value: Value, schema: &PlanSchema) -> Result<PlanDocument, DecodeError> {
    let Value::Object(mut map) = value else {
        return Err(DecodeError::NotAnObject);
    };
    let plan = map.remove("plan").ok_or(DecodeError::MissingKey("plan"))?;
    if !map.is_empty() {
        let mut extra: Vec<String> = map.keys().cloned().collect();
        extra.sort();
        return Err(DecodeError::UnexpectedKeys(extra));
    }
    let Value::Array(items) = plan else {
        return Err(DecodeError::NotAnArray);
    };

    let mut tools = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match item {
            Value::String(s) => tools.push(s),
            _ => return Err(DecodeError::NonStringItem(i)),
        }
    }

    if tools.len() < schema.min_items {
        return Err(DecodeError::TooFew {
            len: tools.len(),
            min: schema.min_items,
        });
    }
    if tools.len() > schema.max_items {
        return Err(DecodeError::TooMany {
            len: tools.len(),
            max: schema.max_items,
        });
    }

    let unknown: BTreeSet<&String> = tools.iter().filter(|t| !schema.is_allowed(t)).collect();
    if !unknown.is_empty() {
        return Err(DecodeError::UnknownTools(
            unknown.into_iter().cloned().collect(),
        ));
    }

    Ok(PlanDocument { plan: tools })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> PlanSchema {
        PlanSchema::planner([
            "vector_search",
            "graph_search",
            "vector_search_async",
            "graph_search_async",
        ])
    }

    #[test]
    fn test_round_trip() {
        let plans = [
            vec!["vector_search"],
            vec!["graph_search", "vector_search_async"],
            vec!["vector_search"; 10],
        ];
        for plan in plans {
            let doc = PlanDocument::new(plan);
            let raw = serde_json::to_string(&doc).unwrap();
            assert_eq!(decode(&raw, &schema()).unwrap(), doc);
        }
    }

    #[test]
    fn test_malformed_json() {
        for raw in ["Invalid JSON response", "{\"plan\": [", "plan: vector_search"] {
            assert!(matches!(
                decode(raw, &schema()),
                Err(DecodeError::InvalidJson(_))
            ));
        }
        assert_eq!(decode("   ", &schema()), Err(DecodeError::Empty));
    }

    #[test]
    fn test_shape_violations() {
        let s = schema();
        assert_eq!(decode("[]", &s), Err(DecodeError::NotAnObject));
        assert_eq!(decode("{}", &s), Err(DecodeError::MissingKey("plan")));
        assert_eq!(
            decode(r#"{"plan": ["vector_search"], "why": "x"}"#, &s),
            Err(DecodeError::UnexpectedKeys(vec!["why".to_string()]))
        );
        assert_eq!(
            decode(r#"{"plan": "vector_search"}"#, &s),
            Err(DecodeError::NotAnArray)
        );
        assert_eq!(
            decode(r#"{"plan": ["vector_search", 3]}"#, &s),
            Err(DecodeError::NonStringItem(1))
        );
    }

    #[test]
    fn test_item_bounds() {
        let s = schema();
        assert_eq!(
            decode(r#"{"plan": []}"#, &s),
            Err(DecodeError::TooFew { len: 0, min: 1 })
        );
        let eleven = PlanDocument::new(vec!["graph_search"; 11]);
        assert_eq!(
            decode(&serde_json::to_string(&eleven).unwrap(), &s),
            Err(DecodeError::TooMany { len: 11, max: 10 })
        );
    }

    #[test]
    fn test_unknown_tools_named_sorted() {
        let err = decode(
            r#"{"plan": ["web_search", "vector_search", "calculator", "web_search"]}"#,
            &schema(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownTools(vec!["calculator".to_string(), "web_search".to_string()])
        );
        assert_eq!(
            err.to_string(),
            "Invalid tools in plan: {calculator, web_search}"
        );
    }

    #[test]
    fn test_code_fences_stripped() {
        let s = schema();
        let fenced = "```json\n{\"plan\": [\"graph_search\"]}\n```";
        assert_eq!(decode(fenced, &s).unwrap().plan, vec!["graph_search"]);

        let bare = "```\n{\"plan\": [\"vector_search\"]}\n```";
        assert_eq!(decode(bare, &s).unwrap().plan, vec!["vector_search"]);

        let inline = "```JSON{\"plan\": [\"graph_search\"]}```";
        assert_eq!(strip_code_fence(inline), "{\"plan\": [\"graph_search\"]}");
        assert_eq!(decode(inline, &s).unwrap().plan, vec!["graph_search"]);
        let inline = "```json5 {\"plan\": [\"vector_search\"]}```";
        assert_eq!(decode(inline, &s).unwrap().plan, vec!["vector_search"]);

        let chatty = "Here is the plan:\n```json\n{\"plan\": [\"vector_search\"]}\n```\nDone.";
        assert_eq!(decode(chatty, &s).unwrap().plan, vec!["vector_search"]);
    }

    #[test]
    fn test_deterministic() {
        let raw = r#"{"plan": ["graph_search_async", "vector_search"]}"#;
        assert_eq!(decode(raw, &schema()), decode(raw, &schema()));
    }
}
