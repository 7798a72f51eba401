//! PlanDocument：模型输出的执行计划 `{"plan": ["tool_a", "tool_b"]}`

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// 计划最少条目数
pub const MIN_PLAN_ITEMS: usize = 1;
/// 计划最多条目数
pub const MAX_PLAN_ITEMS: usize = 10;

/// 经过校验的执行计划：有序工具 ID 列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PlanDocument {
    /// 按执行顺序排列的工具 ID
    pub plan: Vec<String>,
}

impl PlanDocument {
    pub fn new<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            plan: tools.into_iter().map(Into::into).collect(),
        }
    }

    pub fn into_plan(self) -> Vec<String> {
        self.plan
    }
}

/// 生成计划 JSON Schema，并把工具枚举与条目上下限写入 items
pub fn plan_schema_json<'a>(tools: impl IntoIterator<Item = &'a String>) -> String {
    let schema = schema_for!(PlanDocument);
    let mut value = match serde_json::to_value(&schema) {
        Ok(v) => v,
        Err(_) => return String::new(),
    };
    let names: Vec<serde_json::Value> = tools
        .into_iter()
        .map(|t| serde_json::Value::String(t.clone()))
        .collect();
    if let Some(plan) = value
        .get_mut("properties")
        .and_then(|p| p.get_mut("plan"))
        .and_then(|p| p.as_object_mut())
    {
        plan.insert("minItems".into(), MIN_PLAN_ITEMS.into());
        plan.insert("maxItems".into(), MAX_PLAN_ITEMS.into());
        plan.insert(
            "items".into(),
            serde_json::json!({ "type": "string", "enum": names }),
        );
    }
    serde_json::to_string_pretty(&value).unwrap_or_default()
}
