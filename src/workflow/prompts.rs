//! 规划与合成提示词

/// 合成提示词中工具输出之间的分隔
pub const TOOL_OUTPUT_DELIMITER: &str = "\n\n---\n\n";

/// 规划提示词：列出可用工具与 JSON Schema，要求只输出 JSON
pub fn planning_prompt(query: &str, tools: &[(String, String)], schema_json: &str) -> String {
    let tool_list = tools
        .iter()
        .map(|(name, desc)| format!("- {name}: {desc}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a planning assistant. Choose which tools to run to answer the user's question.\n\n\
         Available tools:\n{tool_list}\n\n\
         Respond with a single JSON object matching this schema and nothing else:\n{schema_json}\n\n\
         Example: {{\"plan\": [\"vector_search\"]}}\n\n\
         Question: {query}"
    )
}

/// 合成提示词：工具输出作为上下文，外加原问题
pub fn synthesis_prompt(query: &str, tool_outputs: &[String]) -> String {
    format!(
        "You are a helpful assistant. Answer the question using the context below. \
         If the context is insufficient, say so.\n\n\
         Context from tools:\n{}\n\nQuestion: {query}\n\nAnswer:",
        tool_outputs.join(TOOL_OUTPUT_DELIMITER)
    )
}
