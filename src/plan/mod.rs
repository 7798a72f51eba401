//! 计划：Schema 校验解码器、计划文档与查询清洗

pub mod decoder;
pub mod document;
pub mod sanitize;

pub use decoder::{decode, strip_code_fence, DecodeError, PlanSchema};
pub use document::{PlanDocument, MAX_PLAN_ITEMS, MIN_PLAN_ITEMS};
pub use sanitize::{sanitize_query, DEFAULT_MAX_QUERY_CHARS, INJECTION_MARKERS};
