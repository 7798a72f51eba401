//! 就绪检查：探测向量存储、图存储与模型后端
//!
//! 存储是关键组件，任一不健康即整体未就绪；模型为可选组件，只影响报告。

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::llm::LlmClient;
use crate::store::{GraphStore, Record, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy,
    /// 未配置
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: ComponentStatus,
    pub critical: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub components: Vec<ComponentHealth>,
}

/// 被探测的组件
#[derive(Clone, Default)]
pub struct HealthTargets {
    pub vector: Option<Arc<dyn VectorStore>>,
    pub graph: Option<Arc<dyn GraphStore>>,
    pub llm: Option<Arc<dyn LlmClient>>,
}

fn component(
    name: &str,
    critical: bool,
    started: Instant,
    result: Option<Result<String, String>>,
) -> ComponentHealth {
    let (status, detail) = match result {
        None => (ComponentStatus::Unavailable, Some("not configured".to_string())),
        Some(Ok(detail)) => (ComponentStatus::Healthy, Some(detail)),
        Some(Err(e)) => (ComponentStatus::Unhealthy, Some(e)),
    };
    ComponentHealth {
        name: name.to_string(),
        status,
        critical,
        latency_ms: started.elapsed().as_millis() as u64,
        detail,
    }
}

pub async fn readiness(targets: &HealthTargets) -> ReadinessReport {
    let mut components = Vec::with_capacity(3);

    let started = Instant::now();
    let result = targets.vector.as_ref().map(|store| {
        store
            .search("test", 1)
            .map(|_| format!("{} chunks", store.len()))
            .map_err(|e| e.to_string())
    });
    components.push(component("vector_store", true, started, result));

    let started = Instant::now();
    let result = targets.graph.as_ref().map(|store| {
        store
            .query("test", &Record::new())
            .map(|_| format!("{} entities", store.entity_count()))
            .map_err(|e| e.to_string())
    });
    components.push(component("graph_store", true, started, result));

    let started = Instant::now();
    let result = match targets.llm.as_ref() {
        Some(llm) => Some(
            llm.ping()
                .await
                .map(|_| llm.name().to_string())
                .map_err(|e| e.to_string()),
        ),
        None => None,
    };
    components.push(component("llm", false, started, result));

    let ready = components
        .iter()
        .filter(|c| c.critical)
        .all(|c| c.status == ComponentStatus::Healthy);
    for c in &components {
        if c.status != ComponentStatus::Healthy {
            tracing::warn!(component = %c.name, status = ?c.status, detail = ?c.detail, "component not healthy");
        }
    }
    ReadinessReport { ready, components }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::store::{MemoryGraphStore, MemoryVectorStore, StoreError};

    struct BrokenStore;

    impl VectorStore for BrokenStore {
        fn search(&self, _query: &str, _k: usize) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("index offline".to_string()))
        }

        fn len(&self) -> usize {
            0
        }
    }

    struct DownLlm;

    #[async_trait::async_trait]
    impl LlmClient for DownLlm {
        async fn generate(&self, _model: &str, _prompt: &str) -> Result<crate::llm::Completion, LlmError> {
            Err(LlmError::Unavailable("down".to_string()))
        }

        fn name(&self) -> &str {
            "down"
        }

        async fn ping(&self) -> Result<(), LlmError> {
            Err(LlmError::Unavailable("connection refused".to_string()))
        }
    }

    fn stores() -> HealthTargets {
        HealthTargets {
            vector: Some(Arc::new(MemoryVectorStore::with_defaults())),
            graph: Some(Arc::new(MemoryGraphStore::new())),
            llm: None,
        }
    }

    #[tokio::test]
    async fn test_ready_without_optional_llm() {
        let report = readiness(&stores()).await;
        assert!(report.ready);
        assert_eq!(report.components[2].status, ComponentStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_llm_failure_is_not_critical() {
        let mut targets = stores();
        targets.llm = Some(Arc::new(DownLlm));
        let report = readiness(&targets).await;
        assert!(report.ready);
        assert_eq!(report.components[2].status, ComponentStatus::Unhealthy);

        targets.llm = Some(Arc::new(MockLlmClient::new()));
        let report = readiness(&targets).await;
        assert_eq!(report.components[2].status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_broken_store_is_not_ready() {
        let mut targets = stores();
        targets.vector = Some(Arc::new(BrokenStore));
        let report = readiness(&targets).await;
        assert!(!report.ready);
        assert_eq!(report.components[0].status, ComponentStatus::Unhealthy);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["components"][0]["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_missing_store_is_not_ready() {
        let targets = HealthTargets::default();
        assert!(!readiness(&targets).await.ready);
    }
}
