//! In-process retrieval backend adapter.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{fallback_pack, normalize_pack, ResourceRetriever};
use crate::contracts::{EvidencePack, RetrievalPlan};

/// Seam for embedding a retrieval engine in the same process. The
/// backend returns raw JSON in whatever shape it has; normalization to
/// the pack contract happens on this side.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    async fn retrieve(&self, plan: &RetrievalPlan) -> anyhow::Result<Value>;
}

pub struct DirectClient {
    backend: Arc<dyn ResourceBackend>,
}

impl DirectClient {
    pub fn new(backend: Arc<dyn ResourceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ResourceRetriever for DirectClient {
    async fn retrieve(&self, plan: &RetrievalPlan) -> EvidencePack {
        match self.backend.retrieve(plan).await {
            Ok(raw) => normalize_pack(&raw, &plan.request_id, "direct"),
            Err(err) => {
                tracing::warn!("deeprag direct retrieve failed: {}", err);
                fallback_pack(
                    &plan.request_id,
                    format!("direct-error-{}", plan.request_id),
                    vec![format!("deeprag direct retrieve failed: {}", err)],
                )
            }
        }
    }
}
