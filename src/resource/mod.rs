//! External retrieval clients.
//!
//! One capability trait, three implementations:
//! - `DirectClient`: wraps an in-process `ResourceBackend`
//! - `HttpClient`: POSTs the plan to a remote "deeprag" endpoint
//! - `NullClient`: always returns an empty pack
//!
//! The trait is infallible by signature. Timeouts, transport errors and
//! malformed responses all collapse into an empty (or partial) pack with
//! a warning, so a broken backend degrades the pipeline to memory-only
//! evidence instead of failing the compose call.

pub mod direct;
pub mod http;
pub mod null;

pub use direct::{DirectClient, ResourceBackend};
pub use http::HttpClient;
pub use null::NullClient;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::contracts::{
    EvidencePack, PackExplain, PackStats, ResourceEvidence, RetrievalPlan, CONTRACT_VERSION,
};

#[async_trait]
pub trait ResourceRetriever: Send + Sync {
    async fn retrieve(&self, plan: &RetrievalPlan) -> EvidencePack;
}

/// Empty pack shared by every degraded path.
pub(crate) fn fallback_pack(
    request_id: &str,
    plan_id: String,
    warnings: Vec<String>,
) -> EvidencePack {
    EvidencePack {
        version: CONTRACT_VERSION.to_string(),
        request_id: request_id.to_string(),
        plan_id,
        generated_at: Utc::now().to_rfc3339(),
        evidences: Vec::new(),
        stats: PackStats::default(),
        explain: PackExplain::default(),
        warnings,
    }
}

/// Normalizes a raw backend response into a contract-complete pack.
///
/// Missing envelope fields get defaults; evidence entries that fail to
/// parse are skipped with a counting warning rather than failing the
/// whole pack.
pub(crate) fn normalize_pack(raw: &Value, request_id: &str, plan_id_prefix: &str) -> EvidencePack {
    let str_field =
        |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);

    let mut warnings: Vec<String> = raw
        .get("warnings")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut evidences = Vec::new();
    let mut skipped = 0usize;
    if let Some(list) = raw.get("evidences").and_then(Value::as_array) {
        for entry in list {
            match serde_json::from_value::<ResourceEvidence>(entry.clone()) {
                Ok(item) => evidences.push(item),
                Err(_) => skipped += 1,
            }
        }
    }
    if skipped > 0 {
        warnings.push(format!("skipped {} malformed evidence entries", skipped));
    }

    let stats = raw
        .get("stats")
        .and_then(|value| serde_json::from_value::<PackStats>(value.clone()).ok())
        .unwrap_or(PackStats {
            candidates: evidences.len(),
            returned: evidences.len(),
            took_ms: 0.0,
        });

    let explain = raw
        .get("explain")
        .and_then(|value| serde_json::from_value::<PackExplain>(value.clone()).ok())
        .unwrap_or_default();

    EvidencePack {
        version: str_field("version").unwrap_or_else(|| CONTRACT_VERSION.to_string()),
        request_id: str_field("request_id").unwrap_or_else(|| request_id.to_string()),
        plan_id: str_field("plan_id")
            .unwrap_or_else(|| format!("{}-{}", plan_id_prefix, request_id)),
        generated_at: str_field("generated_at").unwrap_or_else(|| Utc::now().to_rfc3339()),
        evidences,
        stats,
        explain,
        warnings,
    }
}
