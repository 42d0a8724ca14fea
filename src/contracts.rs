//! Versioned wire contracts.
//!
//! Three shapes cross component boundaries:
//! - `RetrievalPlan`: planner output, also the request body sent to the
//!   external retrieval backend
//! - `EvidencePack`: what any retrieval client returns, including the
//!   degraded fallbacks
//! - `ContextPackage`: the final assembled context handed to the caller
//!
//! All three carry `version: "0.1"`. The validators check structure only
//! (presence and non-emptiness), never semantics; they run at every
//! producer/consumer boundary and abort the call on failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::EngineError;
use crate::models::RecentTurn;

pub const CONTRACT_VERSION: &str = "0.1";

// ===== Retrieval plan =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Exact,
    Semantic,
    Hybrid,
    Relational,
    Associative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanPurpose {
    Qa,
    Research,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanQuery {
    pub text: String,
    pub mode: QueryMode,
    pub weight: f64,
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub hints: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri_prefix: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerModeBudget {
    pub exact: usize,
    pub semantic: usize,
    pub hybrid: usize,
    pub relational: usize,
    pub associative: usize,
}

/// Diversity caps as they appear on the wire (plan budget and package
/// constraints).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiversityCaps {
    pub by_document: usize,
    pub by_source: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanBudget {
    pub top_k: usize,
    pub candidate_k: usize,
    pub per_mode_k: PerModeBudget,
    pub diversity: DiversityCaps,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutput {
    pub include_snippets: bool,
    pub max_snippet_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRetrievalDecision {
    pub enabled: bool,
    /// One fixed reason token per planner branch
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCaller {
    pub app: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDebug {
    pub trace: bool,
    pub caller: PlanCaller,
    pub recent_turns_count: usize,
    pub agent_state: Value,
    #[serde(default)]
    pub ignored_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalPlan {
    pub version: String,
    pub request_id: String,
    pub purpose: PlanPurpose,
    pub queries: Vec<PlanQuery>,
    pub global_filters: GlobalFilters,
    pub budget: PlanBudget,
    pub output: PlanOutput,
    pub resource_retrieval: ResourceRetrievalDecision,
    pub debug: PlanDebug,
}

// ===== Evidence =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceSource {
    Memory,
    Resource,
}

impl std::fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EvidenceSource::Memory => "memory",
            EvidenceSource::Resource => "resource",
        };
        f.write_str(name)
    }
}

/// Provenance pointer; which fields are set depends on where the
/// evidence came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Fused evidence item as it appears in a `ContextPackage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub source: EvidenceSource,
    pub source_uri: String,
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<QueryMode>,
    pub score: f64,
    #[serde(rename = "ref")]
    pub reference: EvidenceRef,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

// ===== Evidence pack (retrieval client output) =====

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSignals {
    pub rerank_score: Option<f64>,
    pub rrf_score: Option<f64>,
}

/// Evidence as the backend returns it, before fusion normalizes it.
/// Everything is optional except identity and display fields, and those
/// default to empty rather than failing the whole pack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceEvidence {
    pub id: String,
    pub source_uri: String,
    pub title: String,
    pub snippet: String,
    pub score: Option<f64>,
    pub signals: Option<RetrievalSignals>,
    pub document_id: Option<String>,
    pub section_id: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<EvidenceRef>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackStats {
    pub candidates: usize,
    pub returned: usize,
    pub took_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackExplain {
    pub ignored_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePack {
    pub version: String,
    pub request_id: String,
    pub plan_id: String,
    pub generated_at: String,
    #[serde(default)]
    pub evidences: Vec<ResourceEvidence>,
    #[serde(default)]
    pub stats: PackStats,
    #[serde(default)]
    pub explain: PackExplain,
    #[serde(default)]
    pub warnings: Vec<String>,
}

// ===== Context package =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenBudget {
    pub limit: usize,
    pub used_estimate: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TruncationLimits {
    pub snippets_max_chars: usize,
    pub recent_turns_max: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PackageConstraints {
    pub token_budget: TokenBudget,
    pub diversity: DiversityCaps,
    pub truncation: TruncationLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceIds {
    pub context_id: String,
    pub request_id: String,
    pub plan_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerDebug {
    pub request_id: String,
    pub purpose: PlanPurpose,
    pub queries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedEvidence {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDebug {
    pub trace: TraceIds,
    pub planner: PlannerDebug,
    /// One line per selected evidence: `"<id> score=<score> source=<source>"`
    pub why_selected: Vec<String>,
    /// Fields the retrieval side could not honor
    pub ignored: Vec<String>,
    pub dropped: Vec<DroppedEvidence>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextPackage {
    pub version: String,
    pub context_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub system_blocks: Vec<String>,
    pub developer_blocks: Vec<String>,
    pub working_summary: String,
    pub recent_turns: Vec<RecentTurn>,
    pub evidence: Vec<Evidence>,
    pub user_message: UserMessage,
    pub constraints: PackageConstraints,
    pub debug: PackageDebug,
}

// ===== Validators =====

pub fn validate_plan(plan: &RetrievalPlan) -> Result<(), EngineError> {
    if plan.version.is_empty() {
        return Err(EngineError::contract("retrieval plan: version is empty"));
    }
    if plan.request_id.is_empty() {
        return Err(EngineError::contract("retrieval plan: request_id is empty"));
    }
    if plan.queries.is_empty() {
        return Err(EngineError::contract(
            "retrieval plan: queries must not be empty",
        ));
    }
    Ok(())
}

pub fn validate_pack(pack: &EvidencePack) -> Result<(), EngineError> {
    if pack.version.is_empty() {
        return Err(EngineError::contract("evidence pack: version is empty"));
    }
    if pack.request_id.is_empty() {
        return Err(EngineError::contract("evidence pack: request_id is empty"));
    }
    if pack.plan_id.is_empty() {
        return Err(EngineError::contract("evidence pack: plan_id is empty"));
    }
    if pack.generated_at.is_empty() {
        return Err(EngineError::contract(
            "evidence pack: generated_at is empty",
        ));
    }
    Ok(())
}

pub fn validate_package(package: &ContextPackage) -> Result<(), EngineError> {
    if package.version.is_empty() {
        return Err(EngineError::contract("context package: version is empty"));
    }
    if package.context_id.is_empty() {
        return Err(EngineError::contract(
            "context package: context_id is empty",
        ));
    }
    if package.session_id.is_empty() {
        return Err(EngineError::contract(
            "context package: session_id is empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn minimal_plan() -> RetrievalPlan {
        RetrievalPlan {
            version: CONTRACT_VERSION.to_string(),
            request_id: "req-1".to_string(),
            purpose: PlanPurpose::Qa,
            queries: vec![PlanQuery {
                text: "hello".to_string(),
                mode: QueryMode::Hybrid,
                weight: 1.0,
                filters: Map::new(),
                hints: Map::new(),
            }],
            global_filters: GlobalFilters::default(),
            budget: PlanBudget {
                top_k: 30,
                candidate_k: 200,
                per_mode_k: PerModeBudget {
                    exact: 10,
                    semantic: 10,
                    hybrid: 30,
                    relational: 10,
                    associative: 8,
                },
                diversity: DiversityCaps {
                    by_document: 3,
                    by_source: 2,
                },
            },
            output: PlanOutput {
                include_snippets: true,
                max_snippet_chars: 800,
            },
            resource_retrieval: ResourceRetrievalDecision {
                enabled: false,
                reason: "auto_disabled_or_not_needed".to_string(),
            },
            debug: PlanDebug {
                trace: true,
                caller: PlanCaller {
                    app: "cortex".to_string(),
                    session_id: "s1".to_string(),
                },
                recent_turns_count: 0,
                agent_state: Value::Null,
                ignored_fields: Vec::new(),
            },
        }
    }

    #[test]
    fn valid_plan_passes() {
        assert!(validate_plan(&minimal_plan()).is_ok());
    }

    #[test]
    fn plan_without_queries_is_rejected() {
        let mut plan = minimal_plan();
        plan.queries.clear();
        let err = validate_plan(&plan).unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation(_)));
    }

    #[test]
    fn plan_with_blank_request_id_is_rejected() {
        let mut plan = minimal_plan();
        plan.request_id.clear();
        assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn pack_requires_plan_id_and_timestamp() {
        let mut pack = EvidencePack {
            version: CONTRACT_VERSION.to_string(),
            request_id: "req-1".to_string(),
            plan_id: "local-req-1".to_string(),
            generated_at: "2025-06-01T00:00:00Z".to_string(),
            evidences: Vec::new(),
            stats: PackStats::default(),
            explain: PackExplain::default(),
            warnings: Vec::new(),
        };
        assert!(validate_pack(&pack).is_ok());

        pack.plan_id.clear();
        assert!(validate_pack(&pack).is_err());
    }

    #[test]
    fn resource_evidence_tolerates_sparse_payloads() {
        let item: ResourceEvidence = serde_json::from_str(
            r#"{"id": "r1", "title": "Doc", "snippet": "text", "signals": {"rrf_score": 0.3}}"#,
        )
        .unwrap();
        assert_eq!(item.id, "r1");
        assert_eq!(item.score, None);
        assert_eq!(item.signals.unwrap().rrf_score, Some(0.3));
        assert!(item.reference.is_none());
    }

    #[test]
    fn evidence_ref_serializes_under_ref_key() {
        let evidence = Evidence {
            id: "m1".to_string(),
            source: EvidenceSource::Memory,
            source_uri: "cortex://memory/m1".to_string(),
            title: "t".to_string(),
            snippet: "s".to_string(),
            mode: Some(QueryMode::Exact),
            score: 1.0,
            reference: EvidenceRef {
                memory_item_id: Some("m1".to_string()),
                ..EvidenceRef::default()
            },
            metadata: Map::new(),
        };

        let json = serde_json::to_value(&evidence).unwrap();
        assert_eq!(json["ref"]["memory_item_id"], "m1");
        assert_eq!(json["source"], "memory");
        assert_eq!(json["mode"], "exact");
    }
}
