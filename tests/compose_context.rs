// End-to-end context assembly: trace wiring, diversity and snippet
// limits, and the fused local-plus-external evidence path.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use cortex::contracts::{EvidenceSource, PlanPurpose, RetrievalPlan, CONTRACT_VERSION};
use cortex::core::clock::FixedClock;
use cortex::models::TurnEvents;
use cortex::resource::{DirectClient, ResourceBackend};
use cortex::{Config, Runtime};
use serde_json::{json, Value};

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()))
}

fn runtime() -> Runtime {
    Runtime::build(Config::default(), None, clock())
}

fn events(value: Value) -> TurnEvents {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn package_carries_consistent_trace_ids() {
    let runtime = runtime();
    runtime
        .commit_turn(
            "s1",
            events(json!({
                "messages": [{"role": "user", "content": "please keep answers short"}],
                "preferences": [{"key": "verbosity", "confirmed": true, "value": "short"}]
            })),
        )
        .await;

    let package = runtime
        .compose_context("s1", "what verbosity did I ask for", json!({}))
        .await
        .unwrap();

    assert_eq!(package.version, CONTRACT_VERSION);
    assert_eq!(package.session_id, "s1");
    assert_eq!(package.user_message.role, "user");
    assert_eq!(package.user_message.content, "what verbosity did I ask for");
    assert!(!package.context_id.is_empty());
    assert_eq!(package.debug.trace.context_id, package.context_id);
    assert_eq!(package.debug.trace.request_id, package.debug.planner.request_id);
    // no hints, no refs: the planner keeps retrieval local
    assert!(package.debug.trace.plan_id.starts_with("local-"));
    assert_eq!(package.debug.planner.purpose, PlanPurpose::Qa);
    assert!(package.system_blocks.is_empty());
    assert!(package.developer_blocks.is_empty());
}

#[tokio::test]
async fn constraints_echo_composition_policy() {
    let runtime = runtime();
    runtime
        .commit_turn(
            "s1",
            events(json!({"messages": [{"role": "user", "content": "hello"}]})),
        )
        .await;

    let package = runtime
        .compose_context("s1", "hello again", json!({}))
        .await
        .unwrap();

    let constraints = &package.constraints;
    assert_eq!(constraints.token_budget.limit, 8192);
    assert!(constraints.token_budget.used_estimate <= constraints.token_budget.limit);
    assert_eq!(constraints.diversity.by_document, 3);
    assert_eq!(constraints.diversity.by_source, 2);
    assert_eq!(constraints.truncation.snippets_max_chars, 800);
    assert_eq!(constraints.truncation.recent_turns_max, 8);
    assert!(package.recent_turns.len() <= 8);
}

#[tokio::test]
async fn evidence_respects_caps_and_snippet_limit() {
    let runtime = runtime();
    let note = "x".repeat(900);
    for i in 0..6 {
        runtime
            .commit_turn(
                "s1",
                events(json!({
                    "decisions": [{"key": format!("project-{}", i), "note": note}]
                })),
            )
            .await;
    }

    let package = runtime
        .compose_context("s1", "project", json!({}))
        .await
        .unwrap();

    assert!(!package.evidence.is_empty());
    assert!(package.evidence.len() <= 12);
    // every stored item shares the cortex://memory source prefix, so the
    // per-source cap holds the memory block to two entries
    let memory_hits = package
        .evidence
        .iter()
        .filter(|e| e.source_uri.starts_with("cortex://memory/"))
        .count();
    assert_eq!(memory_hits, 2);

    for evidence in &package.evidence {
        assert!(evidence.snippet.chars().count() <= 803);
    }
    assert!(package
        .evidence
        .iter()
        .any(|e| e.snippet.ends_with("...")));

    assert!(!package.debug.dropped.is_empty());
    assert!(package.debug.dropped.iter().all(|d| d.reason == "diversity"));
}

#[tokio::test]
async fn recent_turn_evidence_links_back_to_its_turn() {
    let runtime = runtime();
    let commit = runtime
        .commit_turn(
            "s1",
            events(json!({
                "messages": [{"role": "user", "content": "we walked through rust lifetimes"}]
            })),
        )
        .await;

    let package = runtime
        .compose_context("s1", "rust lifetimes", json!({}))
        .await
        .unwrap();

    let turn_hit = package
        .evidence
        .iter()
        .find(|e| e.source_uri == "cortex://recent_turn")
        .expect("turn evidence");
    assert_eq!(turn_hit.source, EvidenceSource::Memory);
    assert_eq!(turn_hit.reference.turn_id.as_deref(), Some(commit.turn_id.as_str()));
    assert_eq!(turn_hit.title, "Recent Turn");
}

#[tokio::test]
async fn research_hints_surface_in_planner_debug() {
    let runtime = runtime();

    let package = runtime
        .compose_context("s1", "compare the two retry policies", json!({}))
        .await
        .unwrap();

    assert_eq!(package.debug.planner.purpose, PlanPurpose::Research);
    assert_eq!(
        package.debug.planner.queries[0],
        "compare the two retry policies"
    );
}

struct CannedBackend(Value);

#[async_trait]
impl ResourceBackend for CannedBackend {
    async fn retrieve(&self, _plan: &RetrievalPlan) -> anyhow::Result<Value> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn backend_evidence_flows_through_dedupe_and_debug() {
    let mut config = Config::default();
    config.retrieval.enable_resource_retrieval = Some(true);
    let raw = json!({
        "evidences": [
            {
                "id": "weak",
                "source_uri": "deeprag://corpus/retry.md",
                "title": "Retry policy",
                "snippet": "first pass",
                "score": 0.1,
                "document_id": "d1",
                "section_id": "s1"
            },
            {
                "id": "strong",
                "source_uri": "deeprag://corpus/retry.md",
                "title": "Retry policy",
                "snippet": "revised pass",
                "score": 0.9,
                "document_id": "d1",
                "section_id": "s1"
            }
        ],
        "explain": {"ignored_fields": ["global_filters.language not supported"]}
    });
    let client = Arc::new(DirectClient::new(Arc::new(CannedBackend(raw))));
    let runtime = Runtime::build(config, Some(client), clock());

    let package = runtime
        .compose_context("s1", "retry policy", json!({}))
        .await
        .unwrap();

    // same document section: the higher-scored duplicate wins in place
    let ids: Vec<&str> = package.evidence.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["strong"]);
    assert_eq!(package.evidence[0].source, EvidenceSource::Resource);
    assert_eq!(package.evidence[0].score, 0.9);
    assert_eq!(package.evidence[0].reference.document_id.as_deref(), Some("d1"));

    assert!(package.debug.trace.plan_id.starts_with("direct-"));
    assert_eq!(
        package.debug.why_selected,
        vec!["strong score=0.9 source=resource"]
    );
    assert!(package
        .debug
        .ignored
        .contains(&"global_filters.language not supported".to_string()));
}

#[tokio::test]
async fn composing_twice_is_stable_for_unchanged_state() {
    let runtime = runtime();
    runtime
        .commit_turn(
            "s1",
            events(json!({
                "preferences": [{"key": "language", "confirmed": true, "value": "english"}]
            })),
        )
        .await;

    let first = runtime
        .compose_context("s1", "language preference", json!({}))
        .await
        .unwrap();
    let second = runtime
        .compose_context("s1", "language preference", json!({}))
        .await
        .unwrap();

    let ids = |package: &cortex::contracts::ContextPackage| {
        package
            .evidence
            .iter()
            .map(|e| e.id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
    assert_ne!(first.context_id, second.context_id);
}
