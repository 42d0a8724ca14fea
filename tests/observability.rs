// Diagnostics surface: per-call logs and the derived metrics.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use cortex::contracts::EvidenceSource;
use cortex::core::clock::FixedClock;
use cortex::models::{TriggerReason, TurnEvents};
use cortex::{Config, Runtime};
use serde_json::json;

fn build(config: Config) -> Runtime {
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()));
    Runtime::build(config, None, clock)
}

fn preference_events() -> TurnEvents {
    serde_json::from_value(json!({
        "preferences": [{"key": "language", "confirmed": true, "value": "english"}]
    }))
    .unwrap()
}

#[tokio::test]
async fn metrics_cover_compose_history() {
    let runtime = build(Config::default());
    runtime.commit_turn("s1", preference_events()).await;

    for _ in 0..3 {
        runtime
            .compose_context("s1", "language preference", json!({}))
            .await
            .unwrap();
    }

    let report = runtime.diagnostics();
    assert_eq!(report.snapshot.compose_logs.len(), 3);

    let metrics = &report.snapshot.metrics;
    assert!(metrics.compose_p95_ms >= 0.0);
    // one stored preference matches each compose, nothing external
    assert_eq!(metrics.memory_resource_ratio, "3/0");
    assert_eq!(metrics.token_over_budget_rate, 0.0);

    let log = &report.snapshot.compose_logs[0];
    assert_eq!(log.session_id, "s1");
    assert_eq!(log.selected_evidence.len(), 1);
    assert_eq!(log.selected_evidence[0].source, EvidenceSource::Memory);
    assert_eq!(log.token_limit, 8192);
    assert!(!log.context_id.is_empty());
    assert!(!log.request_id.is_empty());
}

#[tokio::test]
async fn over_budget_composes_are_counted() {
    let mut config = Config::default();
    config.composition.token_limit = 2;
    let runtime = build(config);

    runtime
        .commit_turn(
            "s1",
            serde_json::from_value(json!({
                "messages": [{
                    "role": "user",
                    "content": "a message long enough to overrun a two token budget"
                }]
            }))
            .unwrap(),
        )
        .await;
    runtime
        .compose_context("s1", "budget overrun", json!({}))
        .await
        .unwrap();

    let report = runtime.diagnostics();
    let log = &report.snapshot.compose_logs[0];
    assert!(log.token_used > log.token_limit);
    assert_eq!(report.snapshot.metrics.token_over_budget_rate, 1.0);
}

#[tokio::test]
async fn commit_logs_record_writes_conflicts_and_summary_state() {
    let runtime = build(Config::default());
    runtime.commit_turn("s1", preference_events()).await;
    runtime.commit_turn("s1", preference_events()).await;

    let report = runtime.diagnostics();
    assert_eq!(report.snapshot.commit_logs.len(), 2);

    let first = &report.snapshot.commit_logs[0];
    assert_eq!(first.memory_items.len(), 1);
    assert_eq!(first.memory_items[0].key, "language");
    assert!(first.conflicts.is_empty());
    assert!(!first.summary_triggered);
    assert_eq!(first.summary_reason, TriggerReason::Empty);

    let second = &report.snapshot.commit_logs[1];
    assert_eq!(second.conflicts.len(), 1);
    assert_eq!(second.conflicts[0].key, "language");
}
