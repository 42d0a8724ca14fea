// End-to-end commit flows: retention gates, conflict handling and
// summary triggers as seen through the public runtime surface.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use cortex::core::clock::FixedClock;
use cortex::models::{ConflictKind, MemoryKind, TriggerReason, TurnEvents};
use cortex::{Config, Runtime};
use serde_json::json;

fn runtime() -> Runtime {
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()));
    Runtime::build(Config::default(), None, clock)
}

fn events(value: serde_json::Value) -> TurnEvents {
    serde_json::from_value(value).unwrap()
}

fn plain_message(content: &str) -> TurnEvents {
    events(json!({
        "messages": [{"role": "user", "content": content}]
    }))
}

#[tokio::test]
async fn confidence_tracks_provenance_class() {
    let runtime = runtime();

    let result = runtime
        .commit_turn(
            "s1",
            events(json!({
                "messages": [{"role": "user", "content": "set things up"}],
                "tasks": [{"key": "bootstrap", "status": "open"}],
                "preferences": [{"key": "language", "confirmed": true, "value": "en"}],
                "entities": [{"key": "repo", "canonical": "github.com/acme/api"}]
            })),
        )
        .await;

    assert!(result.ok);
    assert_eq!(result.memory_written.count, 3);

    let by_kind: HashMap<MemoryKind, f64> = result
        .memory_written
        .items
        .iter()
        .map(|i| (i.kind, i.confidence))
        .collect();
    assert_eq!(by_kind[&MemoryKind::Tasks], 0.8);
    assert_eq!(by_kind[&MemoryKind::Preferences], 0.9);
    assert_eq!(by_kind[&MemoryKind::Entities], 0.6);
}

#[tokio::test]
async fn unconfirmed_preferences_are_skipped_with_explanation() {
    let runtime = runtime();

    let result = runtime
        .commit_turn(
            "s1",
            events(json!({
                "preferences": [{"key": "theme", "confirmed": false, "value": "dark"}]
            })),
        )
        .await;

    assert_eq!(result.memory_written.count, 0);
    assert!(result
        .explain
        .retention
        .contains(&"skip preferences:theme not confirmed".to_string()));
    assert!(runtime.active_memory("s1").is_empty());
}

#[tokio::test]
async fn overwrite_then_retract_leaves_no_active_item() {
    let runtime = runtime();

    let first = runtime
        .commit_turn(
            "s1",
            events(json!({
                "preferences": [{"key": "language", "confirmed": true, "value": "en"}]
            })),
        )
        .await;
    let first_id = first.memory_written.items[0].id.clone();

    let second = runtime
        .commit_turn(
            "s1",
            events(json!({
                "preferences": [{"key": "language", "confirmed": true, "value": "fr"}]
            })),
        )
        .await;

    assert_eq!(second.memory_written.conflicts.len(), 1);
    let conflict = &second.memory_written.conflicts[0];
    assert_eq!(conflict.kind, ConflictKind::Overwrite);
    assert_eq!(conflict.key, "language");
    assert_eq!(conflict.previous_memory_item_id, first_id);

    let active = runtime.active_memory("s1");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value["value"], "fr");

    let third = runtime
        .commit_turn(
            "s1",
            events(json!({
                "retractions": [
                    {"type": "preferences", "key": "language", "reason": "user corrected"}
                ]
            })),
        )
        .await;

    assert_eq!(third.memory_written.count, 0);
    assert_eq!(third.memory_written.conflicts.len(), 1);
    assert_eq!(third.memory_written.conflicts[0].kind, ConflictKind::Retract);
    assert!(result_has_retract_line(&third.explain.retention));
    assert!(runtime.active_memory("s1").is_empty());
}

fn result_has_retract_line(retention: &[String]) -> bool {
    retention.iter().any(|l| l == "retract preferences:language")
}

#[tokio::test]
async fn decisions_accumulate_under_one_key() {
    let runtime = runtime();

    runtime
        .commit_turn(
            "s1",
            events(json!({
                "decisions": [{"key": "arch", "choice": "monolith"}]
            })),
        )
        .await;
    let second = runtime
        .commit_turn(
            "s1",
            events(json!({
                "decisions": [{"key": "arch", "choice": "hexagonal"}]
            })),
        )
        .await;

    assert!(second.memory_written.conflicts.is_empty());
    let decisions: Vec<_> = runtime
        .active_memory("s1")
        .into_iter()
        .filter(|i| i.kind == MemoryKind::Decisions)
        .collect();
    assert_eq!(decisions.len(), 2);
    assert!(decisions.iter().all(|i| i.key == "arch"));
}

#[tokio::test]
async fn task_done_or_decision_triggers_stage_event_summary() {
    let runtime = runtime();
    let done = runtime
        .commit_turn(
            "s1",
            events(json!({
                "tasks": [{"key": "ship", "status": "done"}]
            })),
        )
        .await;
    assert!(done.summary.triggered);
    assert_eq!(done.summary.trigger_reason, TriggerReason::StageEvent);
    assert_eq!(done.explain.summary.reason, TriggerReason::StageEvent);

    let other = crate::runtime();
    let decided = other
        .commit_turn(
            "s1",
            events(json!({
                "decisions": [{"key": "arch", "choice": "hexagonal"}]
            })),
        )
        .await;
    assert!(decided.summary.triggered);
    assert_eq!(decided.summary.trigger_reason, TriggerReason::StageEvent);
}

#[tokio::test]
async fn open_tasks_do_not_trigger_a_summary() {
    let runtime = runtime();
    let result = runtime
        .commit_turn(
            "s1",
            events(json!({
                "tasks": [{"key": "ship", "status": "open"}]
            })),
        )
        .await;

    assert!(!result.summary.triggered);
    assert_eq!(result.summary.version, 0);
    assert_eq!(result.summary.trigger_reason, TriggerReason::Empty);
}

#[tokio::test]
async fn turn_threshold_fires_on_the_twelfth_turn() {
    let runtime = runtime();

    for i in 0..11 {
        let result = runtime
            .commit_turn("s1", plain_message(&format!("note {}", i)))
            .await;
        assert!(!result.summary.triggered, "fired early at turn {}", i + 1);
    }

    let result = runtime.commit_turn("s1", plain_message("note 11")).await;

    assert!(result.summary.triggered);
    assert_eq!(result.summary.trigger_reason, TriggerReason::TurnThreshold);
    assert_eq!(result.summary.version, 1);
    assert_eq!(result.summary.source_turn_range.from, 1);
    assert_eq!(result.summary.source_turn_range.to, 12);
    assert!(result.summary.text.contains("Goals:"));
    assert!(result.summary.text.contains("Open Questions:"));
}

#[tokio::test]
async fn sequence_numbers_are_gapless() {
    let runtime = runtime();
    for i in 0..3 {
        runtime
            .commit_turn("s1", plain_message(&format!("turn {}", i)))
            .await;
    }

    let report = runtime.diagnostics();
    let seqs: Vec<u64> = report.turns.iter().map(|t| t.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert!(report.turns.iter().all(|t| t.session_id == "s1"));
}

#[tokio::test]
async fn entity_frequency_gate_admits_second_mention() {
    let runtime = runtime();
    let entity_turn = || {
        events(json!({
            "entities": [{"key": "db", "name": "Postgres"}]
        }))
    };

    let first = runtime.commit_turn("s1", entity_turn()).await;
    assert_eq!(first.memory_written.count, 0);
    assert!(first
        .explain
        .retention
        .contains(&"skip entities:db below threshold".to_string()));

    let second = runtime.commit_turn("s1", entity_turn()).await;
    assert_eq!(second.memory_written.count, 1);
    assert_eq!(second.memory_written.items[0].kind, MemoryKind::Entities);

    let entities = runtime.entities("s1");
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].canonical, "postgres");
    assert_eq!(entities[0].name, "Postgres");
    assert_eq!(entities[0].kind, "other");
}

#[tokio::test]
async fn remember_flag_bypasses_the_entity_gate() {
    let runtime = runtime();

    let result = runtime
        .commit_turn(
            "s1",
            events(json!({
                "entities": [{"key": "owner", "name": "Ada", "remember": true}]
            })),
        )
        .await;

    assert_eq!(result.memory_written.count, 1);
    assert!(result
        .explain
        .retention
        .contains(&"write entities:owner".to_string()));
}
