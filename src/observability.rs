//! In-memory pipeline metrics.
//!
//! Every commit and compose appends a log entry; `snapshot()` derives
//! p95 compose latency, the realized memory/resource evidence split and
//! the over-budget rate from whatever has accumulated so far.

use std::sync::RwLock;

use serde::Serialize;

use crate::contracts::EvidenceSource;
use crate::models::{MemoryConflict, TriggerReason, WrittenItem};

/// Slim projection of a selected evidence item, enough for the ratio
/// metric and for reading diagnostics by eye.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedEvidence {
    pub id: String,
    pub source: EvidenceSource,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposeLog {
    pub context_id: String,
    pub session_id: String,
    pub request_id: String,
    pub plan_id: String,
    pub selected_evidence: Vec<SelectedEvidence>,
    pub ignored_fields: Vec<String>,
    pub token_used: usize,
    pub token_limit: usize,
    pub took_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitLog {
    pub commit_id: String,
    pub session_id: String,
    pub turn_id: String,
    pub memory_items: Vec<WrittenItem>,
    pub conflicts: Vec<MemoryConflict>,
    pub summary_triggered: bool,
    pub summary_reason: TriggerReason,
    pub took_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub compose_p95_ms: f64,
    pub memory_resource_ratio: String,
    pub token_over_budget_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub compose_logs: Vec<ComposeLog>,
    pub commit_logs: Vec<CommitLog>,
    pub metrics: Metrics,
}

#[derive(Default)]
pub struct Tracker {
    compose_logs: RwLock<Vec<ComposeLog>>,
    commit_logs: RwLock<Vec<CommitLog>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_compose(&self, log: ComposeLog) {
        let mut logs = self
            .compose_logs
            .write()
            .unwrap_or_else(|e| e.into_inner());
        logs.push(log);
    }

    pub fn log_commit(&self, log: CommitLog) {
        let mut logs = self.commit_logs.write().unwrap_or_else(|e| e.into_inner());
        logs.push(log);
    }

    pub fn snapshot(&self) -> Snapshot {
        let compose_logs = self
            .compose_logs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let commit_logs = self
            .commit_logs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let metrics = Metrics {
            compose_p95_ms: p95(compose_logs.iter().map(|l| l.took_ms).collect()),
            memory_resource_ratio: memory_resource_ratio(&compose_logs),
            token_over_budget_rate: token_over_budget_rate(&compose_logs),
        };

        Snapshot {
            compose_logs,
            commit_logs,
            metrics,
        }
    }
}

/// Nearest-rank p95 over sorted latencies.
fn p95(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let index = ((values.len() as f64 * 0.95).ceil() as usize).max(1) - 1;
    values[index]
}

fn memory_resource_ratio(logs: &[ComposeLog]) -> String {
    let mut memory = 0usize;
    let mut resource = 0usize;
    for log in logs {
        for item in &log.selected_evidence {
            match item.source {
                EvidenceSource::Memory => memory += 1,
                EvidenceSource::Resource => resource += 1,
            }
        }
    }
    if memory + resource == 0 {
        return "0/0".to_string();
    }
    format!("{}/{}", memory, resource)
}

fn token_over_budget_rate(logs: &[ComposeLog]) -> f64 {
    if logs.is_empty() {
        return 0.0;
    }
    let over = logs
        .iter()
        .filter(|l| l.token_used > l.token_limit)
        .count();
    round3(over as f64 / logs.len() as f64)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
