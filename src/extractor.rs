//! Turn events to candidate memory items.
//!
//! Tasks, decisions, goals and events are written unconditionally.
//! Preferences must be confirmed. Entities pass through a three-way gate:
//! explicitly flagged `remember`, canonical value that looks like an
//! identifier (path, URL or dotted name), or enough mentions inside the
//! frequency window. Retractions always produce a retracted-status item.
//!
//! Every decision leaves one line in the explain trail. The formats are
//! fixed (`write <kind>:<key>`, `skip preferences:<key> not confirmed`,
//! `skip entities:<key> below threshold`, `retract <kind>:<key>`);
//! downstream tooling parses them.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::core::config::Config;
use crate::models::{CandidateItem, ExtractedMemory, MemoryKind, MemoryStatus, Turn};

pub struct MemoryExtractor {
    config: Arc<Config>,
}

impl MemoryExtractor {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn extract(
        &self,
        turn: &Turn,
        entity_frequencies: &HashMap<String, u64>,
    ) -> ExtractedMemory {
        let confidence = &self.config.retention.confidence;
        let mut items = Vec::new();
        let mut explain = Vec::new();

        for (kind, entries, weight) in [
            (MemoryKind::Tasks, &turn.tasks, confidence.tool_derived),
            (
                MemoryKind::Decisions,
                &turn.decisions,
                confidence.user_asserted,
            ),
            (MemoryKind::Goals, &turn.goals, confidence.user_asserted),
            (MemoryKind::Events, &turn.events, confidence.tool_derived),
        ] {
            for entry in entries {
                items.push(candidate(turn, kind, &entry.key, entry, weight));
                explain.push(format!("write {}:{}", kind, entry.key));
            }
        }

        for entry in &turn.preferences {
            if entry.confirmed {
                items.push(candidate(
                    turn,
                    MemoryKind::Preferences,
                    &entry.key,
                    entry,
                    confidence.user_asserted,
                ));
                explain.push(format!("write preferences:{}", entry.key));
            } else {
                explain.push(format!("skip preferences:{} not confirmed", entry.key));
            }
        }

        let threshold = self.config.retention.entity_gate.freq_threshold;
        for entry in &turn.entities {
            let canonical = entry.canonical.as_deref().unwrap_or("");
            let structural = canonical.contains('/')
                || canonical.contains("http")
                || canonical.contains('.');
            let frequent = entity_frequencies
                .get(&entry.canonical_lower())
                .copied()
                .unwrap_or(0)
                >= threshold;

            if entry.remember || structural || frequent {
                items.push(candidate(
                    turn,
                    MemoryKind::Entities,
                    &entry.key,
                    entry,
                    confidence.inferred,
                ));
                explain.push(format!("write entities:{}", entry.key));
            } else {
                explain.push(format!("skip entities:{} below threshold", entry.key));
            }
        }

        for entry in &turn.retractions {
            items.push(CandidateItem {
                kind: entry.kind,
                key: entry.key.clone(),
                value: serde_json::to_value(entry).unwrap_or_default(),
                source_turn_id: turn.id.clone(),
                confidence: confidence.user_asserted,
                status: MemoryStatus::Retracted,
                updated_at: turn.created_at,
            });
            explain.push(format!("retract {}:{}", entry.kind, entry.key));
        }

        ExtractedMemory {
            session_id: turn.session_id.clone(),
            items,
            explain,
        }
    }
}

fn candidate<T: Serialize>(
    turn: &Turn,
    kind: MemoryKind,
    key: &str,
    entry: &T,
    confidence: f64,
) -> CandidateItem {
    CandidateItem {
        kind,
        key: key.to_string(),
        value: serde_json::to_value(entry).unwrap_or_default(),
        source_turn_id: turn.id.clone(),
        confidence,
        status: MemoryStatus::Active,
        updated_at: turn.created_at,
    }
}
