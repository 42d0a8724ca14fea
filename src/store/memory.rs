//! Memory item store with conflict resolution.
//!
//! Conflict identity is `(session, kind, key)`. Overwrite-eligible kinds
//! keep at most one active item per identity; the rest accumulate.
//! Items are never deleted: supersession and retraction flip the status
//! of the prior record inside the same write-lock scope as the insert,
//! so readers never observe two actives for an overwrite-eligible key.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    CandidateItem, ConflictKind, Entity, ExtractedMemory, MemoryConflict, MemoryItem, MemoryKind,
    MemoryStatus, WriteOutcome, WrittenItem,
};

#[derive(Default)]
struct SessionMemory {
    items: Vec<MemoryItem>,
    entities: Vec<Entity>,
}

#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionMemory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one extracted batch. Returns what was written and which
    /// prior items were superseded or retracted.
    pub fn upsert(&self, extracted: &ExtractedMemory) -> WriteOutcome {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .entry(extracted.session_id.clone())
            .or_default();

        let mut outcome = WriteOutcome::default();

        for candidate in &extracted.items {
            let existing = session.items.iter().position(|item| {
                item.kind == candidate.kind
                    && item.key == candidate.key
                    && item.status == MemoryStatus::Active
            });

            if candidate.status == MemoryStatus::Retracted {
                if let Some(idx) = existing {
                    let previous = session.items[idx].id.clone();
                    session.items[idx].status = MemoryStatus::Retracted;
                    outcome.conflicts.push(MemoryConflict {
                        kind: ConflictKind::Retract,
                        key: candidate.key.clone(),
                        previous_memory_item_id: previous,
                    });
                    continue;
                }
                // nothing to retract: keep the retraction itself on record
                let item = materialize(&extracted.session_id, candidate);
                outcome.items.push(written(&item));
                session.items.push(item);
                continue;
            }

            if candidate.kind.overwrite_eligible() {
                if let Some(idx) = existing {
                    let previous = session.items[idx].id.clone();
                    session.items[idx].status = MemoryStatus::Superseded;
                    outcome.conflicts.push(MemoryConflict {
                        kind: ConflictKind::Overwrite,
                        key: candidate.key.clone(),
                        previous_memory_item_id: previous,
                    });
                }
            }

            let item = materialize(&extracted.session_id, candidate);
            if item.kind == MemoryKind::Entities {
                update_entity_index(session, &item);
            }
            outcome.items.push(written(&item));
            session.items.push(item);
        }

        outcome.count = outcome.items.len();
        outcome
    }

    pub fn active_items(&self, session_id: &str) -> Vec<MemoryItem> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .map(|session| {
                session
                    .items
                    .iter()
                    .filter(|item| item.status == MemoryStatus::Active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all_items(&self, session_id: &str) -> Vec<MemoryItem> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .map(|session| session.items.clone())
            .unwrap_or_default()
    }

    pub fn entities(&self, session_id: &str) -> Vec<Entity> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .map(|session| session.entities.clone())
            .unwrap_or_default()
    }
}

fn materialize(session_id: &str, candidate: &CandidateItem) -> MemoryItem {
    MemoryItem {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        kind: candidate.kind,
        key: candidate.key.clone(),
        value: candidate.value.clone(),
        source_turn_id: candidate.source_turn_id.clone(),
        confidence: candidate.confidence,
        status: candidate.status,
        updated_at: candidate.updated_at,
    }
}

fn written(item: &MemoryItem) -> WrittenItem {
    WrittenItem {
        id: item.id.clone(),
        kind: item.kind,
        key: item.key.clone(),
        status: item.status,
        confidence: item.confidence,
    }
}

/// First write wins per (canonical, kind); later mentions only feed the
/// frequency gate.
fn update_entity_index(session: &mut SessionMemory, item: &MemoryItem) {
    let canonical = item
        .value
        .get("canonical")
        .and_then(Value::as_str)
        .or_else(|| item.value.get("name").and_then(Value::as_str))
        .unwrap_or("")
        .to_lowercase();
    if canonical.is_empty() {
        return;
    }
    let kind = item
        .value
        .get("kind")
        .and_then(Value::as_str)
        .unwrap_or("other")
        .to_string();
    if session
        .entities
        .iter()
        .any(|e| e.canonical == canonical && e.kind == kind)
    {
        return;
    }
    let name = item
        .value
        .get("name")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .unwrap_or_else(|| canonical.clone());
    session.entities.push(Entity {
        id: Uuid::new_v4().to_string(),
        name,
        kind,
        canonical,
        memory_item_id: item.id.clone(),
    });
}
