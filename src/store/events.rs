//! Append-only turn log.
//!
//! One log per session. Appending assigns the turn id, a gapless
//! per-session sequence number and timestamps for nested messages/refs
//! that arrived without one. Nothing else mutates the log; every other
//! method is a read over the trailing window.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Message, RecentTurn, Ref, Turn, TurnEvents};

#[derive(Default)]
struct SessionLog {
    turns: Vec<Turn>,
}

#[derive(Default)]
pub struct EventStore {
    sessions: RwLock<HashMap<String, SessionLog>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one turn and returns the normalized record.
    pub fn append_turn(
        &self,
        session_id: &str,
        events: TurnEvents,
        created_at: DateTime<Utc>,
    ) -> Turn {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let log = sessions.entry(session_id.to_string()).or_default();

        let turn_id = Uuid::new_v4().to_string();
        let seq = log.turns.len() as u64 + 1;

        let messages = events
            .messages
            .into_iter()
            .map(|entry| Message {
                id: entry.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                turn_id: turn_id.clone(),
                role: entry.role,
                content: entry.content,
                created_at: entry.created_at.unwrap_or(created_at),
            })
            .collect();

        let refs = events
            .refs
            .into_iter()
            .map(|entry| Ref {
                id: entry.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                turn_id: turn_id.clone(),
                ref_type: entry.ref_type,
                ref_uri: entry.ref_uri,
                ref_meta: entry.ref_meta,
                created_at: entry.created_at.unwrap_or(created_at),
            })
            .collect();

        let turn = Turn {
            id: turn_id,
            session_id: session_id.to_string(),
            seq,
            created_at,
            messages,
            refs,
            tasks: events.tasks,
            decisions: events.decisions,
            goals: events.goals,
            events: events.events,
            preferences: events.preferences,
            entities: events.entities,
            retractions: events.retractions,
        };

        log.turns.push(turn.clone());
        turn
    }

    pub fn turns_count(&self, session_id: &str) -> u64 {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .map(|log| log.turns.len() as u64)
            .unwrap_or(0)
    }

    /// Messages of the last `limit` turns, flattened in chronological order.
    pub fn recent_turns(&self, session_id: &str, limit: usize) -> Vec<RecentTurn> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let Some(log) = sessions.get(session_id) else {
            return Vec::new();
        };

        tail(&log.turns, limit)
            .iter()
            .flat_map(|turn| {
                turn.messages.iter().map(|msg| RecentTurn {
                    turn_id: turn.id.clone(),
                    message_id: msg.id.clone(),
                    role: msg.role.clone(),
                    content: msg.content.clone(),
                    created_at: msg.created_at,
                })
            })
            .collect()
    }

    /// Refs attached to the last `limit` turns.
    pub fn recent_refs(&self, session_id: &str, limit: usize) -> Vec<Ref> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let Some(log) = sessions.get(session_id) else {
            return Vec::new();
        };

        tail(&log.turns, limit)
            .iter()
            .flat_map(|turn| turn.refs.iter().cloned())
            .collect()
    }

    /// Entity mention counts over the last `window_turns` turns, keyed by
    /// lower-cased canonical (or name). Every mention counts, gated or not.
    pub fn entity_frequencies(&self, session_id: &str, window_turns: usize) -> HashMap<String, u64> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let Some(log) = sessions.get(session_id) else {
            return HashMap::new();
        };

        let mut frequencies = HashMap::new();
        for turn in tail(&log.turns, window_turns) {
            for entity in &turn.entities {
                let key = entity.canonical_lower();
                if key.is_empty() {
                    continue;
                }
                *frequencies.entry(key).or_insert(0) += 1;
            }
        }
        frequencies
    }

    /// Full dump for diagnostics, ordered by (session, seq).
    pub fn all_turns(&self, session_id: Option<&str>) -> Vec<Turn> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let mut turns: Vec<Turn> = match session_id {
            Some(id) => sessions
                .get(id)
                .map(|log| log.turns.clone())
                .unwrap_or_default(),
            None => sessions
                .values()
                .flat_map(|log| log.turns.iter().cloned())
                .collect(),
        };
        turns.sort_by(|a, b| a.session_id.cmp(&b.session_id).then(a.seq.cmp(&b.seq)));
        turns
    }
}

fn tail(turns: &[Turn], limit: usize) -> &[Turn] {
    let start = turns.len().saturating_sub(limit);
    &turns[start..]
}
