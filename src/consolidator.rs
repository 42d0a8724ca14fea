//! Working-summary consolidation.
//!
//! One summary per session, rebuilt when a trigger fires. Trigger
//! priority: turn threshold, then token pressure over the recent-turn
//! window, then a stage event (a decision recorded or a task marked done
//! in the committed turn). Without a trigger the previous summary is
//! returned unchanged, flagged `not_triggered`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::core::clock::Clock;
use crate::core::config::Config;
use crate::models::{MemoryItem, MemoryKind, TriggerReason, TurnRange, WorkingSummary};

#[derive(Default)]
struct SummaryState {
    last_summary_turn: u64,
    current: Option<WorkingSummary>,
}

pub struct Consolidator {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    sessions: RwLock<HashMap<String, SummaryState>>,
}

impl Consolidator {
    pub fn new(config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Re-evaluates the trigger policy after a commit and rebuilds the
    /// summary when one fires.
    pub fn update(
        &self,
        session_id: &str,
        turn_count: u64,
        recent_turns: &[crate::models::RecentTurn],
        memory_items: &[MemoryItem],
        stage_event: bool,
    ) -> WorkingSummary {
        let retention = &self.config.retention;
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let state = sessions.entry(session_id.to_string()).or_default();

        let turns_since = turn_count.saturating_sub(state.last_summary_turn);
        let pressure_limit =
            retention.token_pressure_ratio * self.config.composition.token_limit as f64;

        let reason = if turns_since >= retention.summarize_after_turns {
            Some(TriggerReason::TurnThreshold)
        } else if self.estimate_tokens(recent_turns) as f64 > pressure_limit {
            Some(TriggerReason::TokenPressure)
        } else if stage_event {
            Some(TriggerReason::StageEvent)
        } else {
            None
        };

        let Some(reason) = reason else {
            return match &state.current {
                Some(summary) => {
                    let mut summary = summary.clone();
                    summary.triggered = false;
                    summary.trigger_reason = TriggerReason::NotTriggered;
                    summary
                }
                None => self.default_summary(),
            };
        };

        let window = retention.summarize_after_turns.saturating_sub(1);
        let summary = WorkingSummary {
            version: state.current.as_ref().map(|s| s.version + 1).unwrap_or(1),
            source_turn_range: TurnRange {
                from: turn_count.saturating_sub(window).max(1),
                to: turn_count,
            },
            generated_at: self.clock.now(),
            text: build_text(memory_items),
            triggered: true,
            trigger_reason: reason,
        };

        state.current = Some(summary.clone());
        state.last_summary_turn = turn_count;
        summary
    }

    /// Current summary, or the empty default when none has been built.
    pub fn latest_summary(&self, session_id: &str) -> WorkingSummary {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .and_then(|state| state.current.clone())
            .unwrap_or_else(|| self.default_summary())
    }

    fn estimate_tokens(&self, recent_turns: &[crate::models::RecentTurn]) -> usize {
        let chars_per_token = self.config.composition.chars_per_token.max(1);
        recent_turns
            .iter()
            .map(|turn| turn.content.chars().count() / chars_per_token)
            .sum()
    }

    fn default_summary(&self) -> WorkingSummary {
        WorkingSummary {
            version: 0,
            source_turn_range: TurnRange { from: 0, to: 0 },
            generated_at: self.clock.now(),
            text: String::new(),
            triggered: false,
            trigger_reason: TriggerReason::Empty,
        }
    }
}

fn build_text(memory_items: &[MemoryItem]) -> String {
    let mut lines = Vec::new();
    for (heading, kind) in [
        ("Goals:", MemoryKind::Goals),
        ("Decisions:", MemoryKind::Decisions),
        ("Tasks:", MemoryKind::Tasks),
        ("Key References:", MemoryKind::Entities),
    ] {
        lines.push(heading.to_string());
        let keys: Vec<&str> = memory_items
            .iter()
            .filter(|item| item.kind == kind)
            .take(5)
            .map(|item| item.key.as_str())
            .collect();
        if keys.is_empty() {
            lines.push("- None".to_string());
        } else {
            for key in keys {
                lines.push(format!("- {}", key));
            }
        }
    }
    lines.push("Open Questions:".to_string());
    lines.push("- None".to_string());
    lines.join("\n")
}
