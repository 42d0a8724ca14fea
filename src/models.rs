//! Session and memory data model.
//!
//! Three layers:
//! - `TurnEvents` and its entry types: what callers hand to `commit_turn`.
//!   Each entry is a tagged envelope with the fields the gates read, plus a
//!   flattened opaque payload that rides along untouched.
//! - Normalized records owned by the stores: `Turn`, `Message`, `Ref`,
//!   `MemoryItem`, `Entity`, `WorkingSummary`.
//! - Commit results: `CommitResult` and its explain blocks, returned to the
//!   caller and logged, never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn empty_object() -> Value {
    Value::Object(Map::new())
}

// ===== Memory taxonomy =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Tasks,
    Decisions,
    Goals,
    Events,
    Preferences,
    Entities,
}

impl MemoryKind {
    /// Kinds where a same-key write replaces the prior active item.
    /// The rest accumulate.
    pub fn overwrite_eligible(&self) -> bool {
        matches!(
            self,
            MemoryKind::Preferences | MemoryKind::Goals | MemoryKind::Tasks
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Tasks => "tasks",
            MemoryKind::Decisions => "decisions",
            MemoryKind::Goals => "goals",
            MemoryKind::Events => "events",
            MemoryKind::Preferences => "preferences",
            MemoryKind::Entities => "entities",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    Active,
    Superseded,
    Retracted,
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MemoryStatus::Active => "active",
            MemoryStatus::Superseded => "superseded",
            MemoryStatus::Retracted => "retracted",
        };
        f.write_str(name)
    }
}

// ===== Turn event input =====

/// Everything a caller can attach to one committed turn. Every field
/// defaults to empty so partial payloads deserialize cleanly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnEvents {
    pub messages: Vec<MessageEntry>,
    pub refs: Vec<RefEntry>,
    pub tasks: Vec<FactEntry>,
    pub decisions: Vec<FactEntry>,
    pub goals: Vec<FactEntry>,
    pub events: Vec<FactEntry>,
    pub preferences: Vec<PreferenceEntry>,
    pub entities: Vec<EntityEntry>,
    pub retractions: Vec<RetractionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub ref_type: String,
    pub ref_uri: String,
    #[serde(default = "empty_object")]
    pub ref_meta: Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Tasks, decisions, goals and events share this envelope. `status` is the
/// only typed payload field the pipeline reads (stage-event detection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactEntry {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceEntry {
    pub key: String,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(default)]
    pub remember: bool,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl EntityEntry {
    /// Lower-cased identity the frequency window and entity index key on.
    pub fn canonical_lower(&self) -> String {
        self.canonical
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("")
            .to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetractionEntry {
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

// ===== Normalized session records =====

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub turn_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ref {
    pub id: String,
    pub turn_id: String,
    pub ref_type: String,
    pub ref_uri: String,
    pub ref_meta: Value,
    pub created_at: DateTime<Utc>,
}

/// One committed turn. Immutable after append; `seq` is per-session,
/// gapless, starting at 1.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub id: String,
    pub session_id: String,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub refs: Vec<Ref>,
    pub tasks: Vec<FactEntry>,
    pub decisions: Vec<FactEntry>,
    pub goals: Vec<FactEntry>,
    pub events: Vec<FactEntry>,
    pub preferences: Vec<PreferenceEntry>,
    pub entities: Vec<EntityEntry>,
    pub retractions: Vec<RetractionEntry>,
}

/// Flattened message view over the trailing turn window.
#[derive(Debug, Clone, Serialize)]
pub struct RecentTurn {
    pub turn_id: String,
    pub message_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryItem {
    pub id: String,
    pub session_id: String,
    pub kind: MemoryKind,
    pub key: String,
    /// Originating entry, kept opaque
    pub value: Value,
    pub source_turn_id: String,
    pub confidence: f64,
    pub status: MemoryStatus,
    pub updated_at: DateTime<Utc>,
}

/// Derived entity index row; one per (canonical, kind) per session.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub canonical: String,
    pub memory_item_id: String,
}

// ===== Working summary =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    TurnThreshold,
    TokenPressure,
    StageEvent,
    NotTriggered,
    Empty,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerReason::TurnThreshold => "turn_threshold",
            TriggerReason::TokenPressure => "token_pressure",
            TriggerReason::StageEvent => "stage_event",
            TriggerReason::NotTriggered => "not_triggered",
            TriggerReason::Empty => "empty",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TurnRange {
    pub from: u64,
    pub to: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkingSummary {
    /// Monotonic per session; 0 means no summary has been built yet
    pub version: u32,
    pub source_turn_range: TurnRange,
    pub generated_at: DateTime<Utc>,
    pub text: String,
    pub triggered: bool,
    pub trigger_reason: TriggerReason,
}

// ===== Extraction output =====

#[derive(Debug, Clone)]
pub struct CandidateItem {
    pub kind: MemoryKind,
    pub key: String,
    pub value: Value,
    pub source_turn_id: String,
    pub confidence: f64,
    pub status: MemoryStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExtractedMemory {
    pub session_id: String,
    pub items: Vec<CandidateItem>,
    /// Gate decisions, one line per candidate, verbatim format
    pub explain: Vec<String>,
}

// ===== Commit results =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Overwrite,
    Retract,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryConflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub key: String,
    pub previous_memory_item_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub key: String,
    pub status: MemoryStatus,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteOutcome {
    pub count: usize,
    pub items: Vec<WrittenItem>,
    pub conflicts: Vec<MemoryConflict>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryExplain {
    pub triggered: bool,
    pub reason: TriggerReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitExplain {
    pub retention: Vec<String>,
    pub conflicts: Vec<MemoryConflict>,
    pub summary: SummaryExplain,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitResult {
    pub ok: bool,
    pub commit_id: String,
    pub session_id: String,
    pub turn_id: String,
    pub memory_written: WriteOutcome,
    pub summary: WorkingSummary,
    pub explain: CommitExplain,
}
