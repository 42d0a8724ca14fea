//! Engine configuration.
//!
//! All tunables live here, grouped by pipeline stage:
//! - `retention`: extraction gates and summary triggers
//! - `retrieval`: planner budgets and query expansion
//! - `composition`: context package limits and diversity caps
//! - `observability`: trace flag
//! - `resource`: external retrieval backend wiring
//!
//! Every section deserializes with defaults, so a config file only needs
//! the keys it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::EngineError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub retention: RetentionPolicy,
    pub retrieval: RetrievalPolicy,
    pub composition: CompositionPolicy,
    pub observability: ObservabilityPolicy,
    pub resource: ResourcePolicy,
}

impl Config {
    /// Loads configuration from a YAML file.
    ///
    /// A missing path (or `None`) yields the defaults; a present but
    /// unparsable file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, EngineError> {
        serde_yaml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))
    }
}

/// What gets remembered, and when the working summary refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Turns between working-summary refreshes
    pub summarize_after_turns: u64,

    /// Fraction of the token limit at which recent turns force a refresh
    pub token_pressure_ratio: f64,

    /// Confidence assigned per provenance class
    pub confidence: ConfidenceWeights,

    /// Entity write gate
    pub entity_gate: EntityGate,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            summarize_after_turns: 12,
            token_pressure_ratio: 0.7,
            confidence: ConfidenceWeights::default(),
            entity_gate: EntityGate::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    /// Facts produced by tools (tasks, events)
    pub tool_derived: f64,

    /// Facts stated by the user (decisions, goals, retractions)
    pub user_asserted: f64,

    /// Facts the engine inferred (gated entities)
    pub inferred: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            tool_derived: 0.8,
            user_asserted: 0.9,
            inferred: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityGate {
    /// How many trailing turns the mention-frequency window covers
    pub window_turns: u64,

    /// Mentions within the window required before an entity is written
    pub freq_threshold: u64,
}

impl Default for EntityGate {
    fn default() -> Self {
        Self {
            window_turns: 20,
            freq_threshold: 2,
        }
    }
}

/// Planner budgets and expansion behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalPolicy {
    /// Final result budget a plan asks the backend for
    pub top_k: usize,

    /// Candidate pool size before reranking on the backend side
    pub candidate_k: usize,

    pub query_expansion: QueryExpansion,

    /// Three-state switch: `true`/`false` force it, absent means the
    /// planner decides per message
    pub enable_resource_retrieval: Option<bool>,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            top_k: 30,
            candidate_k: 200,
            query_expansion: QueryExpansion::default(),
            enable_resource_retrieval: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryExpansion {
    pub enabled: bool,

    /// Upper bound on queries per plan, primary included
    pub max_queries: usize,
}

impl Default for QueryExpansion {
    fn default() -> Self {
        Self {
            enabled: true,
            max_queries: 8,
        }
    }
}

/// Limits applied while assembling the final context package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionPolicy {
    /// Token budget for the whole package
    pub token_limit: usize,

    /// Recent turns carried verbatim into the package
    pub recent_turns_max: usize,

    /// Evidence items after fusion
    pub evidence_max_items: usize,

    /// Snippet truncation threshold, in characters
    pub max_snippet_chars: usize,

    /// Divisor for the chars-to-tokens estimate
    pub chars_per_token: usize,

    pub diversity: DiversityPolicy,
}

impl Default for CompositionPolicy {
    fn default() -> Self {
        Self {
            token_limit: 8192,
            recent_turns_max: 8,
            evidence_max_items: 12,
            max_snippet_chars: 800,
            chars_per_token: 4,
            diversity: DiversityPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityPolicy {
    /// Max evidence items sharing one document
    pub by_document: usize,

    /// Max evidence items sharing one source URI prefix
    pub by_source_uri: usize,

    /// Evidence budget split between memory and resource, as "M/N"
    pub memory_resource_ratio: String,
}

impl Default for DiversityPolicy {
    fn default() -> Self {
        Self {
            by_document: 3,
            by_source_uri: 2,
            memory_resource_ratio: "40/60".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityPolicy {
    /// Carry trace ids into plan and package debug blocks
    pub trace: bool,
}

impl Default for ObservabilityPolicy {
    fn default() -> Self {
        Self { trace: true }
    }
}

/// External retrieval backend ("deeprag") wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcePolicy {
    /// Backend endpoint URL; absent means no remote client is configured
    pub endpoint: Option<String>,

    /// Per-call timeout for the remote client
    pub timeout_ms: u64,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 2000,
        }
    }
}
