//! Retrieval planning.
//!
//! Turns one user message plus session context into a `RetrievalPlan`:
//! a primary hybrid query, cheap token-overlap expansions, purpose
//! classification, the resource-retrieval gate and global filters. The
//! hint vocabulary is deliberately multilingual; research-style requests
//! arrive in more than one language.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value};

use crate::contracts::{
    DiversityCaps, GlobalFilters, PerModeBudget, PlanBudget, PlanCaller, PlanDebug, PlanOutput,
    PlanPurpose, PlanQuery, QueryMode, ResourceRetrievalDecision, RetrievalPlan, TimeRange,
    CONTRACT_VERSION,
};
use crate::core::clock::Clock;
use crate::core::config::Config;
use crate::models::{RecentTurn, Ref};
use crate::text;

/// Phrases that mark a message as wanting external evidence.
pub const RESOURCE_HINTS: [&str; 10] = [
    "查资料",
    "引用",
    "reference",
    "research",
    "标准",
    "论文",
    "文档",
    "compare",
    "对比",
    "来源",
];

const CALLER_APP: &str = "cortex";
const RESOURCE_BACKEND: &str = "deeprag";

fn resource_content_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://|\.(md|txt|pdf)").expect("resource pattern is valid"))
}

pub struct RetrievalPlanner {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

impl RetrievalPlanner {
    pub fn new(config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn plan(
        &self,
        request_id: &str,
        session_id: &str,
        user_message: &str,
        agent_state: &Value,
        recent_turns: &[RecentTurn],
        refs: &[Ref],
    ) -> RetrievalPlan {
        let lowered = user_message.to_lowercase();
        let hinted = RESOURCE_HINTS.iter().any(|hint| lowered.contains(hint));

        let purpose = if hinted {
            PlanPurpose::Research
        } else {
            PlanPurpose::Qa
        };

        let (enabled, reason) = self.resource_decision(hinted, recent_turns, refs);

        let retrieval = &self.config.retrieval;
        let composition = &self.config.composition;

        RetrievalPlan {
            version: CONTRACT_VERSION.to_string(),
            request_id: request_id.to_string(),
            purpose,
            queries: self.build_queries(user_message),
            global_filters: self.build_filters(&lowered),
            budget: PlanBudget {
                top_k: retrieval.top_k,
                candidate_k: retrieval.candidate_k,
                per_mode_k: PerModeBudget {
                    exact: 10,
                    semantic: 10,
                    hybrid: retrieval.top_k,
                    relational: 10,
                    associative: 8,
                },
                diversity: DiversityCaps {
                    by_document: composition.diversity.by_document,
                    by_source: composition.diversity.by_source_uri,
                },
            },
            output: PlanOutput {
                include_snippets: true,
                max_snippet_chars: composition.max_snippet_chars,
            },
            resource_retrieval: ResourceRetrievalDecision {
                enabled,
                reason: reason.to_string(),
            },
            debug: PlanDebug {
                trace: self.config.observability.trace,
                caller: PlanCaller {
                    app: CALLER_APP.to_string(),
                    session_id: session_id.to_string(),
                },
                recent_turns_count: recent_turns.len(),
                agent_state: agent_state.clone(),
                ignored_fields: Vec::new(),
            },
        }
    }

    /// Primary query plus token-overlap expansions.
    fn build_queries(&self, user_message: &str) -> Vec<PlanQuery> {
        let mut queries = vec![PlanQuery {
            text: user_message.to_string(),
            mode: QueryMode::Hybrid,
            weight: 1.0,
            filters: Map::new(),
            hints: Map::new(),
        }];

        let expansion = &self.config.retrieval.query_expansion;
        if !expansion.enabled || expansion.max_queries <= 1 {
            return queries;
        }

        for (idx, phrase) in expand_phrases(user_message)
            .into_iter()
            .take(expansion.max_queries - 1)
            .enumerate()
        {
            let mut hints = Map::new();
            hints.insert("expanded".to_string(), Value::Bool(true));
            queries.push(PlanQuery {
                text: phrase,
                mode: QueryMode::Associative,
                weight: 0.8 - 0.05 * idx as f64,
                filters: Map::new(),
                hints,
            });
        }

        queries
    }

    fn resource_decision(
        &self,
        hinted: bool,
        recent_turns: &[RecentTurn],
        refs: &[Ref],
    ) -> (bool, &'static str) {
        match self.config.retrieval.enable_resource_retrieval {
            Some(true) => (true, "explicitly_enabled"),
            Some(false) => (false, "explicitly_disabled"),
            None => {
                if hinted {
                    (true, "user_requested_external_evidence")
                } else if !refs.is_empty() {
                    (true, "has_recent_refs")
                } else if recent_turns
                    .iter()
                    .any(|turn| resource_content_pattern().is_match(&turn.content))
                {
                    (true, "recent_turns_reference_resources")
                } else {
                    (false, "auto_disabled_or_not_needed")
                }
            }
        }
    }

    fn build_filters(&self, lowered: &str) -> GlobalFilters {
        let mut filters = GlobalFilters::default();
        if lowered.contains("最近") || lowered.contains("recent") {
            let now = self.clock.now();
            filters.time_range = Some(TimeRange {
                from: now - chrono::Duration::days(7),
                to: now,
            });
        }
        if lowered.contains(RESOURCE_BACKEND) {
            filters.source_uri_prefix = Some(vec![RESOURCE_BACKEND.to_string()]);
        }
        filters
    }
}

/// First three tokens, last three tokens, and the sorted token set, as
/// three candidate phrases. Dropped when the message has fewer than two
/// tokens or the phrase just restates the message.
fn expand_phrases(user_message: &str) -> Vec<String> {
    let tokens = text::unique_terms(user_message);
    if tokens.len() < 2 {
        return Vec::new();
    }

    let head: Vec<String> = tokens.iter().take(3).cloned().collect();
    let tail: Vec<String> = tokens.iter().rev().take(3).rev().cloned().collect();
    let mut sorted = tokens.clone();
    sorted.sort();

    let mut phrases = Vec::new();
    for phrase in [head.join(" "), tail.join(" "), sorted.join(" ")] {
        if phrase != user_message && !phrases.contains(&phrase) {
            phrases.push(phrase);
        }
    }
    phrases
}
