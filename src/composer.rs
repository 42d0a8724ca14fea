//! Context package assembly.
//!
//! Takes everything the pipeline produced for one request and lays it
//! out as a `ContextPackage`: summary, clipped recent turns, fused
//! evidence, the caller's message, budget constraints and a debug block
//! that explains what was selected and what was not.

use std::sync::Arc;

use uuid::Uuid;

use crate::contracts::{
    ContextPackage, DiversityCaps, DroppedEvidence, PackageConstraints, PackageDebug,
    PlannerDebug, RetrievalPlan, TokenBudget, TraceIds, TruncationLimits, UserMessage,
    CONTRACT_VERSION,
};
use crate::core::clock::Clock;
use crate::core::config::Config;
use crate::fusion::FusionOutcome;
use crate::models::{RecentTurn, WorkingSummary};

pub struct ContextComposer {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

impl ContextComposer {
    pub fn new(config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn compose(
        &self,
        session_id: &str,
        user_message: &str,
        plan: &RetrievalPlan,
        plan_id: &str,
        summary: &WorkingSummary,
        recent_turns: Vec<RecentTurn>,
        bundle: FusionOutcome,
    ) -> ContextPackage {
        let composition = &self.config.composition;
        let context_id = Uuid::new_v4().to_string();
        // Estimated over the full turn window, before clipping.
        let used_estimate = self.estimate_tokens(
            &summary.text,
            &recent_turns,
            &bundle,
            user_message,
        );

        let mut recent = recent_turns;
        recent.truncate(composition.recent_turns_max);

        let why_selected = bundle
            .selected
            .iter()
            .map(|e| format!("{} score={} source={}", e.id, e.score, e.source))
            .collect();
        let dropped = bundle
            .dropped
            .iter()
            .map(|d| DroppedEvidence {
                id: d.evidence.id.clone(),
                reason: d.reason.clone(),
            })
            .collect();

        ContextPackage {
            version: CONTRACT_VERSION.to_string(),
            context_id: context_id.clone(),
            session_id: session_id.to_string(),
            created_at: self.clock.now(),
            system_blocks: Vec::new(),
            developer_blocks: Vec::new(),
            working_summary: summary.text.clone(),
            recent_turns: recent,
            evidence: bundle.selected,
            user_message: UserMessage {
                role: "user".to_string(),
                content: user_message.to_string(),
            },
            constraints: PackageConstraints {
                token_budget: TokenBudget {
                    limit: composition.token_limit,
                    used_estimate,
                },
                diversity: DiversityCaps {
                    by_document: composition.diversity.by_document,
                    by_source: composition.diversity.by_source_uri,
                },
                truncation: TruncationLimits {
                    snippets_max_chars: composition.max_snippet_chars,
                    recent_turns_max: composition.recent_turns_max,
                },
            },
            debug: PackageDebug {
                trace: TraceIds {
                    context_id,
                    request_id: plan.request_id.clone(),
                    plan_id: plan_id.to_string(),
                },
                planner: PlannerDebug {
                    request_id: plan.request_id.clone(),
                    purpose: plan.purpose,
                    queries: plan.queries.iter().map(|q| q.text.clone()).collect(),
                },
                why_selected,
                ignored: bundle.ignored_fields,
                dropped,
            },
        }
    }

    fn estimate_tokens(
        &self,
        summary: &str,
        recent_turns: &[RecentTurn],
        bundle: &FusionOutcome,
        user_message: &str,
    ) -> usize {
        let mut chars = summary.chars().count();
        chars += recent_turns
            .iter()
            .map(|t| t.content.chars().count())
            .sum::<usize>();
        chars += bundle
            .selected
            .iter()
            .map(|e| e.snippet.chars().count())
            .sum::<usize>();
        chars += user_message.chars().count();

        let per_token = self.config.composition.chars_per_token.max(1);
        (chars as f64 / per_token as f64).ceil() as usize
    }
}
