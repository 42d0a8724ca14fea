//! Pipeline runtime.
//!
//! Owns every component and drives the two operations:
//! - `commit_turn`: append events, extract memory, upsert, consolidate
//! - `compose_context`: plan, retrieve local + external, fuse, compose
//!
//! Calls for one session serialize on a per-session mutex held across
//! the whole operation; different sessions run in parallel. Contract
//! validators run at each producer boundary and abort the call on
//! violation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::composer::ContextComposer;
use crate::consolidator::Consolidator;
use crate::contracts::{
    validate_pack, validate_package, validate_plan, ContextPackage, EvidencePack, PackExplain,
    PackStats, CONTRACT_VERSION,
};
use crate::core::clock::Clock;
use crate::core::config::Config;
use crate::core::errors::EngineError;
use crate::extractor::MemoryExtractor;
use crate::fusion::FusionMerger;
use crate::models::{
    CommitExplain, CommitResult, Entity, MemoryItem, MemoryKind, SummaryExplain, Turn, TurnEvents,
};
use crate::observability::{CommitLog, ComposeLog, SelectedEvidence, Snapshot, Tracker};
use crate::planner::RetrievalPlanner;
use crate::resource::{NullClient, ResourceRetriever};
use crate::retrievers::MemoryRetriever;
use crate::store::{EventStore, MemoryStore};

/// One guard per session id, held across a whole commit or compose so
/// store mutations for a session never interleave.
struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn for_session(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Everything `GET /api/diagnostics` returns.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub turns: Vec<Turn>,
}

pub struct Runtime {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    events: EventStore,
    memory: MemoryStore,
    extractor: MemoryExtractor,
    consolidator: Consolidator,
    planner: RetrievalPlanner,
    retriever: MemoryRetriever,
    resource_client: Arc<dyn ResourceRetriever>,
    merger: FusionMerger,
    composer: ContextComposer,
    tracker: Tracker,
    locks: SessionLocks,
}

impl Runtime {
    pub fn build(
        config: Config,
        resource_client: Option<Arc<dyn ResourceRetriever>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            events: EventStore::new(),
            memory: MemoryStore::new(),
            extractor: MemoryExtractor::new(config.clone()),
            consolidator: Consolidator::new(config.clone(), clock.clone()),
            planner: RetrievalPlanner::new(config.clone(), clock.clone()),
            retriever: MemoryRetriever::new(config.clone()),
            resource_client: resource_client.unwrap_or_else(|| Arc::new(NullClient)),
            merger: FusionMerger::new(config.clone()),
            composer: ContextComposer::new(config.clone(), clock.clone()),
            tracker: Tracker::new(),
            locks: SessionLocks::new(),
            clock,
            config,
        }
    }

    pub async fn commit_turn(&self, session_id: &str, turn_events: TurnEvents) -> CommitResult {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;
        let started = Instant::now();

        let now = self.clock.now();
        let turn = self.events.append_turn(session_id, turn_events, now);
        let window = self.config.retention.entity_gate.window_turns as usize;
        let frequencies = self.events.entity_frequencies(session_id, window);

        let extracted = self.extractor.extract(&turn, &frequencies);
        let written = self.memory.upsert(&extracted);

        let turn_count = self.events.turns_count(session_id);
        let recent_turns = self
            .events
            .recent_turns(session_id, self.config.composition.recent_turns_max);
        let stage_event = extracted.items.iter().any(|item| {
            item.kind == MemoryKind::Decisions
                || (item.kind == MemoryKind::Tasks
                    && item.value.get("status").and_then(Value::as_str) == Some("done"))
        });
        let summary = self.consolidator.update(
            session_id,
            turn_count,
            &recent_turns,
            &self.memory.active_items(session_id),
            stage_event,
        );

        let commit_id = Uuid::new_v4().to_string();
        let took_ms = elapsed_ms(started);
        tracing::info!(
            "commit {}: session={} turn={} written={} summary_triggered={}",
            commit_id,
            session_id,
            turn.id,
            written.count,
            summary.triggered
        );

        self.tracker.log_commit(CommitLog {
            commit_id: commit_id.clone(),
            session_id: session_id.to_string(),
            turn_id: turn.id.clone(),
            memory_items: written.items.clone(),
            conflicts: written.conflicts.clone(),
            summary_triggered: summary.triggered,
            summary_reason: summary.trigger_reason,
            took_ms,
        });

        CommitResult {
            ok: true,
            commit_id,
            session_id: session_id.to_string(),
            turn_id: turn.id,
            explain: CommitExplain {
                retention: extracted.explain,
                conflicts: written.conflicts.clone(),
                summary: SummaryExplain {
                    triggered: summary.triggered,
                    reason: summary.trigger_reason,
                },
            },
            memory_written: written,
            summary,
        }
    }

    pub async fn compose_context(
        &self,
        session_id: &str,
        user_message: &str,
        agent_state: Value,
    ) -> Result<ContextPackage, EngineError> {
        let lock = self.locks.for_session(session_id);
        let _guard = lock.lock().await;
        let started = Instant::now();

        let limit = self.config.composition.recent_turns_max;
        let recent_turns = self.events.recent_turns(session_id, limit);
        let refs = self.events.recent_refs(session_id, limit);

        let request_id = Uuid::new_v4().to_string();
        let plan = self.planner.plan(
            &request_id,
            session_id,
            user_message,
            &agent_state,
            &recent_turns,
            &refs,
        );
        validate_plan(&plan)?;

        let memory_evidence = self.retriever.retrieve(
            user_message,
            &self.memory.active_items(session_id),
            &recent_turns,
            &self.memory.entities(session_id),
            &refs,
        );

        let pack = if plan.resource_retrieval.enabled {
            self.resource_client.retrieve(&plan).await
        } else {
            disabled_pack(&request_id, self.clock.now())
        };
        validate_pack(&pack)?;

        let mut bundle = self
            .merger
            .merge(user_message, memory_evidence, &pack.evidences);
        bundle
            .ignored_fields
            .extend(pack.explain.ignored_fields.iter().cloned());

        let summary = self.consolidator.latest_summary(session_id);
        let package = self.composer.compose(
            session_id,
            user_message,
            &plan,
            &pack.plan_id,
            &summary,
            recent_turns,
            bundle,
        );
        validate_package(&package)?;

        let took_ms = elapsed_ms(started);
        tracing::info!(
            "compose {}: session={} evidence={} took_ms={}",
            package.context_id,
            session_id,
            package.evidence.len(),
            took_ms
        );
        self.tracker.log_compose(ComposeLog {
            context_id: package.context_id.clone(),
            session_id: session_id.to_string(),
            request_id,
            plan_id: pack.plan_id.clone(),
            selected_evidence: package
                .evidence
                .iter()
                .map(|e| SelectedEvidence {
                    id: e.id.clone(),
                    source: e.source,
                    score: e.score,
                })
                .collect(),
            ignored_fields: package.debug.ignored.clone(),
            token_used: package.constraints.token_budget.used_estimate,
            token_limit: package.constraints.token_budget.limit,
            took_ms,
        });

        Ok(package)
    }

    pub fn diagnostics(&self) -> DiagnosticsReport {
        DiagnosticsReport {
            snapshot: self.tracker.snapshot(),
            turns: self.events.all_turns(None),
        }
    }

    pub fn active_memory(&self, session_id: &str) -> Vec<MemoryItem> {
        self.memory.active_items(session_id)
    }

    pub fn entities(&self, session_id: &str) -> Vec<Entity> {
        self.memory.entities(session_id)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Pack used when the planner decided against external retrieval; the
/// composer still discloses the decision through a warning.
fn disabled_pack(request_id: &str, now: DateTime<Utc>) -> EvidencePack {
    EvidencePack {
        version: CONTRACT_VERSION.to_string(),
        request_id: request_id.to_string(),
        plan_id: format!("local-{}", request_id),
        generated_at: now.to_rfc3339(),
        evidences: Vec::new(),
        stats: PackStats::default(),
        explain: PackExplain::default(),
        warnings: vec!["resource retrieval disabled by planner".to_string()],
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    (ms * 100.0).round() / 100.0
}
