//! Local retrieval over session memory.
//!
//! Two lexical retrievers run per query: exact term overlap against
//! memory items and recent turns, and relational matching against the
//! entity index and recorded refs. Their hits merge into one
//! score-ordered list clipped to the evidence budget.

pub mod exact;
pub mod relational;

use std::sync::Arc;

pub use exact::ExactRetriever;
pub use relational::RelationalRetriever;

use crate::contracts::Evidence;
use crate::core::config::Config;
use crate::models::{Entity, MemoryItem, RecentTurn, Ref};

pub struct MemoryRetriever {
    config: Arc<Config>,
    exact: ExactRetriever,
    relational: RelationalRetriever,
}

impl MemoryRetriever {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            exact: ExactRetriever,
            relational: RelationalRetriever,
        }
    }

    pub fn retrieve(
        &self,
        query: &str,
        memory_items: &[MemoryItem],
        recent_turns: &[RecentTurn],
        entities: &[Entity],
        refs: &[Ref],
    ) -> Vec<Evidence> {
        let limit = self.config.composition.evidence_max_items;

        let mut evidence = self
            .exact
            .retrieve(query, memory_items, recent_turns, limit);
        evidence.extend(self.relational.retrieve(query, entities, refs, limit));

        evidence.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        evidence.truncate(limit);
        evidence
    }
}
