//! Exact term-overlap retrieval.
//!
//! Scores memory items by the fraction of query terms found in the
//! lowered `key + value` text, then adds the item's confidence as a
//! bonus. The zero-overlap cut happens before the bonus, so confidence
//! alone never surfaces an unrelated item. Recent turns score plain
//! overlap on message content, no bonus.

use serde_json::Map;

use crate::contracts::{Evidence, EvidenceRef, EvidenceSource, QueryMode};
use crate::models::{MemoryItem, RecentTurn};
use crate::text;

pub struct ExactRetriever;

impl ExactRetriever {
    pub fn retrieve(
        &self,
        query: &str,
        memory_items: &[MemoryItem],
        recent_turns: &[RecentTurn],
        limit: usize,
    ) -> Vec<Evidence> {
        let terms = text::unique_terms(&query.to_lowercase());
        if terms.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();

        for item in memory_items {
            let haystack = format!("{} {}", item.key, item.value).to_lowercase();
            let overlap = overlap_ratio(&terms, &haystack);
            if overlap <= 0.0 {
                continue;
            }
            hits.push(Evidence {
                id: item.id.clone(),
                source: EvidenceSource::Memory,
                source_uri: format!("cortex://memory/{}", item.id),
                title: item.key.clone(),
                snippet: item.value.to_string(),
                mode: Some(QueryMode::Exact),
                score: overlap + item.confidence,
                reference: EvidenceRef {
                    memory_item_id: Some(item.id.clone()),
                    ..EvidenceRef::default()
                },
                metadata: Map::new(),
            });
        }

        for (idx, turn) in recent_turns.iter().enumerate() {
            let content = turn.content.to_lowercase();
            let overlap = overlap_ratio(&terms, &content);
            if overlap <= 0.0 {
                continue;
            }
            hits.push(Evidence {
                id: format!("turn-{}", idx),
                source: EvidenceSource::Memory,
                source_uri: "cortex://recent_turn".to_string(),
                title: "Recent Turn".to_string(),
                snippet: turn.content.clone(),
                mode: Some(QueryMode::Exact),
                score: overlap,
                reference: EvidenceRef {
                    turn_id: Some(turn.turn_id.clone()),
                    message_id: Some(turn.message_id.clone()),
                    ..EvidenceRef::default()
                },
                metadata: Map::new(),
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        hits
    }
}

fn overlap_ratio(terms: &[String], haystack: &str) -> f64 {
    let matched = terms
        .iter()
        .filter(|term| haystack.contains(term.as_str()))
        .count();
    matched as f64 / terms.len() as f64
}
