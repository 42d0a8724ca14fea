//! Relational retrieval over the entity index and recorded refs.
//!
//! Scores are raw term-containment counts (terms are not uniqued, so a
//! repeated query term counts twice). Ref hits are damped by 0.8; an
//! explicit entity is a stronger signal than a URI that merely contains
//! the term.

use serde_json::Map;

use crate::contracts::{Evidence, EvidenceRef, EvidenceSource, QueryMode};
use crate::models::{Entity, Ref};
use crate::text;

const REF_DAMPING: f64 = 0.8;

pub struct RelationalRetriever;

impl RelationalRetriever {
    pub fn retrieve(
        &self,
        query: &str,
        entities: &[Entity],
        refs: &[Ref],
        limit: usize,
    ) -> Vec<Evidence> {
        let terms = text::terms(&query.to_lowercase());
        if terms.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();

        for entity in entities {
            let name = entity.name.to_lowercase();
            let matched = terms
                .iter()
                .filter(|term| {
                    entity.canonical.contains(term.as_str()) || name.contains(term.as_str())
                })
                .count();
            if matched == 0 {
                continue;
            }
            hits.push(Evidence {
                id: format!("entity-{}", entity.id),
                source: EvidenceSource::Memory,
                source_uri: format!("cortex://entity/{}", entity.id),
                title: entity.name.clone(),
                snippet: format!("Entity {}: {}", entity.kind, entity.canonical),
                mode: Some(QueryMode::Relational),
                score: matched as f64,
                reference: EvidenceRef {
                    memory_item_id: Some(entity.memory_item_id.clone()),
                    ..EvidenceRef::default()
                },
                metadata: Map::new(),
            });
        }

        for reference in refs {
            let uri = reference.ref_uri.to_lowercase();
            let matched = terms
                .iter()
                .filter(|term| uri.contains(term.as_str()))
                .count();
            if matched == 0 {
                continue;
            }
            hits.push(Evidence {
                id: format!("ref-{}", reference.id),
                source: EvidenceSource::Memory,
                source_uri: reference.ref_uri.clone(),
                title: reference.ref_type.clone(),
                snippet: reference.ref_meta.to_string(),
                mode: Some(QueryMode::Relational),
                score: matched as f64 * REF_DAMPING,
                reference: EvidenceRef::default(),
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
