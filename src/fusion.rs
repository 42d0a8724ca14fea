//! Evidence fusion.
//!
//! Merges memory-side and resource-side evidence into the list the
//! composer embeds. Order of operations:
//! 1. normalize resource items into the common evidence shape
//! 2. dedupe on provenance keys, higher score wins
//! 3. rerank with a small lexical boost (ordering only)
//! 4. diversity caps per document and per source prefix
//! 5. budget split between sources, then snippet truncation

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::contracts::{Evidence, EvidenceRef, EvidenceSource, ResourceEvidence};
use crate::core::config::Config;
use crate::text;

const LEXICAL_BOOST: f64 = 0.05;
const DEFAULT_RESOURCE_SCORE: f64 = 0.4;

#[derive(Debug, Clone)]
pub struct DroppedItem {
    pub evidence: Evidence,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct FusionOutcome {
    pub selected: Vec<Evidence>,
    pub dropped: Vec<DroppedItem>,
    pub ignored_fields: Vec<String>,
}

pub struct FusionMerger {
    config: Arc<Config>,
}

impl FusionMerger {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn merge(
        &self,
        query: &str,
        memory_evidence: Vec<Evidence>,
        resource_evidence: &[ResourceEvidence],
    ) -> FusionOutcome {
        let mut combined = memory_evidence;
        combined.extend(resource_evidence.iter().map(normalize_resource));

        let deduped = dedupe(combined);
        let ranked = rank(deduped, query);
        let (diversified, dropped) = self.apply_diversity(ranked);
        let selected = self.apply_budget(diversified);

        FusionOutcome {
            selected,
            dropped,
            ignored_fields: Vec::new(),
        }
    }

    fn apply_diversity(&self, items: Vec<Evidence>) -> (Vec<Evidence>, Vec<DroppedItem>) {
        let caps = &self.config.composition.diversity;
        let mut doc_counter: HashMap<String, usize> = HashMap::new();
        let mut source_counter: HashMap<String, usize> = HashMap::new();
        let mut kept = Vec::new();
        let mut dropped = Vec::new();

        for item in items {
            let document_key = item
                .reference
                .document_id
                .clone()
                .unwrap_or_else(|| item.title.clone());
            let source_key = source_prefix(&item.source_uri);

            let doc_seen = doc_counter.get(&document_key).copied().unwrap_or(0);
            let source_seen = source_counter.get(&source_key).copied().unwrap_or(0);
            if doc_seen >= caps.by_document || source_seen >= caps.by_source_uri {
                dropped.push(DroppedItem {
                    evidence: item,
                    reason: "diversity".to_string(),
                });
                continue;
            }

            *doc_counter.entry(document_key).or_insert(0) += 1;
            *source_counter.entry(source_key).or_insert(0) += 1;
            kept.push(item);
        }

        (kept, dropped)
    }

    /// Splits the evidence budget between sources, fills any shortfall
    /// from leftover diversified items, and truncates snippets last.
    fn apply_budget(&self, items: Vec<Evidence>) -> Vec<Evidence> {
        let composition = &self.config.composition;
        let limit = composition.evidence_max_items;
        let max_chars = composition.max_snippet_chars;
        let (memory_share, _) = parse_ratio(&composition.diversity.memory_resource_ratio);
        let memory_limit = (limit as f64 * memory_share).floor() as usize;
        let resource_limit = limit - memory_limit;

        let mut picked: Vec<usize> = Vec::new();
        let mut taken = vec![false; items.len()];

        let mut memory_taken = 0usize;
        for (idx, item) in items.iter().enumerate() {
            if memory_taken == memory_limit {
                break;
            }
            if item.source == EvidenceSource::Memory {
                taken[idx] = true;
                picked.push(idx);
                memory_taken += 1;
            }
        }

        let mut resource_taken = 0usize;
        for (idx, item) in items.iter().enumerate() {
            if resource_taken == resource_limit {
                break;
            }
            if !taken[idx] && item.source == EvidenceSource::Resource {
                taken[idx] = true;
                picked.push(idx);
                resource_taken += 1;
            }
        }

        for idx in 0..items.len() {
            if picked.len() >= limit {
                break;
            }
            if !taken[idx] {
                taken[idx] = true;
                picked.push(idx);
            }
        }

        let mut slots: Vec<Option<Evidence>> = items.into_iter().map(Some).collect();
        picked
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .take(limit)
            .map(|item| truncate_snippet(item, max_chars))
            .collect()
    }
}

fn normalize_resource(item: &ResourceEvidence) -> Evidence {
    let signals = item.signals.unwrap_or_default();
    let score = item
        .score
        .or(signals.rerank_score)
        .or(signals.rrf_score)
        .unwrap_or(DEFAULT_RESOURCE_SCORE);
    let reference = item.reference.clone().unwrap_or_else(|| EvidenceRef {
        document_id: item.document_id.clone(),
        section_id: item.section_id.clone(),
        chunk_index: item.metadata.get("chunk_index").and_then(Value::as_i64),
        ..EvidenceRef::default()
    });

    Evidence {
        id: item.id.clone(),
        source: EvidenceSource::Resource,
        source_uri: item.source_uri.clone(),
        title: item.title.clone(),
        snippet: item.snippet.clone(),
        mode: None,
        score,
        reference,
        metadata: item.metadata.clone(),
    }
}

/// First occurrence keeps its position; a later duplicate only replaces
/// it when the score is strictly higher.
fn dedupe(items: Vec<Evidence>) -> Vec<Evidence> {
    let mut kept: Vec<Evidence> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items {
        let key = dedupe_key(&item);
        match index.get(&key) {
            Some(&at) if item.score > kept[at].score => kept[at] = item,
            Some(_) => {}
            None => {
                index.insert(key, kept.len());
                kept.push(item);
            }
        }
    }

    kept
}

fn dedupe_key(item: &Evidence) -> String {
    let reference = &item.reference;
    if let (Some(doc), Some(sec)) = (&reference.document_id, &reference.section_id) {
        let chunk = reference
            .chunk_index
            .map(|c| c.to_string())
            .unwrap_or_default();
        format!("resource:{}:{}:{}", doc, sec, chunk)
    } else if let Some(id) = &reference.memory_item_id {
        format!("memory:{}", id)
    } else if let (Some(turn), Some(message)) = (&reference.turn_id, &reference.message_id) {
        format!("memory-turn:{}:{}", turn, message)
    } else {
        format!("fallback:{}", item.id)
    }
}

/// The boost only reorders; stored scores stay what retrieval produced.
fn rank(items: Vec<Evidence>, query: &str) -> Vec<Evidence> {
    let terms = text::terms(&query.to_lowercase());
    let mut scored: Vec<(f64, Evidence)> = items
        .into_iter()
        .map(|item| (item.score + lexical_boost(&item, &terms), item))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, item)| item).collect()
}

fn lexical_boost(item: &Evidence, terms: &[String]) -> f64 {
    let haystack = format!("{} {}", item.title, item.snippet).to_lowercase();
    let hits = terms
        .iter()
        .filter(|term| haystack.contains(term.as_str()))
        .count();
    hits as f64 * LEXICAL_BOOST
}

fn source_prefix(uri: &str) -> String {
    let prefix = uri.split('/').take(3).collect::<Vec<_>>().join("/");
    if prefix.is_empty() {
        uri.to_string()
    } else {
        prefix
    }
}

fn truncate_snippet(mut item: Evidence, max_chars: usize) -> Evidence {
    if item.snippet.chars().count() > max_chars {
        let cut: String = item.snippet.chars().take(max_chars).collect();
        item.snippet = format!("{}...", cut);
    }
    item
}

fn parse_ratio(text: &str) -> (f64, f64) {
    let mut parts = text.split('/');
    let memory: i64 = parts
        .next()
        .and_then(|part| part.trim().parse().ok())
        .unwrap_or(0);
    let resource: i64 = parts
        .next()
        .and_then(|part| part.trim().parse().ok())
        .unwrap_or(0);
    let total = memory + resource;
    if total <= 0 {
        return (0.4, 0.6);
    }
    (memory as f64 / total as f64, resource as f64 / total as f64)
}
