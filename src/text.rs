//! Shared term tokenizer.
//!
//! The planner, the exact retriever and the fusion reranker all split text
//! with the same pattern so they agree on what counts as a term. `\w`
//! matches unicode word characters, which keeps CJK queries workable
//! without a segmenter; hyphenated identifiers stay whole.

use std::sync::OnceLock;

use regex::Regex;

fn term_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w-]+").expect("term pattern is valid"))
}

/// All terms in order, duplicates kept.
pub fn terms(text: &str) -> Vec<String> {
    term_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Terms in first-occurrence order, duplicates removed.
pub fn unique_terms(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    terms(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
