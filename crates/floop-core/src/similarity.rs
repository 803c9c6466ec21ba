//! Text and structural similarity helpers used by the learning pipeline
//! (placement, §4.D) and edge derivation (§4.E).
//!
//! Grounded on the keyword-extraction/matching approach of the codebase
//! pattern detector: lowercase, split on whitespace, filter short tokens,
//! dedup and sort for stable comparison.

use std::collections::BTreeSet;

use crate::model::{Behavior, WhenPredicate};

/// Lowercases and splits on whitespace/punctuation, dropping tokens shorter
/// than 3 characters (stopword-adjacent noise).
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|s| s.to_string())
        .collect()
}

/// Jaccard similarity between two token sets: `|A ∩ B| / |A ∪ B|`.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Content similarity between two candidate statements (§4.D placement).
pub fn content_sim(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

/// Tag-set similarity.
pub fn tag_sim(a: &[String], b: &[String]) -> f64 {
    let a: BTreeSet<String> = a.iter().map(|t| t.to_lowercase()).collect();
    let b: BTreeSet<String> = b.iter().map(|t| t.to_lowercase()).collect();
    jaccard(&a, &b)
}

/// Number of tags shared between two tag lists (case-insensitive).
pub fn count_shared_tags(a: &[String], b: &[String]) -> usize {
    let a: BTreeSet<String> = a.iter().map(|t| t.to_lowercase()).collect();
    let b: BTreeSet<String> = b.iter().map(|t| t.to_lowercase()).collect();
    a.intersection(&b).count()
}

/// Overlap between two when-predicates: `(matched_keys * 2) / (|a| + |b|)`
/// (§4.C). Empty+empty is defined as full overlap; empty+nonempty as none.
pub fn when_overlap(a: &WhenPredicate, b: &WhenPredicate) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let matched = a.0.iter().filter(|(k, v)| b.0.get(*k) == Some(*v)).count();
    (matched * 2) as f64 / (a.len() + b.len()) as f64
}

/// Combined placement similarity score used to decide whether a learned
/// candidate should merge into an existing behavior (§4.D): weighted blend
/// of content, tag, and when-predicate overlap.
pub fn placement_similarity(candidate: &Behavior, existing: &Behavior) -> f64 {
    let content = content_sim(&candidate.content.canonical, &existing.content.canonical);
    let tags = tag_sim(&candidate.content.tags, &existing.content.tags);
    let when = when_overlap(&candidate.when, &existing.when);
    0.6 * content + 0.2 * tags + 0.2 * when
}

/// A small fixed dictionary of domain keywords used to auto-tag a freshly
/// learned behavior from its canonical text, mirroring the pattern
/// detector's keyword-extraction approach but applied at learn time rather
/// than detection time.
const TAG_DICTIONARY: &[&str] = &[
    "test", "tests", "testing", "security", "performance", "style", "format",
    "naming", "error", "errors", "logging", "config", "database", "api",
    "git", "commit", "review", "docs", "documentation", "async", "concurrency",
    "memory", "type", "types", "lint", "deploy", "ci", "build",
];

/// Extract tags for a behavior from its canonical text plus any extra tags
/// already supplied by the correction.
pub fn extract_tags(canonical: &str, extra_tags: &[String]) -> Vec<String> {
    let tokens = tokenize(canonical);
    let mut tags: Vec<String> = TAG_DICTIONARY
        .iter()
        .filter(|kw| tokens.contains(**kw))
        .map(|kw| kw.to_string())
        .collect();
    tags.extend(extra_tags.iter().map(|t| t.to_lowercase()));
    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Behavior;

    #[test]
    fn jaccard_identical_sets_is_one() {
        let a = tokenize("use pathlib instead of os path");
        let b = tokenize("use pathlib instead of os path");
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn jaccard_disjoint_sets_is_zero() {
        let a = tokenize("use pathlib for paths");
        let b = tokenize("write unit tests always");
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[test]
    fn content_sim_partial_overlap() {
        let sim = content_sim("never commit secrets to git", "never commit api keys to git");
        assert!(sim > 0.0 && sim < 1.0);
    }

    #[test]
    fn when_overlap_empty_predicates_match_fully() {
        let a = WhenPredicate::new();
        let b = WhenPredicate::new();
        assert_eq!(when_overlap(&a, &b), 1.0);
    }

    #[test]
    fn when_overlap_partial() {
        let mut a = WhenPredicate::new();
        a.insert("language", "python");
        a.insert("task", "test");
        let mut b = WhenPredicate::new();
        b.insert("language", "python");
        // (matched=1 * 2) / (|a|=2 + |b|=1) = 0.667
        assert!((when_overlap(&a, &b) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn when_overlap_empty_vs_nonempty_is_zero() {
        let a = WhenPredicate::new();
        let mut b = WhenPredicate::new();
        b.insert("language", "python");
        assert_eq!(when_overlap(&a, &b), 0.0);
    }

    #[test]
    fn extract_tags_pulls_dictionary_hits() {
        let tags = extract_tags("always write tests before committing", &[]);
        assert!(tags.contains(&"test".to_string()) || tags.contains(&"tests".to_string()));
    }

    #[test]
    fn placement_similarity_high_for_near_duplicates() {
        let a = Behavior::new("a", "n", "never commit secrets to the repository");
        let b = Behavior::new("b", "n", "never commit secrets to the repo");
        let sim = placement_similarity(&a, &b);
        assert!(sim > 0.3, "expected meaningful similarity, got {sim}");
    }
}
