//! Edge derivation: synthesize `overrides` and `similar-to` edges across the
//! behavior graph, either over all pairs or a given subset (§4.E).
//!
//! Loosely grounded on the connection-graph bookkeeping pattern (tracking a
//! connection count and reporting summary stats after a pass), adapted here
//! to a one-shot derivation rather than a running dreamer process.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::config::FloopConfig;
use crate::error::Result;
use crate::model::{Behavior, Edge, EdgeKind};
use crate::similarity::{content_sim, count_shared_tags};

/// Above this many candidate pairs, a subset derivation pass logs a warning
/// rather than silently taking a long time (§4.E).
const SUBSET_PAIR_WARNING_THRESHOLD: usize = 10_000;

/// Summary of one derivation pass: edge counts, a 10-bucket histogram of the
/// pairwise content-similarity scores examined, and graph connectivity
/// (§4.E: "report a 10-bucket score histogram and connectivity").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationReport {
    pub pairs_examined: usize,
    pub edges_created: usize,
    pub edges_updated: usize,
    /// Bucket `i` counts pairs whose content-similarity score falls in
    /// `[i/10, (i+1)/10)` (the top bucket also catches an exact `1.0`).
    pub score_histogram: [usize; 10],
    /// Live behaviors reachable from at least one other live behavior by a
    /// derived-or-existing edge.
    pub connected: usize,
    /// Live behaviors with no edge to any other live behavior.
    pub islands: usize,
}

/// Derive `overrides`/`similar-to` edges across all pairs in `behaviors`.
/// `overrides` is proposed in each direction where `is_more_specific` holds;
/// `similar-to` is proposed when content similarity lands in
/// `[similar_to_threshold, similar_to_upper_bound)` or the pair shares at
/// least `min_shared_tags_for_edge` tags (§4.E).
pub fn derive_all_pairs(
    behaviors: &[Behavior],
    existing_edges: &[Edge],
    config: &FloopConfig,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<(Vec<Edge>, DerivationReport)> {
    let mut pairs_examined = 0;
    let mut edges_created = 0;
    let mut edges_updated = 0;
    let mut score_histogram = [0usize; 10];
    let mut new_edges = Vec::new();

    for i in 0..behaviors.len() {
        for j in (i + 1)..behaviors.len() {
            cancel.check()?;
            let a = &behaviors[i];
            let b = &behaviors[j];
            if a.is_forgotten() || b.is_forgotten() {
                continue;
            }
            pairs_examined += 1;
            score_histogram[histogram_bucket(content_sim(&a.content.canonical, &b.content.canonical))] += 1;

            for edge in propose_pair_edges(a, b, config, now) {
                if edge_already_exists(existing_edges, &edge) {
                    edges_updated += 1;
                } else {
                    edges_created += 1;
                }
                new_edges.push(edge);
            }
        }
    }

    let (connected, islands) = connectivity(behaviors, existing_edges, &new_edges);

    Ok((
        new_edges,
        DerivationReport {
            pairs_examined,
            edges_created,
            edges_updated,
            score_histogram,
            connected,
            islands,
        },
    ))
}

/// Derive edges only between a named subset of behaviors (by ID) and the
/// rest of the graph — cheaper than a full all-pairs pass after a pack
/// install or a single new behavior is committed. Pairs where both
/// endpoints are pre-existing (neither in `subset_ids`) are never examined.
pub fn derive_subset(
    subset_ids: &[String],
    behaviors: &[Behavior],
    existing_edges: &[Edge],
    config: &FloopConfig,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<(Vec<Edge>, DerivationReport)> {
    let subset_set: HashSet<&str> = subset_ids.iter().map(|s| s.as_str()).collect();
    let existing_count = behaviors.len().saturating_sub(subset_ids.len());
    if subset_ids.len().saturating_mul(existing_count) > SUBSET_PAIR_WARNING_THRESHOLD {
        tracing::warn!(
            new = subset_ids.len(),
            existing = existing_count,
            "subset edge derivation spans more than {SUBSET_PAIR_WARNING_THRESHOLD} pairs"
        );
    }

    let mut pairs_examined = 0;
    let mut edges_created = 0;
    let mut edges_updated = 0;
    let mut score_histogram = [0usize; 10];
    let mut new_edges = Vec::new();

    for id in subset_ids {
        let Some(a) = behaviors.iter().find(|b| &b.id == id) else {
            continue;
        };
        if a.is_forgotten() {
            continue;
        }
        for b in behaviors {
            cancel.check()?;
            if &b.id == id || b.is_forgotten() {
                continue;
            }
            // If both endpoints are new, examine the unordered pair only
            // once (when `id` is the lexicographically smaller of the two).
            if subset_set.contains(b.id.as_str()) && id.as_str() > b.id.as_str() {
                continue;
            }
            pairs_examined += 1;
            score_histogram[histogram_bucket(content_sim(&a.content.canonical, &b.content.canonical))] += 1;

            for edge in propose_pair_edges(a, b, config, now) {
                if edge_already_exists(existing_edges, &edge) {
                    edges_updated += 1;
                } else {
                    edges_created += 1;
                }
                new_edges.push(edge);
            }
        }
    }

    let (connected, islands) = connectivity(behaviors, existing_edges, &new_edges);

    Ok((
        new_edges,
        DerivationReport {
            pairs_examined,
            edges_created,
            edges_updated,
            score_histogram,
            connected,
            islands,
        },
    ))
}

fn histogram_bucket(score: f64) -> usize {
    ((score * 10.0).floor() as isize).clamp(0, 9) as usize
}

/// `overrides` (both directions where specificity holds) and `similar-to`
/// (score in the configured band, or enough shared tags) for one pair.
fn propose_pair_edges(a: &Behavior, b: &Behavior, config: &FloopConfig, now: DateTime<Utc>) -> Vec<Edge> {
    let mut edges = Vec::new();

    if a.when.is_more_specific(&b.when) {
        edges.push(Edge::new(a.id.clone(), b.id.clone(), EdgeKind::Overrides, 1.0, now));
    } else if b.when.is_more_specific(&a.when) {
        edges.push(Edge::new(b.id.clone(), a.id.clone(), EdgeKind::Overrides, 1.0, now));
    }

    let sim = content_sim(&a.content.canonical, &b.content.canonical);
    let shared_tags = count_shared_tags(&a.content.tags, &b.content.tags);
    let in_band = sim >= config.similar_to_threshold && sim < config.similar_to_upper_bound;
    let qualifies = in_band || shared_tags >= config.min_shared_tags_for_edge;
    if qualifies {
        let weight = sim.max(shared_tags as f64 * 0.1).min(config.similar_to_upper_bound);
        edges.push(Edge::new(a.id.clone(), b.id.clone(), EdgeKind::SimilarTo, weight, now));
    }

    edges
}

/// `similar-to` dedups symmetrically (§3.3 invariant 5); `overrides` is
/// directional and dedups only on an exact source/target match.
fn edge_already_exists(existing_edges: &[Edge], edge: &Edge) -> bool {
    match edge.kind {
        EdgeKind::SimilarTo => existing_edges.iter().any(|e| {
            e.kind == EdgeKind::SimilarTo
                && ((e.source == edge.source && e.target == edge.target)
                    || (e.source == edge.target && e.target == edge.source))
        }),
        EdgeKind::Overrides => existing_edges
            .iter()
            .any(|e| e.kind == EdgeKind::Overrides && e.source == edge.source && e.target == edge.target),
        _ => false,
    }
}

/// Connected-component census over live behaviors, counting edges from both
/// `existing_edges` and the freshly `derived` set.
fn connectivity(behaviors: &[Behavior], existing_edges: &[Edge], derived: &[Edge]) -> (usize, usize) {
    let live_ids: Vec<&str> = behaviors.iter().filter(|b| !b.is_forgotten()).map(|b| b.id.as_str()).collect();
    let live_set: HashSet<&str> = live_ids.iter().copied().collect();

    let mut adjacency: HashMap<&str, HashSet<&str>> = live_ids.iter().map(|id| (*id, HashSet::new())).collect();
    for edge in existing_edges.iter().chain(derived.iter()) {
        if live_set.contains(edge.source.as_str()) && live_set.contains(edge.target.as_str()) {
            adjacency.entry(edge.source.as_str()).or_default().insert(edge.target.as_str());
            adjacency.entry(edge.target.as_str()).or_default().insert(edge.source.as_str());
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut connected = 0;
    let mut islands = 0;
    for id in &live_ids {
        if visited.contains(id) {
            continue;
        }
        let mut stack = vec![*id];
        visited.insert(id);
        let mut size = 0;
        while let Some(node) = stack.pop() {
            size += 1;
            if let Some(neighbors) = adjacency.get(node) {
                for &next in neighbors {
                    if visited.insert(next) {
                        stack.push(next);
                    }
                }
            }
        }
        if size == 1 {
            islands += 1;
        } else {
            connected += 1;
        }
    }
    (connected, islands)
}
