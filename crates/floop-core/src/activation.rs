//! Spreading activation and the conflict/override/dependency resolution
//! pass that turns a scored candidate set into the final active set
//! (§4.G).
//!
//! The competition/suppression shape (sort candidates by relevance, pick a
//! winner, suppress sufficiently-similar losers) mirrors the retrieval
//! competition manager used for memory-state transitions: same idea, here
//! applied to conflicting behaviors rather than competing recollections.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SpreadConfig;
use crate::model::{Edge, EdgeKind};

/// One step of spread from a seed behavior to a neighbor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationSpread {
    pub behavior_id: String,
    pub activation: f64,
    pub steps_from_seed: u32,
}

/// Spread activation outward from a set of seed behaviors (those that
/// already matched context) across `SimilarTo`/`CoActivated` edges, bounded
/// by `max_steps` and decaying multiplicatively at each hop. A neighbor's
/// incoming activation from a seed is
/// `seed_activation * edge_weight * spread_factor * decay_factor^steps`,
/// summed across all paths that reach it before `min_activation` is hit.
pub fn spread(
    seeds: &HashMap<String, f64>,
    edges: &[Edge],
    config: &SpreadConfig,
    now: DateTime<Utc>,
) -> HashMap<String, ActivationSpread> {
    let mut adjacency: HashMap<&str, Vec<&Edge>> = HashMap::new();
    for edge in edges {
        if !edge.kind.spreads() {
            continue;
        }
        adjacency.entry(edge.source.as_str()).or_default().push(edge);
        adjacency.entry(edge.target.as_str()).or_default().push(edge);
    }

    let mut result: HashMap<String, ActivationSpread> = seeds
        .iter()
        .map(|(id, act)| {
            (
                id.clone(),
                ActivationSpread {
                    behavior_id: id.clone(),
                    activation: *act,
                    steps_from_seed: 0,
                },
            )
        })
        .collect();

    let mut queue: VecDeque<(String, f64, u32)> = seeds
        .iter()
        .map(|(id, act)| (id.clone(), *act, 0))
        .collect();

    while let Some((current_id, current_activation, steps)) = queue.pop_front() {
        if steps >= config.max_steps {
            continue;
        }
        let Some(neighbors) = adjacency.get(current_id.as_str()) else {
            continue;
        };
        for edge in neighbors {
            let neighbor_id = if edge.source == current_id {
                &edge.target
            } else {
                &edge.source
            };
            let decayed_weight = edge.decayed_weight(now, config.temporal_decay_rate);
            let incoming = current_activation
                * decayed_weight
                * config.spread_factor
                * config.decay_factor.powi(steps as i32 + 1);

            if incoming < config.min_activation {
                continue;
            }

            let entry = result
                .entry(neighbor_id.clone())
                .or_insert_with(|| ActivationSpread {
                    behavior_id: neighbor_id.clone(),
                    activation: 0.0,
                    steps_from_seed: steps + 1,
                });
            entry.activation += incoming;
            entry.steps_from_seed = entry.steps_from_seed.min(steps + 1);

            queue.push_back((neighbor_id.clone(), incoming, steps + 1));
        }
    }

    result
}

/// A behavior in resolution contention, with its relevance score,
/// structural relationships to other candidates, and the lexicographic
/// tie-break fields §4.G orders on (specificity, then priority, then
/// confidence) — distinct from `relevance`, which blends in base-level
/// activation, feedback, and kind boost and is not itself part of the
/// documented tie-break chain.
#[derive(Debug, Clone)]
pub struct ResolutionCandidate {
    pub id: String,
    pub relevance: f64,
    pub specificity: usize,
    pub priority: u8,
    pub confidence: f64,
    pub requires: Vec<String>,
    pub overrides: Vec<String>,
    pub conflicts: Vec<String>,
}

/// Outcome of resolving overrides/conflicts/dependencies over a candidate
/// set (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub active_ids: Vec<String>,
    pub suppressed: Vec<SuppressionRecord>,
    pub missing_dependencies: Vec<MissingDependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressionRecord {
    pub suppressed_id: String,
    pub suppressed_by: String,
    pub reason: SuppressionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuppressionReason {
    Overridden,
    ConflictLost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingDependency {
    pub dependent_id: String,
    pub missing_id: String,
}

/// Resolve the final active set from a scored candidate pool: drop anyone
/// overridden by a present higher-relevance behavior, make conflicting
/// pairs compete (higher relevance wins, loser suppressed), then drop any
/// survivor whose `requires` list isn't fully satisfied by the remaining
/// set.
pub fn resolve(candidates: &[ResolutionCandidate]) -> ResolutionResult {
    let mut by_id: HashMap<&str, &ResolutionCandidate> =
        candidates.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut alive: HashSet<String> = candidates.iter().map(|c| c.id.clone()).collect();
    let mut suppressed = Vec::new();

    // 1. Overrides: if `a` overrides `b` and both are present, `b` is
    // suppressed outright regardless of relevance (explicit precedence).
    for c in candidates {
        if !alive.contains(&c.id) {
            continue;
        }
        for overridden_id in &c.overrides {
            if alive.remove(overridden_id) {
                suppressed.push(SuppressionRecord {
                    suppressed_id: overridden_id.clone(),
                    suppressed_by: c.id.clone(),
                    reason: SuppressionReason::Overridden,
                });
            }
        }
    }

    // 2. Conflicts: among still-alive behaviors, a conflicting pair
    // competes on relevance; the higher score survives.
    let mut conflict_pairs: Vec<(String, String)> = Vec::new();
    for c in candidates {
        if !alive.contains(&c.id) {
            continue;
        }
        for other_id in &c.conflicts {
            if alive.contains(other_id) && c.id != *other_id {
                let pair = if c.id < *other_id {
                    (c.id.clone(), other_id.clone())
                } else {
                    (other_id.clone(), c.id.clone())
                };
                if !conflict_pairs.contains(&pair) {
                    conflict_pairs.push(pair);
                }
            }
        }
    }

    for (a_id, b_id) in conflict_pairs {
        if !alive.contains(&a_id) || !alive.contains(&b_id) {
            continue;
        }
        let a = by_id.get(a_id.as_str()).unwrap();
        let b = by_id.get(b_id.as_str()).unwrap();
        // §4.G tie-break: higher specificity, then higher priority, then
        // higher confidence, then stable order (first-seen wins a full tie).
        let (winner, loser) = if tie_break_cmp(a, b).is_lt() { (b, a) } else { (a, b) };
        alive.remove(&loser.id);
        suppressed.push(SuppressionRecord {
            suppressed_id: loser.id.clone(),
            suppressed_by: winner.id.clone(),
            reason: SuppressionReason::ConflictLost,
        });
    }

    // 3. Dependencies: iterate to a fixed point — removing a behavior for
    // missing deps can cascade into its own dependents.
    let mut missing_dependencies = Vec::new();
    loop {
        let mut changed = false;
        for c in candidates {
            if !alive.contains(&c.id) {
                continue;
            }
            for required_id in &c.requires {
                if !alive.contains(required_id) {
                    missing_dependencies.push(MissingDependency {
                        dependent_id: c.id.clone(),
                        missing_id: required_id.clone(),
                    });
                    alive.remove(&c.id);
                    changed = true;
                    break;
                }
            }
        }
        if !changed {
            break;
        }
    }

    by_id.retain(|id, _| alive.contains(*id));
    // Preserve input order among ties so the final sort is stable.
    let mut active_ids: Vec<String> = candidates
        .iter()
        .map(|c| c.id.clone())
        .filter(|id| alive.contains(id))
        .collect();
    // §4.G final active-set ordering: specificity then priority.
    active_ids.sort_by(|a, b| {
        let ca = by_id.get(a.as_str());
        let cb = by_id.get(b.as_str());
        let (sa, pa) = ca.map(|c| (c.specificity, c.priority)).unwrap_or((0, 0));
        let (sb, pb) = cb.map(|c| (c.specificity, c.priority)).unwrap_or((0, 0));
        sb.cmp(&sa).then(pb.cmp(&pa))
    });

    ResolutionResult {
        active_ids,
        suppressed,
        missing_dependencies,
    }
}

/// §4.G conflict tie-break order: higher specificity, then higher priority,
/// then higher confidence. A fourth "stable order" tier is left to the
/// caller, which keeps `a`'s input position as the winner on a full tie.
fn tie_break_cmp(a: &ResolutionCandidate, b: &ResolutionCandidate) -> std::cmp::Ordering {
    a.specificity
        .cmp(&b.specificity)
        .then(a.priority.cmp(&b.priority))
        .then(a.confidence.total_cmp(&b.confidence))
}
