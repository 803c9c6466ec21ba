//! Learning pipeline: correction → candidate behavior → placement → triage
//! → commit (§4.D).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FloopConfig;
use crate::model::{Behavior, BehaviorKind, Correction, Edge, EdgeKind};
use crate::similarity::{extract_tags, placement_similarity};

/// Placement thresholds (§4.D step 2), fixed by spec and independent of the
/// configurable `auto_accept_threshold`/`similar_to_threshold` (which govern
/// step 3 auto-accept and §4.E edge derivation respectively).
const MERGE_THRESHOLD: f64 = 0.9;
const SPECIALIZE_THRESHOLD: f64 = 0.7;

/// Which of the three placement actions (§4.D step 2) a candidate took.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum Placement {
    /// No existing behavior was similar enough; the candidate stands alone.
    Create,
    /// Folded into an existing, near-duplicate behavior.
    Merge { target: String },
    /// Committed as a new, more-specific refinement of an existing one.
    Specialize { target: String },
}

/// Outcome of running a correction through the pipeline. Business outcomes
/// (auto-accept vs. review) are never errors — only infrastructure failures
/// are (§7 policy). The candidate node is always written to the graph
/// (§4.D step 4); `requires_review`/`auto_accepted` only affect its
/// provenance, not whether it lands in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningResult {
    pub behavior: Behavior,
    pub placement: Placement,
    /// Similarity of `behavior` to `placement`'s target, `0.0` for `Create`.
    pub similarity: f64,
    /// Confidence assigned to the placement decision itself (§4.D step 2):
    /// 0.9 isolated create, 0.7 default create, 0.5 merge, 0.6 specialize.
    pub placement_confidence: f64,
    pub auto_accepted: bool,
    pub requires_review: bool,
    pub review_reasons: Vec<String>,
    /// Edges proposed alongside the candidate: `overrides` where specificity
    /// holds, `similar-to` for 0.5 ≤ score < 0.9 (§4.D step 2).
    pub proposed_edges: Vec<Edge>,
}

impl LearningResult {
    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }
}

/// Build a fresh, unplaced candidate behavior from a correction, including
/// kind inference and auto-tagging.
pub fn extract_candidate(correction: &Correction, now: DateTime<Utc>) -> Behavior {
    let mut behavior = Behavior::new(
        correction.id.clone(),
        summarize_name(&correction.corrected_action),
        correction.corrected_action.clone(),
    );
    behavior.kind = infer_kind(&correction.corrected_action, &correction.extra_tags);
    behavior.content.tags = extract_tags(&correction.corrected_action, &correction.extra_tags);
    behavior.provenance.source_type = "learned".to_string();
    behavior.stats.created_at = now;
    behavior.stats.updated_at = now;

    for (key, value) in [
        ("language", correction.context.file_language.clone()),
        ("task", correction.context.task.clone()),
    ] {
        if let Some(value) = value {
            behavior.when.insert(key, value);
        }
    }
    behavior
}

fn summarize_name(corrected_action: &str) -> String {
    let first_line = corrected_action.lines().next().unwrap_or(corrected_action);
    first_line.chars().take(80).collect()
}

/// Kind-inference heuristic, pinned per the documented Open Question
/// resolution: keyword rules checked in priority order, falling back to
/// `Directive`.
pub fn infer_kind(corrected_action: &str, extra_tags: &[String]) -> BehaviorKind {
    let lower = corrected_action.to_lowercase();

    let constraint_markers = ["never", "always", "must", "don't", "do not"];
    if constraint_markers.iter().any(|m| lower.contains(m)) {
        return BehaviorKind::Constraint;
    }

    let step_markers = ["first", "then", "next", "finally"];
    let has_numbered_steps = lower.contains("1.") || lower.contains("step 1");
    if has_numbered_steps || step_markers.iter().filter(|m| lower.contains(**m)).count() >= 2 {
        return BehaviorKind::Procedure;
    }

    let prefers_tag = extra_tags.iter().any(|t| t.eq_ignore_ascii_case("preference"));
    let prefers_phrase = lower.contains("prefer") || lower.contains("rather than");
    if prefers_tag || prefers_phrase {
        return BehaviorKind::Preference;
    }

    BehaviorKind::Directive
}

/// A similarity hit against one existing behavior, used both to pick the
/// placement target and to evaluate the "any similar behavior scores >
/// 0.85" triage condition against the full ranked list, not just the winner.
struct SimilarityHit<'a> {
    existing: &'a Behavior,
    score: f64,
}

/// Rank every live existing behavior by placement similarity to `candidate`,
/// most similar first.
fn rank_similar<'a>(candidate: &Behavior, existing: &'a [Behavior]) -> Vec<SimilarityHit<'a>> {
    let mut hits: Vec<SimilarityHit<'a>> = existing
        .iter()
        .filter(|b| !b.is_forgotten())
        .map(|b| SimilarityHit { existing: b, score: placement_similarity(candidate, b) })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits
}

/// Run the full extract → place → triage decision for a correction against
/// a scope's current behaviors. Does not write anything; the caller (the
/// engine) commits the result to the store.
pub fn learn(
    correction: &Correction,
    existing: &[Behavior],
    config: &FloopConfig,
    now: DateTime<Utc>,
) -> LearningResult {
    let candidate = extract_candidate(correction, now);
    let ranked = rank_similar(&candidate, existing);
    let closest = ranked.first();

    let (placement, similarity, placement_confidence, behavior) = match closest {
        Some(hit) if hit.score >= MERGE_THRESHOLD => {
            // Merge: reinforce the existing target rather than create a
            // sibling node.
            let mut merged = hit.existing.clone();
            merged.stats.times_confirmed += 1;
            merged.stats.updated_at = now;
            merged.confidence =
                (merged.confidence + config.reinforcement.boost).min(config.reinforcement.ceiling);
            (Placement::Merge { target: hit.existing.id.clone() }, hit.score, 0.5, merged)
        }
        Some(hit)
            if hit.score >= SPECIALIZE_THRESHOLD
                && hit.score < MERGE_THRESHOLD
                && candidate.when.is_more_specific(&hit.existing.when) =>
        {
            let mut specialized = candidate.clone();
            specialized.overrides.push(hit.existing.id.clone());
            (Placement::Specialize { target: hit.existing.id.clone() }, hit.score, 0.6, specialized)
        }
        _ if ranked.is_empty() => (Placement::Create, 0.0, 0.9, candidate.clone()),
        _ => (Placement::Create, 0.0, 0.7, candidate.clone()),
    };

    let proposed_edges = propose_edges(&behavior, &placement, &ranked, config, now);

    let mut review_reasons = Vec::new();
    if behavior.kind == BehaviorKind::Constraint {
        review_reasons.push("kind is constraint".to_string());
    }
    if matches!(placement, Placement::Merge { .. }) {
        review_reasons.push("placement action is merge".to_string());
    }
    if !behavior.conflicts.is_empty() {
        review_reasons.push("candidate has declared conflicts".to_string());
    }
    if placement_confidence < 0.6 {
        review_reasons.push("placement confidence below 0.6".to_string());
    }
    if ranked.iter().any(|h| h.score > 0.85) {
        review_reasons.push("a similar behavior scores above 0.85".to_string());
    }

    let requires_review = !review_reasons.is_empty();
    let auto_accepted = !requires_review && placement_confidence >= config.auto_accept_threshold;

    let mut behavior = behavior;
    behavior.provenance.approved_by = Some(if auto_accepted { "auto".to_string() } else { "pending".to_string() });
    if auto_accepted {
        behavior.provenance.approved_at = Some(now);
    }

    LearningResult {
        behavior,
        placement,
        similarity,
        placement_confidence,
        auto_accepted,
        requires_review,
        review_reasons,
        proposed_edges,
    }
}

/// Derive proposed edges for a freshly-placed candidate: an `overrides`
/// edge in both directions where specificity strictly holds, and a
/// `similar-to` edge for every existing behavior scoring in `[0.5, 0.9)`
/// (§4.D step 2). Skipped for `Merge` since the candidate doesn't become a
/// standalone node.
fn propose_edges(
    behavior: &Behavior,
    placement: &Placement,
    ranked: &[SimilarityHit<'_>],
    config: &FloopConfig,
    now: DateTime<Utc>,
) -> Vec<Edge> {
    if matches!(placement, Placement::Merge { .. }) {
        return Vec::new();
    }

    let mut edges = Vec::new();
    for hit in ranked {
        if behavior.when.is_more_specific(&hit.existing.when) {
            edges.push(Edge::new(behavior.id.clone(), hit.existing.id.clone(), EdgeKind::Overrides, 1.0, now));
        } else if hit.existing.when.is_more_specific(&behavior.when) {
            edges.push(Edge::new(hit.existing.id.clone(), behavior.id.clone(), EdgeKind::Overrides, 1.0, now));
        }

        if hit.score >= config.similar_to_threshold && hit.score < config.similar_to_upper_bound {
            edges.push(Edge::new(
                behavior.id.clone(),
                hit.existing.id.clone(),
                EdgeKind::SimilarTo,
                hit.score.min(config.similar_to_upper_bound),
                now,
            ));
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContextSnapshot;

    fn correction(action: &str) -> Correction {
        Correction {
            id: crate::model::correction_hash("wrong", action),
            timestamp: Utc::now(),
            context: ContextSnapshot::new(Utc::now()),
            agent_action: "wrong".to_string(),
            corrected_action: action.to_string(),
            human_response: None,
            corrector: None,
            extra_tags: vec![],
            processed: false,
            processed_at: None,
        }
    }

    #[test]
    fn infers_constraint_from_never() {
        assert_eq!(infer_kind("never commit secrets", &[]), BehaviorKind::Constraint);
    }

    #[test]
    fn infers_procedure_from_step_markers() {
        assert_eq!(
            infer_kind("first run tests, then deploy, finally notify", &[]),
            BehaviorKind::Procedure
        );
    }

    #[test]
    fn infers_preference_from_prefer_phrase() {
        assert_eq!(infer_kind("prefer tabs over spaces", &[]), BehaviorKind::Preference);
    }

    #[test]
    fn defaults_to_directive() {
        assert_eq!(infer_kind("use pathlib for paths", &[]), BehaviorKind::Directive);
    }

    #[test]
    fn learn_creates_when_no_similar_behavior_exists() {
        let config = FloopConfig::default();
        let c = correction("use pathlib for filesystem paths in python");
        let result = learn(&c, &[], &config, Utc::now());
        assert_eq!(result.placement, Placement::Create);
        assert!(result.auto_accepted);
        assert!(!result.requires_review);
    }

    #[test]
    fn learn_merges_when_near_duplicate() {
        let config = FloopConfig::default();
        let c = correction("never commit secrets to the repository");
        // Identical canonical text and tags: content_sim = tag_sim = 1.0,
        // both when-predicates empty (when_overlap = 1.0) -> score = 1.0,
        // comfortably above the fixed 0.9 merge threshold.
        let mut existing = Behavior::new("b1", "n", "never commit secrets to the repository");
        existing.content.tags = vec!["commit".to_string()];
        let result = learn(&c, &[existing], &config, Utc::now());
        assert!(matches!(result.placement, Placement::Merge { .. }));
        assert!(result.similarity >= 0.9);
        // Merge always requires review per §4.D step 3.
        assert!(result.requires_review);
        assert!(result.review_reasons.iter().any(|r| r.contains("merge")));
    }

    #[test]
    fn learn_specializes_when_more_specific_and_in_the_specialize_band() {
        let config = FloopConfig::default();
        let mut c = correction("never commit secrets in python");
        c.context.file_language = Some("python".to_string());
        c.context.task = Some("test".to_string());
        // content_sim = 3/4 = 0.75, tag_sim = 1.0, when_overlap = 2*1/3 =
        // 0.667 -> score = 0.6*0.75 + 0.2*1.0 + 0.2*0.667 = 0.783, inside the
        // fixed [0.7, 0.9) specialize band, with candidate.when a strict
        // superset of existing.when.
        let mut existing = Behavior::new("b1", "n", "never commit secrets");
        existing.content.tags = vec!["commit".to_string()];
        existing.when.insert("language", "python");
        let result = learn(&c, &[existing.clone()], &config, Utc::now());
        assert!(matches!(result.placement, Placement::Specialize { .. }));
        assert!(result.similarity >= 0.7 && result.similarity < 0.9);
        assert!(result.behavior.when.is_more_specific(&existing.when));
        assert!(result.behavior.overrides.contains(&existing.id));
        assert!(result
            .proposed_edges
            .iter()
            .any(|e| e.kind == crate::model::EdgeKind::Overrides && e.source == result.behavior.id));
    }

    #[test]
    fn learn_requires_review_for_constraint_kind() {
        let config = FloopConfig::default();
        let c = correction("never commit api keys to the repository");
        let result = learn(&c, &[], &config, Utc::now());
        assert!(result.requires_review);
        assert!(!result.auto_accepted);
    }

    #[test]
    fn proposed_edges_empty_on_merge() {
        let config = FloopConfig::default();
        let c = correction("never commit secrets to the repository");
        let mut existing = Behavior::new("b1", "n", "never commit secrets to the repository");
        existing.content.tags = vec!["commit".to_string()];
        let result = learn(&c, &[existing], &config, Utc::now());
        assert!(matches!(result.placement, Placement::Merge { .. }));
        assert!(result.proposed_edges.is_empty());
    }
}
