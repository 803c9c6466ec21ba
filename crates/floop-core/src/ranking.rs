//! Four-signal ranking (§4.F): context match, ACT-R base-level activation,
//! feedback quality, and kind/priority boost, combined into a single
//! relevance score used to order active behaviors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FloopConfig;
use crate::model::{Behavior, ContextSnapshot};

/// A single activation event timestamp, used to compute base-level
/// activation. The engine keeps a bounded history per behavior; this module
/// only consumes it.
pub type ActivationHistory = [DateTime<Utc>];

/// Per-behavior score breakdown, useful for `why` introspection (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub behavior_id: String,
    pub context_score: f64,
    pub base_level_score: f64,
    pub feedback_score: f64,
    pub priority_score: f64,
    pub total: f64,
}

/// Context-match signal: fraction of the behavior's when-predicate keys
/// that matched, weighted toward more specific predicates (more matching
/// keys is stronger evidence than a single coincidental match).
pub fn context_score(behavior: &Behavior, ctx: &ContextSnapshot) -> f64 {
    if behavior.when.is_empty() {
        return 0.5; // unconditional behaviors are moderately relevant everywhere
    }
    if behavior.when.matches(ctx) {
        // More specific predicates that still match are stronger signals.
        let specificity = behavior.when.specificity() as f64;
        (0.5 + 0.1 * specificity).min(1.0)
    } else {
        0.0
    }
}

/// ACT-R base-level activation: `B_i = ln(n * L^(-d) / (1 - d))`, where `n`
/// is the number of activations and `L` is age in hours since the most
/// recent one (§4.F names `L=age_hours` explicitly). Squashed through
/// `sigmoid(B_i + offset)` into `[0, 1]` for blending with the other
/// signals.
pub fn base_level_activation(
    history: &ActivationHistory,
    now: DateTime<Utc>,
    decay: f64,
    sigmoid_offset: f64,
) -> f64 {
    let n = history.len();
    if n == 0 {
        // A never-activated behavior is neither evidence for nor against
        // relevance; treat it as neutral rather than zero (§8 invariant).
        return 0.5;
    }
    let most_recent = history.iter().max().copied().unwrap_or(now);
    let elapsed_hours = (now - most_recent).num_seconds().max(0) as f64 / 3_600.0;
    let l = elapsed_hours.max(1.0 / 3_600.0); // avoid ln(0) for same-instant recall

    let raw = (n as f64 * l.powf(-decay) / (1.0 - decay).max(1e-6)).ln();
    sigmoid(raw + sigmoid_offset)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Feedback-quality signal derived from a behavior's confirm/override ratio,
/// damped toward neutral (0.5) until `feedback_min_sample` observations
/// have accumulated (§4.F — avoids overreacting to one or two data points).
pub fn feedback_score(behavior: &Behavior, min_sample: u32) -> f64 {
    let confirmed = behavior.stats.times_confirmed as f64;
    let overridden = behavior.stats.times_overridden as f64;
    let total = confirmed + overridden;
    if total == 0.0 {
        return 0.5;
    }
    let raw = confirmed / total;
    if total < min_sample as f64 {
        let weight = total / min_sample as f64;
        0.5 + weight * (raw - 0.5)
    } else {
        raw
    }
}

/// Priority signal: `priority / 10`, normalized into `[0, 1]`. Kind does
/// not enter here — it is applied once, as a multiplier on the combined
/// total, not folded into any one signal (§4.F).
pub fn priority_score(behavior: &Behavior) -> f64 {
    (behavior.priority as f64 / 10.0).clamp(0.0, 1.0)
}

/// Combine the four signals per the configured weights (renormalized if
/// they don't sum to 1.0), then multiply by the behavior's kind boost.
/// Relevance score therefore ranges over `[0, max_kind_boost]`, not `[0, 1]`
/// (§4.F, §8 invariant).
pub fn score(
    behavior: &Behavior,
    ctx: &ContextSnapshot,
    history: &ActivationHistory,
    config: &FloopConfig,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let w = &config.scorer_weights;
    let sum = w.context + w.base_level + w.feedback + w.priority;
    let norm = if sum > 0.0 { sum } else { 1.0 };

    let context = context_score(behavior, ctx);
    let base_level = base_level_activation(history, now, config.actr.decay, config.actr.sigmoid_offset);
    let feedback = feedback_score(behavior, config.feedback_min_sample);
    let priority = priority_score(behavior);

    let weighted = (w.context * context + w.base_level * base_level + w.feedback * feedback
        + w.priority * priority)
        / norm;
    let total = weighted * behavior.kind.boost();

    ScoreBreakdown {
        behavior_id: behavior.id.clone(),
        context_score: context,
        base_level_score: base_level,
        feedback_score: feedback,
        priority_score: priority,
        total,
    }
}

/// Apply confidence reinforcement after a behavior is followed/confirmed,
/// rate-limited to `max_boosts_per_hour` so a burst of identical feedback
/// can't runaway the confidence to the ceiling in one session (§4.F).
pub fn reinforce(
    behavior: &mut Behavior,
    recent_boosts_in_last_hour: u32,
    config: &FloopConfig,
) {
    if recent_boosts_in_last_hour >= config.reinforcement.max_boosts_per_hour {
        return;
    }
    behavior.confidence = (behavior.confidence + config.reinforcement.boost)
        .clamp(config.reinforcement.floor, config.reinforcement.ceiling);
}

/// Apply passive confidence decay (e.g. during a periodic maintenance pass)
/// toward the floor for behaviors that haven't been reinforced recently.
pub fn decay_confidence(behavior: &mut Behavior, config: &FloopConfig) {
    behavior.confidence = (behavior.confidence - config.reinforcement.decay)
        .clamp(config.reinforcement.floor, config.reinforcement.ceiling);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn context_score_zero_when_predicate_fails() {
        let mut b = Behavior::new("a", "n", "x");
        b.when.insert("language", "python");
        let ctx = ContextSnapshot::new(Utc::now());
        assert_eq!(context_score(&b, &ctx), 0.0);
    }

    #[test]
    fn context_score_unconditional_is_moderate() {
        let b = Behavior::new("a", "n", "x");
        let ctx = ContextSnapshot::new(Utc::now());
        assert_eq!(context_score(&b, &ctx), 0.5);
    }

    #[test]
    fn base_level_activation_increases_with_more_recent_and_more_frequent_recall() {
        let now = Utc::now();
        let sparse = [now - Duration::days(10)];
        let dense = [
            now - Duration::hours(1),
            now - Duration::hours(2),
            now - Duration::hours(3),
        ];
        let sparse_score = base_level_activation(&sparse, now, 0.5, 1.0);
        let dense_score = base_level_activation(&dense, now, 0.5, 1.0);
        assert!(dense_score > sparse_score);
    }

    #[test]
    fn base_level_activation_neutral_with_no_history() {
        assert_eq!(base_level_activation(&[], Utc::now(), 0.5, 1.0), 0.5);
    }

    #[test]
    fn base_level_activation_offset_shifts_the_squash_point() {
        let now = Utc::now();
        let history = [now - Duration::days(1)];
        let without_offset = base_level_activation(&history, now, 0.5, 0.0);
        let with_offset = base_level_activation(&history, now, 0.5, 1.0);
        assert!(with_offset > without_offset);
    }

    #[test]
    fn feedback_score_neutral_with_no_history() {
        let b = Behavior::new("a", "n", "x");
        assert_eq!(feedback_score(&b, 3), 0.5);
    }

    #[test]
    fn feedback_score_damped_below_min_sample() {
        let mut b = Behavior::new("a", "n", "x");
        b.stats.times_confirmed = 1;
        let damped = feedback_score(&b, 3);
        assert!(damped > 0.5 && damped < 1.0);
    }

    #[test]
    fn priority_score_ignores_kind() {
        let mut constraint = Behavior::new("a", "n", "x");
        constraint.kind = crate::model::BehaviorKind::Constraint;
        let mut preference = Behavior::new("b", "n", "x");
        preference.kind = crate::model::BehaviorKind::Preference;
        preference.priority = constraint.priority;
        assert_eq!(priority_score(&constraint), priority_score(&preference));
    }

    #[test]
    fn total_score_applies_kind_boost_on_top_of_the_weighted_sum() {
        let config = FloopConfig::default();
        let ctx = ContextSnapshot::new(Utc::now());

        let mut constraint = Behavior::new("a", "n", "x");
        constraint.kind = crate::model::BehaviorKind::Constraint;
        let mut preference = Behavior::new("b", "n", "x");
        preference.kind = crate::model::BehaviorKind::Preference;
        preference.priority = constraint.priority;

        let constraint_total = score(&constraint, &ctx, &[], &config, Utc::now()).total;
        let preference_total = score(&preference, &ctx, &[], &config, Utc::now()).total;
        assert!(constraint_total > preference_total);
        // Constraint boost is 2.0x; with identical signals the ratio should
        // match the boost ratio exactly.
        assert!((constraint_total / preference_total - 2.0).abs() < 1e-9);
    }

    #[test]
    fn total_score_can_exceed_one_for_boosted_kinds() {
        let config = FloopConfig::default();
        let ctx = ContextSnapshot::new(Utc::now());
        let mut constraint = Behavior::new("a", "n", "x");
        constraint.kind = crate::model::BehaviorKind::Constraint;
        constraint.priority = 10;
        constraint.stats.times_confirmed = 10;
        let total = score(&constraint, &ctx, &[], &config, Utc::now()).total;
        assert!(total > 1.0);
        assert!(total <= 2.0 + 1e-9);
    }

    #[test]
    fn reinforcement_respects_rate_limit() {
        let config = FloopConfig::default();
        let mut b = Behavior::new("a", "n", "x");
        let before = b.confidence;
        reinforce(&mut b, config.reinforcement.max_boosts_per_hour, &config);
        assert_eq!(b.confidence, before);
    }

    #[test]
    fn reinforcement_applies_under_rate_limit() {
        let config = FloopConfig::default();
        let mut b = Behavior::new("a", "n", "x");
        let before = b.confidence;
        reinforce(&mut b, 0, &config);
        assert!(b.confidence > before);
    }
}
