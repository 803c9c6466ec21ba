//! Seed-and-export (§4.K): the built-in "core" pack of nine meta-behaviors
//! that teach the tool to an agent, reproducible from source at a declared
//! `SeedVersion`. Seeding is idempotent, version-aware, and — like pack
//! install — never revives a behavior the operator has forgotten.

use chrono::{DateTime, Utc};

use crate::model::{Behavior, BehaviorKind, Provenance};

/// Bumped whenever the wording or count of the core meta-behaviors changes.
pub const SEED_VERSION: &str = "1.0.0";

struct SeedSpec {
    id: &'static str,
    name: &'static str,
    kind: BehaviorKind,
    canonical: &'static str,
    priority: u8,
}

const CORE_SEEDS: &[SeedSpec] = &[
    SeedSpec {
        id: "floop-core/meta-learn-from-corrections",
        name: "learn-from-corrections",
        kind: BehaviorKind::Directive,
        canonical: "When a human corrects an action, record the correction so the same mistake is not repeated.",
        priority: 8,
    },
    SeedSpec {
        id: "floop-core/meta-prefer-specific-over-general",
        name: "prefer-specific-over-general",
        kind: BehaviorKind::Directive,
        canonical: "When two behaviors both match the current context, follow the more specific one.",
        priority: 7,
    },
    SeedSpec {
        id: "floop-core/meta-never-silently-drop-conflicts",
        name: "never-silently-drop-conflicts",
        kind: BehaviorKind::Constraint,
        canonical: "Never apply two behaviors that conflict without surfacing the conflict for review.",
        priority: 9,
    },
    SeedSpec {
        id: "floop-core/meta-respect-forgotten",
        name: "respect-forgotten",
        kind: BehaviorKind::Constraint,
        canonical: "Never re-apply a behavior that has been explicitly forgotten, even if a pack or seed would otherwise reintroduce it.",
        priority: 9,
    },
    SeedSpec {
        id: "floop-core/meta-confirm-before-high-impact",
        name: "confirm-before-high-impact",
        kind: BehaviorKind::Procedure,
        canonical: "First identify whether an action is high-impact (deletion, force-push, credential changes), then confirm with the human before proceeding.",
        priority: 8,
    },
    SeedSpec {
        id: "floop-core/meta-explain-why-on-request",
        name: "explain-why-on-request",
        kind: BehaviorKind::Directive,
        canonical: "When asked why a behavior activated, explain the context match and activation signals that produced it.",
        priority: 5,
    },
    SeedSpec {
        id: "floop-core/meta-prefer-reinforced-behaviors",
        name: "prefer-reinforced-behaviors",
        kind: BehaviorKind::Preference,
        canonical: "Prefer behaviors with a track record of confirmation over newly learned, unconfirmed ones when both are plausible.",
        priority: 4,
    },
    SeedSpec {
        id: "floop-core/meta-keep-packs-scoped",
        name: "keep-packs-scoped",
        kind: BehaviorKind::Directive,
        canonical: "When exporting a pack, include only the behaviors and edges relevant to its declared scope and tags.",
        priority: 4,
    },
    SeedSpec {
        id: "floop-core/meta-surface-low-confidence",
        name: "surface-low-confidence",
        kind: BehaviorKind::Directive,
        canonical: "When a behavior's confidence is near the floor, mention the uncertainty rather than presenting it as settled.",
        priority: 5,
    },
];

/// Seed the core meta-behaviors against an existing behavior set. Returns
/// the behaviors to add (never mutates or removes anything); a behavior
/// already present at the current `SEED_VERSION`, or forgotten, is skipped.
pub fn seed(existing: &[Behavior], now: DateTime<Utc>) -> Vec<Behavior> {
    assert_eq!(
        CORE_SEEDS.len(),
        9,
        "the core pack must carry exactly nine meta-behaviors"
    );

    let mut to_add = Vec::new();
    for spec in CORE_SEEDS {
        let current = existing.iter().find(|b| b.id == spec.id);
        match current {
            Some(b) if b.is_forgotten() => continue,
            Some(b) if b.provenance.package_version.as_deref() == Some(SEED_VERSION) => continue,
            _ => {
                let mut behavior = Behavior::new(spec.id, spec.name, spec.canonical);
                behavior.kind = spec.kind;
                behavior.priority = spec.priority;
                behavior.confidence = 0.9;
                behavior.provenance = Provenance {
                    source_type: "seed".to_string(),
                    package: Some("floop-core/meta".to_string()),
                    package_version: Some(SEED_VERSION.to_string()),
                    approved_by: None,
                    approved_at: None,
                };
                behavior.stats.created_at = now;
                behavior.stats.updated_at = now;
                to_add.push(behavior);
            }
        }
    }
    to_add
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_an_empty_scope_adds_nine_behaviors() {
        let added = seed(&[], Utc::now());
        assert_eq!(added.len(), 9);
    }

    #[test]
    fn seeding_is_idempotent() {
        let first = seed(&[], Utc::now());
        let second = seed(&first, Utc::now());
        assert!(second.is_empty());
    }

    #[test]
    fn forgotten_seed_is_never_revived() {
        let mut forgotten = Behavior::new(
            "floop-core/meta-learn-from-corrections",
            "learn-from-corrections",
            "whatever the operator replaced it with",
        );
        forgotten.kind = BehaviorKind::Forgotten;
        let added = seed(&[forgotten], Utc::now());
        assert!(!added.iter().any(|b| b.id == "floop-core/meta-learn-from-corrections"));
        assert_eq!(added.len(), 8);
    }
}
