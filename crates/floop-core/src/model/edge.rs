//! Edge — a typed, weighted relationship between two behaviors (§3.1, §4.E).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The relationship a graph edge encodes between two behaviors.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    /// `source` only makes sense if `target` is also active.
    Requires,
    /// `source` takes precedence over `target` when both match.
    Overrides,
    /// `source` and `target` cannot both be followed.
    Conflicts,
    /// `source` and `target` are semantically close (derived from content
    /// similarity, §4.E).
    SimilarTo,
    /// `source` and `target` have historically been activated together.
    CoActivated,
    /// `target` behavior was produced while processing the correction that
    /// also touched `source` (provenance edge).
    LearnedFrom,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Requires => "requires",
            EdgeKind::Overrides => "overrides",
            EdgeKind::Conflicts => "conflicts",
            EdgeKind::SimilarTo => "similarTo",
            EdgeKind::CoActivated => "coActivated",
            EdgeKind::LearnedFrom => "learnedFrom",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        Some(match s {
            "requires" => EdgeKind::Requires,
            "overrides" => EdgeKind::Overrides,
            "conflicts" => EdgeKind::Conflicts,
            "similarTo" | "similar_to" => EdgeKind::SimilarTo,
            "coActivated" | "co_activated" => EdgeKind::CoActivated,
            "learnedFrom" | "learned_from" => EdgeKind::LearnedFrom,
            _ => return None,
        })
    }

    /// Whether this edge kind feeds spreading activation (§4.G), as opposed
    /// to being purely structural (requires/conflicts are read directly by
    /// the resolution pass, not spread through).
    pub fn spreads(&self) -> bool {
        matches!(self, EdgeKind::SimilarTo | EdgeKind::CoActivated)
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed, weighted edge between two behavior IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: EdgeKind,
        weight: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            weight: weight.clamp(0.0, 1.0),
            created_at: now,
            last_activated: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Exponential decay of `weight` toward zero based on hours since last
    /// activation (or creation if never activated) — §4.F temporal decay:
    /// `w · exp(-rho · hours_since_last_activated)`, rho = 0.01 (≈1%/hr,
    /// ≈21%/day).
    pub fn decayed_weight(&self, now: DateTime<Utc>, decay_rate: f64) -> f64 {
        let reference = self.last_activated.unwrap_or(self.created_at);
        let elapsed_hours = (now - reference).num_seconds().max(0) as f64 / 3_600.0;
        self.weight * (-decay_rate * elapsed_hours).exp()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activated = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn weight_clamped_on_construction() {
        let e = Edge::new("a", "b", EdgeKind::SimilarTo, 5.0, Utc::now());
        assert_eq!(e.weight, 1.0);
    }

    #[test]
    fn decay_reduces_weight_over_time() {
        let now = Utc::now();
        let e = Edge::new("a", "b", EdgeKind::SimilarTo, 1.0, now);
        let later = now + Duration::days(30);
        let decayed = e.decayed_weight(later, 0.01);
        assert!(decayed < 1.0);
        assert!(decayed > 0.0);
    }

    #[test]
    fn decay_rate_is_hourly_not_daily() {
        let now = Utc::now();
        let e = Edge::new("a", "b", EdgeKind::SimilarTo, 1.0, now);
        let one_day_later = now + Duration::hours(24);
        let decayed = e.decayed_weight(one_day_later, 0.01);
        // rho=0.01/hr over 24h should leave ~79% of the original weight
        // (~21%/day decay, per spec).
        assert!((decayed - 0.787).abs() < 0.01, "decayed={decayed}");
    }

    #[test]
    fn structural_kinds_do_not_spread() {
        assert!(!EdgeKind::Requires.spreads());
        assert!(!EdgeKind::Conflicts.spreads());
        assert!(!EdgeKind::Overrides.spreads());
        assert!(EdgeKind::SimilarTo.spreads());
        assert!(EdgeKind::CoActivated.spreads());
    }

    #[test]
    fn kind_roundtrips_through_str() {
        for kind in [
            EdgeKind::Requires,
            EdgeKind::Overrides,
            EdgeKind::Conflicts,
            EdgeKind::SimilarTo,
            EdgeKind::CoActivated,
            EdgeKind::LearnedFrom,
        ] {
            assert_eq!(EdgeKind::parse_name(kind.as_str()), Some(kind));
        }
    }
}
