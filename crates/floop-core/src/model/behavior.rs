//! Behavior — the fundamental unit of learned agent conduct.
//!
//! Each behavior represents a reusable rule/preference/constraint learned
//! from a correction, with provenance, a when-predicate, and the stats the
//! ranking subsystem reads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::ContextSnapshot;

// ============================================================================
// KIND
// ============================================================================

/// Classification of a behavior's conduct.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorKind {
    /// A straightforward instruction ("use pathlib, not os.path").
    #[default]
    Directive,
    /// A hard rule ("never commit secrets").
    Constraint,
    /// A multi-step how-to.
    Procedure,
    /// A soft preference ("prefer tabs").
    Preference,
    /// Absorbing terminal state — never revived by seed or pack install.
    Forgotten,
}

impl BehaviorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorKind::Directive => "directive",
            BehaviorKind::Constraint => "constraint",
            BehaviorKind::Procedure => "procedure",
            BehaviorKind::Preference => "preference",
            BehaviorKind::Forgotten => "forgotten",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "directive" => BehaviorKind::Directive,
            "constraint" => BehaviorKind::Constraint,
            "procedure" => BehaviorKind::Procedure,
            "preference" => BehaviorKind::Preference,
            "forgotten" => BehaviorKind::Forgotten,
            _ => BehaviorKind::Directive,
        }
    }

    /// Multiplier applied to the relevance score before final ranking (§4.F).
    pub fn boost(&self) -> f64 {
        match self {
            BehaviorKind::Constraint => 2.0,
            BehaviorKind::Directive => 1.5,
            BehaviorKind::Procedure => 1.2,
            BehaviorKind::Preference => 1.0,
            BehaviorKind::Forgotten => 0.0,
        }
    }
}

impl std::fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// WHEN-PREDICATE
// ============================================================================

/// One acceptable value shape for a when-predicate key (§3.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateValue {
    Scalar(String),
    Set(Vec<String>),
}

impl PredicateValue {
    fn matches(&self, value: &str) -> bool {
        match self {
            PredicateValue::Scalar(pat) => glob_match(pat, value),
            PredicateValue::Set(set) => set.iter().any(|v| glob_match(v, value)),
        }
    }
}

/// Very small glob matcher: supports `*` and `?`, nothing else. A pattern
/// with no wildcard is an exact match.
fn glob_match(pattern: &str, value: &str) -> bool {
    if !pattern.contains(['*', '?']) {
        return pattern == value;
    }
    glob_match_chars(pattern.as_bytes(), value.as_bytes())
}

fn glob_match_chars(pattern: &[u8], value: &[u8]) -> bool {
    match (pattern.first(), value.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match_chars(&pattern[1..], value)
                || (!value.is_empty() && glob_match_chars(pattern, &value[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match_chars(&pattern[1..], &value[1..]),
        (Some(p), Some(v)) if p == v => glob_match_chars(&pattern[1..], &value[1..]),
        _ => pattern == [b'*'] && value.is_empty(),
    }
}

/// A map from context field name to an acceptable value shape.
///
/// An empty predicate matches every context. A context matches iff every
/// key in the predicate matches (§3.2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhenPredicate(pub BTreeMap<String, PredicateValue>);

impl WhenPredicate {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), PredicateValue::Scalar(value.into()));
    }

    /// Specificity = number of keys in the predicate (§3.2).
    pub fn specificity(&self) -> usize {
        self.0.len()
    }

    /// A context matches iff every key in `self` is present in `ctx` and
    /// matches its value. Empty predicate always matches.
    pub fn matches(&self, ctx: &ContextSnapshot) -> bool {
        self.0.iter().all(|(key, expected)| {
            ctx.field(key)
                .map(|actual| expected.matches(&actual))
                .unwrap_or(false)
        })
    }

    /// `is_more_specific(a, b)`: `|a| > |b|` and every key of `b` is present
    /// in `a` with an identical value shape (§4.C).
    pub fn is_more_specific(&self, other: &WhenPredicate) -> bool {
        if self.0.len() <= other.0.len() {
            return false;
        }
        other
            .0
            .iter()
            .all(|(k, v)| self.0.get(k).map(|sv| sv == v).unwrap_or(false))
    }
}

// ============================================================================
// CONTENT
// ============================================================================

/// The behavior's textual payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorContent {
    /// The canonical, compact statement of the behavior.
    pub canonical: String,
    /// Optional longer-form expansion, shown only when requested (§4.I).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<String>,
    /// Optional structured payload (e.g. a code snippet) as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ============================================================================
// PROVENANCE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// "learned", "seed", "pack", "manual", ...
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorStats {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub times_activated: u64,
    pub times_followed: u64,
    pub times_confirmed: u64,
    pub times_overridden: u64,
}

impl BehaviorStats {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            times_activated: 0,
            times_followed: 0,
            times_confirmed: 0,
            times_overridden: 0,
        }
    }
}

// ============================================================================
// BEHAVIOR
// ============================================================================

/// A behavior node in the graph (§3.1).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Behavior {
    pub id: String,
    pub name: String,
    pub kind: BehaviorKind,
    #[serde(default)]
    pub when: WhenPredicate,
    pub content: BehaviorContent,
    pub priority: u8,
    pub confidence: f64,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub overrides: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    pub provenance: Provenance,
    pub stats: BehaviorStats,
    /// Side-channel metadata, notably the base64-encoded little-endian
    /// float32 embedding blob (`embedding`) and its producing model name
    /// (`embedding_model`) — the JSONL round-trip shape for the vector
    /// index's derived cache entries (§4.A design note).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Behavior {
    pub fn new(id: impl Into<String>, name: impl Into<String>, canonical: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            kind: BehaviorKind::Directive,
            when: WhenPredicate::new(),
            content: BehaviorContent {
                canonical: canonical.into(),
                ..Default::default()
            },
            priority: 5,
            confidence: 0.7,
            requires: vec![],
            metadata: BTreeMap::new(),
            overrides: vec![],
            conflicts: vec![],
            provenance: Provenance {
                source_type: "learned".to_string(),
                ..Default::default()
            },
            stats: BehaviorStats::new(now),
        }
    }

    pub fn is_forgotten(&self) -> bool {
        self.kind == BehaviorKind::Forgotten
    }

    /// Clamp confidence to `[floor, ceiling]` (invariant 3.3.3).
    pub fn clamp_confidence(&mut self, floor: f64, ceiling: f64) {
        self.confidence = self.confidence.clamp(floor, ceiling);
    }

    /// Stamp `metadata.embedding`/`metadata.embedding_model` with a
    /// base64-encoded little-endian float32 blob (§4.A design note).
    pub fn set_embedding(&mut self, vector: &[f32], model: &str) {
        use base64::Engine;
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for v in vector {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.metadata.insert("embedding".to_string(), serde_json::Value::String(encoded));
        self.metadata.insert(
            "embedding_model".to_string(),
            serde_json::Value::String(model.to_string()),
        );
    }

    /// Decode `metadata.embedding`/`metadata.embedding_model` back into a
    /// float32 vector, if present and well-formed.
    pub fn embedding(&self) -> Option<(Vec<f32>, String)> {
        use base64::Engine;
        let encoded = self.metadata.get("embedding")?.as_str()?;
        let model = self.metadata.get("embedding_model")?.as_str()?.to_string();
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some((vector, model))
    }
}
