//! Correction — raw human feedback, the input to the learning pipeline
//! (§3.1, §4.D).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::context::ContextSnapshot;

/// A single correction event: the agent did `agent_action`, a human
/// redirected it to `corrected_action`.
///
/// `#[serde(deny_unknown_fields)]` on the ingest-facing variant guards
/// against field-injection from an untrusted collaborator payload (the same
/// pattern the cache layer uses for its own ingest boundary).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub context: ContextSnapshot,
    pub agent_action: String,
    pub corrected_action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrector: Option<String>,
    #[serde(default)]
    pub extra_tags: Vec<String>,
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

/// Untrusted correction payload as received from a collaborator (e.g. a
/// session hook). Rejects unrecognized fields outright rather than silently
/// dropping them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CorrectionInput {
    pub context: ContextSnapshot,
    pub agent_action: String,
    pub corrected_action: String,
    #[serde(default)]
    pub human_response: Option<String>,
    #[serde(default)]
    pub corrector: Option<String>,
    #[serde(default)]
    pub extra_tags: Vec<String>,
}

/// Stable, context-independent ID derived from the `(wrong, right)` pair
/// (§4.D — "hash(wrong, right)", content address, not timestamp- or
/// context-dependent so identical corrections from different sessions
/// collapse to the same candidate).
pub fn correction_hash(agent_action: &str, corrected_action: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(agent_action.trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(corrected_action.trim().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

impl Correction {
    pub fn from_input(input: CorrectionInput, now: DateTime<Utc>) -> Self {
        let id = correction_hash(&input.agent_action, &input.corrected_action);
        Self {
            id,
            timestamp: now,
            context: input.context,
            agent_action: input.agent_action,
            corrected_action: input.corrected_action,
            human_response: input.human_response,
            corrector: input.corrector,
            extra_tags: input.extra_tags,
            processed: false,
            processed_at: None,
        }
    }

    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        self.processed = true;
        self.processed_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_context_independent() {
        let a = correction_hash("used os.path", "use pathlib instead");
        let b = correction_hash("used os.path", "use pathlib instead");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_ignores_surrounding_whitespace() {
        let a = correction_hash("used os.path", "use pathlib instead");
        let b = correction_hash("  used os.path  ", "  use pathlib instead  ");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_differs_for_different_pairs() {
        let a = correction_hash("used os.path", "use pathlib instead");
        let b = correction_hash("used requests", "use httpx instead");
        assert_ne!(a, b);
    }

    #[test]
    fn deny_unknown_fields_rejects_injected_keys() {
        let json = serde_json::json!({
            "context": {"timestamp": Utc::now()},
            "agentAction": "a",
            "correctedAction": "b",
            "sneaky": "field",
        });
        let result: Result<CorrectionInput, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
