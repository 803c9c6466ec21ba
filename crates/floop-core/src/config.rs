//! Tunables the core accepts from a collaborator.
//!
//! The core never reads a config *file* — parsing `floop.toml` or similar is
//! a collaborator concern (per the out-of-scope list in the crate docs).
//! This struct is the parsed result the collaborator hands in.

use serde::{Deserialize, Serialize};

/// Weights for the four ranking signals (§4.F). Renormalized at use if they
/// do not sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorerWeights {
    pub context: f64,
    pub base_level: f64,
    pub feedback: f64,
    pub priority: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            context: 0.35,
            base_level: 0.30,
            feedback: 0.15,
            priority: 0.20,
        }
    }
}

/// ACT-R base-level activation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActrConfig {
    pub decay: f64,
    pub sigmoid_offset: f64,
}

impl Default for ActrConfig {
    fn default() -> Self {
        Self {
            decay: 0.5,
            sigmoid_offset: 1.0,
        }
    }
}

/// Spreading-activation parameters (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadConfig {
    pub max_steps: u32,
    pub decay_factor: f64,
    pub spread_factor: f64,
    pub min_activation: f64,
    pub temporal_decay_rate: f64,
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            max_steps: 3,
            decay_factor: 0.85,
            spread_factor: 0.95,
            min_activation: 0.01,
            temporal_decay_rate: 0.01,
        }
    }
}

/// Confidence reinforcement parameters (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReinforcementConfig {
    pub boost: f64,
    pub decay: f64,
    pub floor: f64,
    pub ceiling: f64,
    pub max_boosts_per_hour: u32,
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        Self {
            boost: 0.02,
            decay: 0.005,
            floor: 0.3,
            ceiling: 0.95,
            max_boosts_per_hour: 3,
        }
    }
}

/// HNSW tuning (§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HnswConfig {
    pub m: usize,
    pub ef_search: usize,
    pub ml: f64,
    pub tier_threshold: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_search: 100,
            ml: 0.25,
            tier_threshold: 1000,
        }
    }
}

/// Top-level configuration accepted by the engine. All fields mirror the
/// defaults documented in spec §6.4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloopConfig {
    pub auto_accept_threshold: f64,
    pub scorer_weights: ScorerWeights,
    pub feedback_min_sample: u32,
    pub actr: ActrConfig,
    pub spread: SpreadConfig,
    pub reinforcement: ReinforcementConfig,
    pub similar_to_threshold: f64,
    pub similar_to_upper_bound: f64,
    pub min_shared_tags_for_edge: usize,
    pub hnsw: HnswConfig,
    pub max_pack_size_bytes: u64,
    pub max_restore_bytes: u64,
}

impl Default for FloopConfig {
    fn default() -> Self {
        Self {
            auto_accept_threshold: 0.8,
            scorer_weights: ScorerWeights::default(),
            feedback_min_sample: 3,
            actr: ActrConfig::default(),
            spread: SpreadConfig::default(),
            reinforcement: ReinforcementConfig::default(),
            similar_to_threshold: 0.5,
            similar_to_upper_bound: 0.9,
            min_shared_tags_for_edge: 2,
            hnsw: HnswConfig::default(),
            max_pack_size_bytes: 50 * 1024 * 1024,
            max_restore_bytes: 50 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let w = ScorerWeights::default();
        let sum = w.context + w.base_level + w.feedback + w.priority;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn defaults_match_spec() {
        let c = FloopConfig::default();
        assert_eq!(c.auto_accept_threshold, 0.8);
        assert_eq!(c.similar_to_threshold, 0.5);
        assert_eq!(c.similar_to_upper_bound, 0.9);
        assert_eq!(c.min_shared_tags_for_edge, 2);
        assert_eq!(c.hnsw.tier_threshold, 1000);
    }
}
