//! Tiered vector index (§4.H): brute-force linear scan below a size
//! threshold, promoted one-way to an HNSW index above it. Promotion never
//! reverses — once a scope's embedding count clears the threshold, it stays
//! on the HNSW tier even if behaviors are later forgotten.
//!
//! The HNSW tier's configuration (connectivity/expansion knobs, cosine
//! metric, incremental add/remove, key<->label bookkeeping) follows the
//! teacher's USearch wrapper; the brute-force tier and the tiering policy
//! itself are new.

use std::collections::HashMap;

#[cfg(feature = "vector-search")]
use usearch::{Index as UsearchIndex, IndexOptions, MetricKind, ScalarKind};

use crate::config::HnswConfig;
use crate::error::{FloopError, Result};

/// A single nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub similarity: f32,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// The brute-force tier: exact linear cosine scan over a `HashMap`.
struct BruteForceTier {
    vectors: HashMap<String, Vec<f32>>,
}

impl BruteForceTier {
    fn new() -> Self {
        Self { vectors: HashMap::new() }
    }

    fn add(&mut self, id: &str, vector: Vec<f32>) {
        self.vectors.insert(id.to_string(), vector);
    }

    fn remove(&mut self, id: &str) {
        self.vectors.remove(id);
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search(&self, query: &[f32], limit: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .map(|(id, vec)| SearchHit {
                id: id.clone(),
                similarity: cosine_similarity(query, vec),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        hits
    }

    fn drain(self) -> Vec<(String, Vec<f32>)> {
        self.vectors.into_iter().collect()
    }
}

#[cfg(feature = "vector-search")]
struct HnswTier {
    index: UsearchIndex,
    key_to_id: HashMap<u64, String>,
    id_to_key: HashMap<String, u64>,
    next_key: u64,
}

#[cfg(feature = "vector-search")]
impl HnswTier {
    fn new(dimensions: usize, config: &HnswConfig) -> Result<Self> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.m,
            expansion_add: config.ef_search * 2,
            expansion_search: config.ef_search,
            multi: false,
        };
        let index = UsearchIndex::new(&options)
            .map_err(|e| FloopError::Integrity(format!("failed to create HNSW index: {e}")))?;
        index
            .reserve(1024)
            .map_err(|e| FloopError::Integrity(format!("failed to reserve HNSW capacity: {e}")))?;
        Ok(Self {
            index,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_key: 0,
        })
    }

    fn ensure_capacity(&mut self) -> Result<()> {
        if self.index.size() + 1 > self.index.capacity() {
            let new_capacity = (self.index.capacity() * 2).max(1024);
            self.index
                .reserve(new_capacity)
                .map_err(|e| FloopError::Integrity(format!("failed to grow HNSW index: {e}")))?;
        }
        Ok(())
    }

    fn add(&mut self, id: &str, vector: &[f32]) -> Result<()> {
        if let Some(&key) = self.id_to_key.get(id) {
            let _ = self.index.remove(key);
            self.key_to_id.remove(&key);
        }
        self.ensure_capacity()?;
        let key = self.next_key;
        self.next_key += 1;
        self.index
            .add(key, vector)
            .map_err(|e| FloopError::Integrity(format!("failed to add to HNSW index: {e}")))?;
        self.key_to_id.insert(key, id.to_string());
        self.id_to_key.insert(id.to_string(), key);
        Ok(())
    }

    fn remove(&mut self, id: &str) {
        if let Some(key) = self.id_to_key.remove(id) {
            let _ = self.index.remove(key);
            self.key_to_id.remove(&key);
        }
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    fn search(&self, query: &[f32], limit: usize) -> Vec<SearchHit> {
        let Ok(matches) = self.index.search(query, limit) else {
            return Vec::new();
        };
        matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(key, distance)| {
                self.key_to_id.get(key).map(|id| SearchHit {
                    id: id.clone(),
                    similarity: 1.0 - distance,
                })
            })
            .collect()
    }
}

enum Tier {
    BruteForce(BruteForceTier),
    #[cfg(feature = "vector-search")]
    Hnsw(HnswTier),
}

/// A scope's embedding index, auto-promoting from brute-force to HNSW once
/// `config.tier_threshold` vectors have been added.
pub struct VectorIndex {
    tier: Tier,
    dimensions: Option<usize>,
    config: HnswConfig,
}

impl VectorIndex {
    pub fn new(config: HnswConfig) -> Self {
        Self {
            tier: Tier::BruteForce(BruteForceTier::new()),
            dimensions: None,
            config,
        }
    }

    pub fn len(&self) -> usize {
        match &self.tier {
            Tier::BruteForce(t) => t.len(),
            #[cfg(feature = "vector-search")]
            Tier::Hnsw(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, id: &str, vector: Vec<f32>) -> Result<()> {
        if let Some(dims) = self.dimensions {
            if vector.len() != dims {
                return Err(FloopError::Validation(format!(
                    "embedding dimension mismatch: expected {dims}, got {}",
                    vector.len()
                )));
            }
        } else {
            self.dimensions = Some(vector.len());
        }

        match &mut self.tier {
            Tier::BruteForce(t) => {
                t.add(id, vector);
                self.maybe_promote()?;
            }
            #[cfg(feature = "vector-search")]
            Tier::Hnsw(t) => t.add(id, &vector)?,
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &str) {
        match &mut self.tier {
            Tier::BruteForce(t) => t.remove(id),
            #[cfg(feature = "vector-search")]
            Tier::Hnsw(t) => t.remove(id),
        }
    }

    pub fn search(&self, query: &[f32], limit: usize) -> Vec<SearchHit> {
        match &self.tier {
            Tier::BruteForce(t) => t.search(query, limit),
            #[cfg(feature = "vector-search")]
            Tier::Hnsw(t) => t.search(query, limit),
        }
    }

    /// Whether this index has been promoted to the HNSW tier.
    pub fn is_promoted(&self) -> bool {
        #[cfg(feature = "vector-search")]
        {
            matches!(self.tier, Tier::Hnsw(_))
        }
        #[cfg(not(feature = "vector-search"))]
        {
            false
        }
    }

    #[cfg(feature = "vector-search")]
    fn maybe_promote(&mut self) -> Result<()> {
        let Tier::BruteForce(t) = &self.tier else { return Ok(()) };
        if t.len() < self.config.tier_threshold {
            return Ok(());
        }
        let dims = self.dimensions.unwrap_or(0);
        let Tier::BruteForce(old) = std::mem::replace(&mut self.tier, Tier::BruteForce(BruteForceTier::new())) else {
            unreachable!()
        };
        let mut hnsw = HnswTier::new(dims, &self.config)?;
        for (id, vector) in old.drain() {
            hnsw.add(&id, &vector)?;
        }
        self.tier = Tier::Hnsw(hnsw);
        Ok(())
    }

    #[cfg(not(feature = "vector-search"))]
    fn maybe_promote(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brute_force_finds_nearest_neighbor() {
        let mut index = VectorIndex::new(HnswConfig::default());
        index.add("a", vec![1.0, 0.0, 0.0]).unwrap();
        index.add("b", vec![0.0, 1.0, 0.0]).unwrap();
        let hits = index.search(&[1.0, 0.0, 0.0], 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut index = VectorIndex::new(HnswConfig::default());
        index.add("a", vec![1.0, 0.0]).unwrap();
        let result = index.add("b", vec![1.0, 0.0, 0.0]);
        assert!(result.is_err());
    }

    #[test]
    fn remove_drops_from_results() {
        let mut index = VectorIndex::new(HnswConfig::default());
        index.add("a", vec![1.0, 0.0]).unwrap();
        index.remove("a");
        assert!(index.is_empty());
    }

    #[cfg(not(feature = "vector-search"))]
    #[test]
    fn stays_on_brute_force_tier_without_the_feature() {
        let mut config = HnswConfig::default();
        config.tier_threshold = 1;
        let mut index = VectorIndex::new(config);
        index.add("a", vec![1.0, 0.0]).unwrap();
        index.add("b", vec![0.0, 1.0]).unwrap();
        assert!(!index.is_promoted());
    }
}
