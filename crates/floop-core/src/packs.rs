//! Pack format (§4.J, §6.3): a `.fpack` file is a V2 backup file whose
//! header carries extra `type=skill-pack` metadata identifying a portable,
//! versioned collection of behaviors.

use std::path::Path;

use chrono::{DateTime, Utc};
use pack_id_pattern::PACK_ID_PATTERN;
use serde::{Deserialize, Serialize};

use crate::backup::{self, BackupPayload};
use crate::error::{FloopError, Result};
use crate::model::{Behavior, Edge, Provenance};

/// Extra header fields layered on top of a V2 backup header to identify a
/// pack (line 1 of the `.fpack` file, alongside the plain backup fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackManifest {
    #[serde(rename = "type")]
    pub kind: String,
    pub pack_id: String,
    pub pack_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_description: Option<String>,
    #[serde(default)]
    pub pack_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_source: Option<String>,
}

impl PackManifest {
    pub fn new(pack_id: impl Into<String>, pack_version: impl Into<String>) -> Result<Self> {
        let pack_id = pack_id.into();
        validate_pack_id(&pack_id)?;
        Ok(Self {
            kind: "skill-pack".to_string(),
            pack_id,
            pack_version: pack_version.into(),
            pack_author: None,
            pack_description: None,
            pack_tags: vec![],
            pack_source: None,
        })
    }
}

pub fn validate_pack_id(pack_id: &str) -> Result<()> {
    if PACK_ID_PATTERN.is_match(pack_id) {
        Ok(())
    } else {
        Err(FloopError::Validation(format!(
            "pack_id '{pack_id}' must match ^[a-z0-9-]+/[a-z0-9-]+$"
        )))
    }
}

/// Result of filtering behaviors for `pack create`: any tag in the filter
/// set matches (any-tag semantics), and an edge survives only if both
/// endpoints survive the filter.
pub fn filter_for_pack(
    behaviors: &[Behavior],
    edges: &[Edge],
    kind_filter: Option<&str>,
    tag_filter: &[String],
) -> (Vec<Behavior>, Vec<Edge>) {
    let tag_filter_lower: Vec<String> = tag_filter.iter().map(|t| t.to_lowercase()).collect();

    let kept: Vec<Behavior> = behaviors
        .iter()
        .filter(|b| !b.is_forgotten())
        .filter(|b| kind_filter.map(|k| b.kind.as_str() == k).unwrap_or(true))
        .filter(|b| {
            tag_filter_lower.is_empty()
                || b.content
                    .tags
                    .iter()
                    .any(|t| tag_filter_lower.contains(&t.to_lowercase()))
        })
        .cloned()
        .collect();

    let kept_ids: std::collections::HashSet<&str> = kept.iter().map(|b| b.id.as_str()).collect();
    let kept_edges: Vec<Edge> = edges
        .iter()
        .filter(|e| kept_ids.contains(e.source.as_str()) && kept_ids.contains(e.target.as_str()))
        .cloned()
        .collect();

    (kept, kept_edges)
}

/// Write a `.fpack` file: a V2 backup body with the pack manifest merged
/// into the header's `metadata` field.
pub fn create(
    path: &Path,
    manifest: &PackManifest,
    behaviors: Vec<Behavior>,
    edges: Vec<Edge>,
    now: DateTime<Utc>,
) -> Result<()> {
    validate_pack_id(&manifest.pack_id)?;
    let payload = BackupPayload { nodes: behaviors, edges };
    let manifest_json = serde_json::to_value(manifest)?;
    backup::write_v2(path, &payload, manifest_json, now)?;
    Ok(())
}

/// Outcome of installing one behavior from a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeInstallAction {
    Added,
    Updated,
    SkippedForgotten,
    SkippedSameVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackInstallResult {
    pub pack_id: String,
    pub pack_version: String,
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub nodes_skipped: usize,
    pub edges_added: usize,
    pub edges_skipped_missing_endpoint: usize,
    /// IDs actually added or updated by this install (excludes skipped
    /// nodes) — the subset a caller can feed into subset edge derivation
    /// (§4.J step 4) without re-deriving against the whole graph.
    pub installed_ids: Vec<String>,
}

/// One installed pack as seen from the behaviors it stamped (§6.1 `pack
/// list`): grouped by `provenance.package`, since the engine doesn't keep a
/// separate pack registry — the graph itself is the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackSummary {
    pub pack_id: String,
    pub pack_version: String,
    pub node_count: usize,
}

/// Group a scope's live behaviors by pack provenance (§6.1 `pack list`).
/// A pack with nodes stamped at more than one version reports its highest
/// version and counts every node regardless of which version stamped it.
pub fn list_installed(behaviors: &[Behavior]) -> Vec<PackSummary> {
    let mut by_pack: std::collections::HashMap<String, PackSummary> = std::collections::HashMap::new();
    for behavior in behaviors {
        if behavior.is_forgotten() {
            continue;
        }
        let Some(pack_id) = behavior.provenance.package.clone() else {
            continue;
        };
        let version = behavior.provenance.package_version.clone().unwrap_or_default();
        by_pack
            .entry(pack_id.clone())
            .and_modify(|summary| {
                summary.node_count += 1;
                if version.as_str() > summary.pack_version.as_str() {
                    summary.pack_version = version.clone();
                }
            })
            .or_insert(PackSummary { pack_id, pack_version: version, node_count: 1 });
    }
    let mut summaries: Vec<PackSummary> = by_pack.into_values().collect();
    summaries.sort_by(|a, b| a.pack_id.cmp(&b.pack_id));
    summaries
}

/// `pack remove` (§6.1): forget every live behavior stamped with
/// `pack_id`'s provenance and drop edges once both endpoints are gone.
/// Behaviors are forgotten rather than deleted outright, consistent with
/// `forget` elsewhere in the engine — a removed pack can still be restored
/// from a backup or re-learned without losing its history.
pub fn remove(behaviors: &[Behavior], edges: &[Edge], pack_id: &str) -> (Vec<Behavior>, Vec<Edge>, usize) {
    let mut removed = 0;
    let updated_behaviors: Vec<Behavior> = behaviors
        .iter()
        .cloned()
        .map(|mut behavior| {
            if !behavior.is_forgotten() && behavior.provenance.package.as_deref() == Some(pack_id) {
                behavior.kind = crate::model::BehaviorKind::Forgotten;
                removed += 1;
            }
            behavior
        })
        .collect();

    let live_ids: std::collections::HashSet<&str> =
        updated_behaviors.iter().filter(|b| !b.is_forgotten()).map(|b| b.id.as_str()).collect();
    let updated_edges: Vec<Edge> = edges
        .iter()
        .filter(|e| live_ids.contains(e.source.as_str()) && live_ids.contains(e.target.as_str()))
        .cloned()
        .collect();

    (updated_behaviors, updated_edges, removed)
}

/// Install a pack's payload against the existing behaviors of a scope
/// (§4.J steps 1-4; step 5, recording under `packs.installed`, is the
/// engine's responsibility since it touches config, not the graph).
///
/// Returns the new merged behavior/edge sets plus a report; does not write
/// anything itself.
pub fn install(
    path: &Path,
    existing_behaviors: &[Behavior],
    max_bytes: u64,
) -> Result<(Vec<Behavior>, Vec<Edge>, PackInstallResult)> {
    let bytes = std::fs::read(path)?;
    let newline = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| FloopError::Integrity("pack file has no header line".to_string()))?;
    let header_bytes = &bytes[..newline];
    let manifest: PackManifest = serde_json::from_slice(header_bytes)
        .map_err(|e| FloopError::Integrity(format!("invalid pack manifest: {e}")))?;
    if manifest.kind != "skill-pack" {
        return Err(FloopError::Validation(format!(
            "expected type 'skill-pack', got '{}'",
            manifest.kind
        )));
    }
    validate_pack_id(&manifest.pack_id)?;

    let payload = backup::read(path, max_bytes)?;

    let mut by_id: std::collections::HashMap<String, Behavior> =
        existing_behaviors.iter().map(|b| (b.id.clone(), b.clone())).collect();

    let mut result = PackInstallResult {
        pack_id: manifest.pack_id.clone(),
        pack_version: manifest.pack_version.clone(),
        nodes_added: 0,
        nodes_updated: 0,
        nodes_skipped: 0,
        edges_added: 0,
        edges_skipped_missing_endpoint: 0,
        installed_ids: Vec::new(),
    };

    let pack_node_ids: std::collections::HashSet<String> =
        payload.nodes.iter().map(|n| n.id.clone()).collect();

    for mut node in payload.nodes {
        node.provenance = Provenance {
            source_type: "pack".to_string(),
            package: Some(manifest.pack_id.clone()),
            package_version: Some(manifest.pack_version.clone()),
            approved_by: None,
            approved_at: None,
        };

        match by_id.get(&node.id) {
            Some(existing) if existing.is_forgotten() => {
                result.nodes_skipped += 1;
            }
            Some(existing) if existing.provenance.package_version.as_deref() == Some(manifest.pack_version.as_str()) => {
                let _ = existing;
                result.nodes_skipped += 1;
            }
            Some(_) => {
                result.installed_ids.push(node.id.clone());
                by_id.insert(node.id.clone(), node);
                result.nodes_updated += 1;
            }
            None => {
                result.installed_ids.push(node.id.clone());
                by_id.insert(node.id.clone(), node);
                result.nodes_added += 1;
            }
        }
    }

    let mut edges = Vec::new();
    for edge in payload.edges {
        if pack_node_ids.contains(&edge.source) && pack_node_ids.contains(&edge.target) {
            edges.push(edge);
            result.edges_added += 1;
        } else {
            tracing::warn!(
                source = %edge.source,
                target = %edge.target,
                "skipping pack edge referencing a node absent from the pack payload"
            );
            result.edges_skipped_missing_endpoint += 1;
        }
    }

    Ok((by_id.into_values().collect(), edges, result))
}

/// The crate vendors its own tiny regex-free pattern matcher for the
/// `pack_id` shape so it doesn't need to pull in the `regex` crate for one
/// check.
mod pack_id_pattern {
    pub struct PackIdPattern;

    pub static PACK_ID_PATTERN: PackIdPattern = PackIdPattern;

    impl PackIdPattern {
        /// `^[a-z0-9-]+/[a-z0-9-]+$`
        pub fn is_match(&self, s: &str) -> bool {
            let Some((a, b)) = s.split_once('/') else { return false };
            if b.contains('/') {
                return false;
            }
            is_valid_segment(a) && is_valid_segment(b)
        }
    }

    fn is_valid_segment(s: &str) -> bool {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn valid_pack_ids_pass() {
        assert!(validate_pack_id("floop-core/python-style").is_ok());
        assert!(validate_pack_id("no-slash").is_err());
        assert!(validate_pack_id("Has/Uppercase").is_err());
        assert!(validate_pack_id("a/b/c").is_err());
    }

    #[test]
    fn create_then_install_preserves_content_and_stamps_provenance() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.fpack");
        let manifest = PackManifest::new("floop-core/meta", "1.0.0").unwrap();
        let behavior = Behavior::new("meta-1", "teach-floop", "never ignore learned constraints");
        create(&path, &manifest, vec![behavior], vec![], Utc::now()).unwrap();

        let (behaviors, _edges, result) = install(&path, &[], 50 * 1024 * 1024).unwrap();
        assert_eq!(result.nodes_added, 1);
        assert_eq!(behaviors[0].provenance.package.as_deref(), Some("floop-core/meta"));
    }

    #[test]
    fn install_skips_forgotten_existing_nodes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.fpack");
        let manifest = PackManifest::new("floop-core/meta", "1.0.0").unwrap();
        let behavior = Behavior::new("meta-1", "teach-floop", "never ignore learned constraints");
        create(&path, &manifest, vec![behavior], vec![], Utc::now()).unwrap();

        let mut forgotten = Behavior::new("meta-1", "teach-floop", "never ignore learned constraints");
        forgotten.kind = crate::model::BehaviorKind::Forgotten;
        let (_behaviors, _edges, result) = install(&path, &[forgotten], 50 * 1024 * 1024).unwrap();
        assert_eq!(result.nodes_skipped, 1);
        assert_eq!(result.nodes_added, 0);
    }

    #[test]
    fn install_is_idempotent_at_same_pack_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.fpack");
        let manifest = PackManifest::new("floop-core/meta", "1.0.0").unwrap();
        let behavior = Behavior::new("meta-1", "teach-floop", "never ignore learned constraints");
        create(&path, &manifest, vec![behavior], vec![], Utc::now()).unwrap();

        let (behaviors, _edges, first) = install(&path, &[], 50 * 1024 * 1024).unwrap();
        let (_behaviors2, _edges2, second) = install(&path, &behaviors, 50 * 1024 * 1024).unwrap();
        assert_eq!(first.nodes_added, 1);
        assert_eq!(second.nodes_added, 0);
        assert_eq!(second.nodes_skipped, 1);
    }

    #[test]
    fn edges_with_missing_endpoint_are_skipped_with_a_warning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.fpack");
        let manifest = PackManifest::new("floop-core/meta", "1.0.0").unwrap();
        let behavior = Behavior::new("meta-1", "teach-floop", "x");
        let stray_edge = Edge::new("meta-1", "not-in-pack", crate::model::EdgeKind::SimilarTo, 0.5, Utc::now());
        create(&path, &manifest, vec![behavior], vec![stray_edge], Utc::now()).unwrap();

        let (_behaviors, edges, result) = install(&path, &[], 50 * 1024 * 1024).unwrap();
        assert!(edges.is_empty());
        assert_eq!(result.edges_skipped_missing_endpoint, 1);
    }

    #[test]
    fn install_tracks_installed_ids_but_not_skipped_ones() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.fpack");
        let manifest = PackManifest::new("floop-core/meta", "1.0.0").unwrap();
        let behavior = Behavior::new("meta-1", "teach-floop", "never ignore learned constraints");
        create(&path, &manifest, vec![behavior], vec![], Utc::now()).unwrap();

        let (behaviors, _edges, first) = install(&path, &[], 50 * 1024 * 1024).unwrap();
        assert_eq!(first.installed_ids, vec!["meta-1".to_string()]);

        let (_behaviors2, _edges2, second) = install(&path, &behaviors, 50 * 1024 * 1024).unwrap();
        assert!(second.installed_ids.is_empty());
    }

    #[test]
    fn list_installed_groups_by_pack_and_ignores_forgotten() {
        let mut a = Behavior::new("a", "n", "x");
        a.provenance.package = Some("floop-core/meta".to_string());
        a.provenance.package_version = Some("1.0.0".to_string());
        let mut b = Behavior::new("b", "n", "y");
        b.provenance.package = Some("floop-core/meta".to_string());
        b.provenance.package_version = Some("1.0.0".to_string());
        let mut forgotten = Behavior::new("c", "n", "z");
        forgotten.provenance.package = Some("floop-core/meta".to_string());
        forgotten.kind = crate::model::BehaviorKind::Forgotten;
        let unrelated = Behavior::new("d", "n", "w");

        let summaries = list_installed(&[a, b, forgotten, unrelated]);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].pack_id, "floop-core/meta");
        assert_eq!(summaries[0].node_count, 2);
    }

    #[test]
    fn remove_forgets_pack_nodes_and_drops_their_edges() {
        let mut a = Behavior::new("a", "n", "x");
        a.provenance.package = Some("floop-core/meta".to_string());
        let mut b = Behavior::new("b", "n", "y");
        b.provenance.package = Some("floop-core/meta".to_string());
        let keep = Behavior::new("c", "n", "z");
        let edge_within = Edge::new("a", "b", crate::model::EdgeKind::SimilarTo, 0.5, Utc::now());
        let edge_to_keep = Edge::new("a", "c", crate::model::EdgeKind::SimilarTo, 0.5, Utc::now());

        let (behaviors, edges, removed) =
            remove(&[a, b, keep], &[edge_within, edge_to_keep], "floop-core/meta");
        assert_eq!(removed, 2);
        assert!(behaviors.iter().find(|b| b.id == "a").unwrap().is_forgotten());
        assert!(behaviors.iter().find(|b| b.id == "b").unwrap().is_forgotten());
        assert!(!behaviors.iter().find(|b| b.id == "c").unwrap().is_forgotten());
        assert!(edges.is_empty());
    }

    #[test]
    fn filter_for_pack_drops_edges_whose_endpoint_is_filtered_out() {
        let a = Behavior::new("a", "n", "x");
        let mut b = Behavior::new("b", "n", "y");
        b.content.tags = vec!["other".to_string()];
        let edge = Edge::new("a", "b", crate::model::EdgeKind::SimilarTo, 0.5, Utc::now());
        let (kept, kept_edges) = filter_for_pack(&[a, b], &[edge], None, &["wanted".to_string()]);
        assert!(kept.is_empty());
        assert!(kept_edges.is_empty());
    }
}
