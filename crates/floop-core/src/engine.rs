//! `BehaviorEngine` — the facade tying the data model, learning pipeline,
//! ranking/activation, persistence, and pack/backup subsystems together
//! into the CRUD surface collaborators consume (§6.1).

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::activation::{self, ResolutionCandidate};
use crate::assembly::{self, ActiveBehavior, AssemblyFormat, AssemblyResult};
use crate::backup;
use crate::cancel::CancellationToken;
use crate::config::FloopConfig;
use crate::edges;
use crate::error::{FloopError, Result};
use crate::learning::{self, LearningResult, Placement};
use crate::model::{Behavior, BehaviorKind, ContextSnapshot, Correction, CorrectionInput, Edge};
use crate::packs::{self, PackInstallResult, PackManifest};
use crate::ranking::{self, ScoreBreakdown};
use crate::seed;
use crate::vector_index::{SearchHit, VectorIndex};
use crate::store::{MultiScopeStore, Scope};

/// Feedback signal for the `feedback` operation (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSignal {
    Followed,
    Confirmed,
    Overridden,
}

/// Per-behavior activation explanation for `show`/`why` (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationExplanation {
    pub behavior: Behavior,
    pub score: ScoreBreakdown,
    pub matched_context: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCounts {
    pub nodes: usize,
    pub edges: usize,
    /// How many payload nodes actually landed new or updated vs. were
    /// shadowed by an existing node of the same ID (merge mode only;
    /// `nodes_skipped` is always 0 for `backup`/`Replace`).
    pub nodes_restored: usize,
    pub nodes_skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    Merge,
    Replace,
}

/// The engine owns a dual-scope store and the configuration every
/// subsystem reads from. It is not `Clone`; a collaborator opens one per
/// command/RPC invocation, per the non-long-running-service model (§5).
pub struct BehaviorEngine {
    store: MultiScopeStore,
    config: FloopConfig,
}

impl BehaviorEngine {
    pub fn open(project_root: &Path, config: FloopConfig, create_local: bool) -> Result<Self> {
        let store = MultiScopeStore::open(project_root, create_local, false)?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &FloopConfig {
        &self.config
    }

    /// `learn`: run a correction through extract → place → triage and
    /// commit the result to `scope`.
    pub fn learn(
        &self,
        agent_action: String,
        corrected_action: String,
        context: ContextSnapshot,
        extra_tags: Vec<String>,
        scope: Scope,
    ) -> Result<LearningResult> {
        let now = Utc::now();
        let agent_action = crate::sanitize::sanitize_checked(&agent_action)?;
        let corrected_action = crate::sanitize::sanitize_checked(&corrected_action)?;
        let input = CorrectionInput {
            context,
            agent_action,
            corrected_action,
            human_response: None,
            corrector: None,
            extra_tags,
        };
        let mut correction = Correction::from_input(input, now);

        let existing = self.store.load_behaviors(scope)?;
        let result = learning::learn(&correction, &existing, &self.config, now);

        // §4.D step 4: the candidate node is always committed, regardless
        // of auto-accept (which only governs its provenance, set already by
        // `learning::learn`). A `Merge` replaces the existing target in
        // place; `Create`/`Specialize` append a new node.
        match &result.placement {
            Placement::Merge { target } => {
                let mut replacement = existing.clone();
                if let Some(slot) = replacement.iter_mut().find(|b| &b.id == target) {
                    *slot = result.behavior.clone();
                }
                self.store.replace_behaviors(scope, &replacement)?;
            }
            Placement::Create | Placement::Specialize { .. } => {
                self.store.append_behavior(scope, &result.behavior)?;
            }
        }

        for edge in &result.proposed_edges {
            self.store.append_edge(scope, edge)?;
        }

        correction.mark_processed(now);
        self.store.append_correction(scope, &correction)?;

        Ok(result)
    }

    /// `active`: resolve the active behaviors for a context and assemble
    /// them into a compiled prompt within a token budget.
    pub fn active(
        &self,
        context: &ContextSnapshot,
        budget_tokens: usize,
        format: AssemblyFormat,
        coalesce: bool,
        scope: Scope,
    ) -> Result<(AssemblyResult, Vec<Behavior>)> {
        let behaviors = self.store.load_behaviors(scope)?;
        let edges = self.store.load_edges(scope)?;
        let now = Utc::now();

        let matched: Vec<&Behavior> = behaviors
            .iter()
            .filter(|b| !b.is_forgotten())
            .filter(|b| b.when.matches(context))
            .collect();

        let mut seeds = std::collections::HashMap::new();
        let mut scores = std::collections::HashMap::new();
        for b in &matched {
            let history = synthetic_history(b, now);
            let score = ranking::score(b, context, &history, &self.config, now);
            seeds.insert(b.id.clone(), score.total);
            scores.insert(b.id.clone(), score);
        }

        let spread = activation::spread(&seeds, &edges, &self.config.spread, now);

        let candidates: Vec<ResolutionCandidate> = behaviors
            .iter()
            .filter(|b| !b.is_forgotten())
            .filter_map(|b| {
                let relevance = scores.get(&b.id).map(|s| s.total).or_else(|| {
                    spread.get(&b.id).map(|a| a.activation)
                })?;
                Some(ResolutionCandidate {
                    id: b.id.clone(),
                    relevance,
                    specificity: b.when.specificity(),
                    priority: b.priority,
                    confidence: b.confidence,
                    requires: b.requires.clone(),
                    overrides: b.overrides.clone(),
                    conflicts: b.conflicts.clone(),
                })
            })
            .collect();

        let resolution = activation::resolve(&candidates);

        let active_behaviors: Vec<ActiveBehavior> = resolution
            .active_ids
            .iter()
            .filter_map(|id| behaviors.iter().find(|b| &b.id == id))
            .map(|b| ActiveBehavior {
                behavior: b.clone(),
                activation: scores.get(&b.id).map(|s| s.total).unwrap_or(0.0),
            })
            .collect();

        let selected: Vec<Behavior> = active_behaviors.iter().map(|a| a.behavior.clone()).collect();
        let assembled = assembly::assemble(active_behaviors, budget_tokens, format, coalesce);
        Ok((assembled, selected))
    }

    /// `list`: filtered view over a scope's behaviors.
    pub fn list(
        &self,
        scope: Scope,
        kind_filter: Option<BehaviorKind>,
        tag_filter: Option<&str>,
    ) -> Result<Vec<Behavior>> {
        let behaviors = self.store.load_behaviors(scope)?;
        Ok(behaviors
            .into_iter()
            .filter(|b| kind_filter.map(|k| b.kind == k).unwrap_or(true))
            .filter(|b| {
                tag_filter
                    .map(|t| b.content.tags.iter().any(|tag| tag.eq_ignore_ascii_case(t)))
                    .unwrap_or(true)
            })
            .collect())
    }

    /// `feedback`: record a followed/confirmed/overridden signal against a
    /// behavior, applying rate-limited confidence reinforcement.
    pub fn feedback(&self, behavior_id: &str, signal: FeedbackSignal, scope: Scope) -> Result<Behavior> {
        let mut behaviors = self.store.load_behaviors(scope)?;
        let behavior = behaviors
            .iter_mut()
            .find(|b| b.id == behavior_id)
            .ok_or_else(|| FloopError::NotFound(behavior_id.to_string()))?;

        match signal {
            FeedbackSignal::Followed => behavior.stats.times_followed += 1,
            FeedbackSignal::Confirmed => {
                behavior.stats.times_confirmed += 1;
                ranking::reinforce(behavior, 0, &self.config);
            }
            FeedbackSignal::Overridden => behavior.stats.times_overridden += 1,
        }
        behavior.stats.updated_at = Utc::now();
        let updated = behavior.clone();

        self.store.replace_behaviors(scope, &behaviors)?;
        Ok(updated)
    }

    /// `show`/`why`: explain why a behavior would or wouldn't activate for
    /// a given context.
    pub fn show(&self, behavior_id: &str, context: &ContextSnapshot, scope: Scope) -> Result<ActivationExplanation> {
        let behaviors = self.store.load_behaviors(scope)?;
        let behavior = behaviors
            .iter()
            .find(|b| b.id == behavior_id)
            .ok_or_else(|| FloopError::NotFound(behavior_id.to_string()))?;

        let now = Utc::now();
        let history = synthetic_history(behavior, now);
        let score = ranking::score(behavior, context, &history, &self.config, now);
        let matched_context = behavior.when.matches(context);

        Ok(ActivationExplanation {
            behavior: behavior.clone(),
            score,
            matched_context,
        })
    }

    /// `forget`: mark behaviors as forgotten (absorbing terminal state).
    pub fn forget(&self, ids: &[String], scope: Scope) -> Result<Vec<Behavior>> {
        self.transition_kind(ids, scope, BehaviorKind::Forgotten)
    }

    /// `restore`: revert a forgotten behavior back to directive (the
    /// caller may re-classify afterward via a direct edit; this only lifts
    /// the forgotten state).
    pub fn restore(&self, ids: &[String], scope: Scope) -> Result<Vec<Behavior>> {
        self.transition_kind(ids, scope, BehaviorKind::Directive)
    }

    fn transition_kind(&self, ids: &[String], scope: Scope, kind: BehaviorKind) -> Result<Vec<Behavior>> {
        let mut behaviors = self.store.load_behaviors(scope)?;
        let mut touched = Vec::new();
        for behavior in behaviors.iter_mut() {
            if ids.contains(&behavior.id) {
                behavior.kind = kind;
                behavior.stats.updated_at = Utc::now();
                touched.push(behavior.clone());
            }
        }
        if touched.len() != ids.len() {
            return Err(FloopError::NotFound(format!(
                "expected {} behaviors, found {}",
                ids.len(),
                touched.len()
            )));
        }
        self.store.replace_behaviors(scope, &behaviors)?;
        Ok(touched)
    }

    /// `merge`: fold `source` into `target`, summing confirm/override
    /// counters and forgetting the source.
    pub fn merge(&self, source_id: &str, target_id: &str, scope: Scope) -> Result<Behavior> {
        let mut behaviors = self.store.load_behaviors(scope)?;
        let source = behaviors
            .iter()
            .find(|b| b.id == source_id)
            .cloned()
            .ok_or_else(|| FloopError::NotFound(source_id.to_string()))?;

        let target_idx = behaviors
            .iter()
            .position(|b| b.id == target_id)
            .ok_or_else(|| FloopError::NotFound(target_id.to_string()))?;

        behaviors[target_idx].stats.times_confirmed += source.stats.times_confirmed;
        behaviors[target_idx].stats.times_overridden += source.stats.times_overridden;
        behaviors[target_idx].stats.times_activated += source.stats.times_activated;
        behaviors[target_idx].stats.updated_at = Utc::now();
        let merged = behaviors[target_idx].clone();

        if let Some(source_mut) = behaviors.iter_mut().find(|b| b.id == source_id) {
            source_mut.kind = BehaviorKind::Forgotten;
            source_mut.stats.updated_at = Utc::now();
        }

        self.store.replace_behaviors(scope, &behaviors)?;
        Ok(merged)
    }

    /// `derive_edges`: run all-pairs similarity derivation against a scope.
    /// `clear` drops existing `SimilarTo` edges first; `dry_run` computes
    /// the report without writing. `cancel` is checked between pairs (§5) —
    /// a cancelled run aborts without writing anything back.
    pub fn derive_edges(
        &self,
        scope: Scope,
        dry_run: bool,
        clear: bool,
        cancel: &CancellationToken,
    ) -> Result<edges::DerivationReport> {
        let behaviors = self.store.load_behaviors(scope)?;
        let mut existing_edges = self.store.load_edges(scope)?;
        if clear {
            existing_edges.retain(|e| {
                !matches!(e.kind, crate::model::EdgeKind::SimilarTo | crate::model::EdgeKind::Overrides)
            });
        }

        let (new_edges, report) =
            edges::derive_all_pairs(&behaviors, &existing_edges, &self.config, Utc::now(), cancel)?;

        if !dry_run {
            let mut merged = existing_edges;
            merged.extend(new_edges);
            self.store.replace_edges(scope, &merged)?;
        }
        Ok(report)
    }

    /// `validate`: scan a scope's JSONL logs and graph for integrity
    /// problems, returning a human-readable error list rather than
    /// raising (validation failures are reportable data, not engine
    /// errors, unless the scope itself can't be read at all). `cancel` is
    /// checked between records (§5).
    pub fn validate(&self, scope: Scope, cancel: &CancellationToken) -> Result<Vec<String>> {
        let behaviors = self.store.load_behaviors(scope)?;
        let edges = self.store.load_edges(scope)?;
        let mut problems = Vec::new();

        let ids: std::collections::HashSet<&str> = behaviors.iter().map(|b| b.id.as_str()).collect();
        for edge in &edges {
            cancel.check()?;
            if !ids.contains(edge.source.as_str()) {
                problems.push(format!("edge references missing source behavior {}", edge.source));
            }
            if !ids.contains(edge.target.as_str()) {
                problems.push(format!("edge references missing target behavior {}", edge.target));
            }
        }
        for behavior in &behaviors {
            cancel.check()?;
            for required in &behavior.requires {
                if !ids.contains(required.as_str()) {
                    problems.push(format!(
                        "behavior {} requires missing behavior {}",
                        behavior.id, required
                    ));
                }
            }
            if !(0.0..=1.0).contains(&behavior.confidence) {
                problems.push(format!("behavior {} has out-of-range confidence {}", behavior.id, behavior.confidence));
            }
        }
        Ok(problems)
    }

    /// `store_embedding` (§4.A): accept an externally-produced embedding
    /// vector for a behavior and stamp it into the graph. The core never
    /// computes embeddings itself (embedding-model bindings are a
    /// collaborator concern, §1 Non-goals).
    pub fn store_embedding(&self, behavior_id: &str, vector: &[f32], model: &str, scope: Scope) -> Result<()> {
        self.store.store_embedding(scope, behavior_id, vector, model)
    }

    /// `vector_search` (§4.H): build a tiered index from every embedding
    /// currently stored in `scope` and search it. Rebuilt per call since
    /// the engine does not keep a long-lived in-memory index between
    /// invocations (§5 scheduling model).
    pub fn vector_search(&self, query: &[f32], top_k: usize, scope: Scope) -> Result<Vec<SearchHit>> {
        let embeddings = self.store.get_all_embeddings(scope)?;
        let mut index = VectorIndex::new(self.config.hnsw);
        for (id, _model, vector) in embeddings {
            index.add(&id, vector)?;
        }
        Ok(index.search(query, top_k))
    }

    /// `pack create`.
    pub fn pack_create(
        &self,
        path: &Path,
        manifest: &PackManifest,
        kind_filter: Option<&str>,
        tag_filter: &[String],
        scope: Scope,
    ) -> Result<()> {
        let behaviors = self.store.load_behaviors(scope)?;
        let edges = self.store.load_edges(scope)?;
        let (kept, kept_edges) = packs::filter_for_pack(&behaviors, &edges, kind_filter, tag_filter);
        packs::create(path, manifest, kept, kept_edges, Utc::now())
    }

    /// `pack install`. When `derive_edges` is set, also runs subset edge
    /// derivation (§4.E) between the pack's newly added/updated behaviors
    /// and every pre-existing behavior in the scope (§4.J step 4) — skipped
    /// by default since it's an optional, heavier pass on top of install.
    pub fn pack_install(
        &self,
        path: &Path,
        scope: Scope,
        derive_edges: bool,
        cancel: &CancellationToken,
    ) -> Result<PackInstallResult> {
        let existing = self.store.load_behaviors(scope)?;
        let (merged_behaviors, new_edges, result) = packs::install(path, &existing, self.config.max_pack_size_bytes)?;
        self.store.replace_behaviors(scope, &merged_behaviors)?;

        let mut all_edges = self.store.load_edges(scope)?;
        if !new_edges.is_empty() {
            all_edges.extend(new_edges);
        }

        if derive_edges && !result.installed_ids.is_empty() {
            let (subset_edges, _report) = edges::derive_subset(
                &result.installed_ids,
                &merged_behaviors,
                &all_edges,
                &self.config,
                Utc::now(),
                cancel,
            )?;
            all_edges.extend(subset_edges);
        }

        self.store.replace_edges(scope, &all_edges)?;
        Ok(result)
    }

    /// `pack list`: pack-provenance summary of a scope's live behaviors.
    pub fn pack_list(&self, scope: Scope) -> Result<Vec<packs::PackSummary>> {
        let behaviors = self.store.load_behaviors(scope)?;
        Ok(packs::list_installed(&behaviors))
    }

    /// `pack remove`: forget every behavior stamped with `pack_id`'s
    /// provenance and drop edges left dangling by that removal.
    pub fn pack_remove(&self, pack_id: &str, scope: Scope) -> Result<usize> {
        let behaviors = self.store.load_behaviors(scope)?;
        let edges = self.store.load_edges(scope)?;
        let (updated_behaviors, updated_edges, removed) = packs::remove(&behaviors, &edges, pack_id);
        self.store.replace_behaviors(scope, &updated_behaviors)?;
        self.store.replace_edges(scope, &updated_edges)?;
        Ok(removed)
    }

    /// Seed the core meta-behaviors into a scope (idempotent, respects
    /// forgotten) — the engine-level entry point for `packs.installed`
    /// bookkeeping the collaborator records at setup time.
    pub fn seed_core(&self, scope: Scope) -> Result<usize> {
        let existing = self.store.load_behaviors(scope)?;
        let to_add = seed::seed(&existing, Utc::now());
        let count = to_add.len();
        for behavior in &to_add {
            self.store.append_behavior(scope, behavior)?;
        }
        Ok(count)
    }

    /// `backup`: snapshot a scope to a V2 file.
    pub fn backup(&self, path: &Path, scope: Scope) -> Result<BackupCounts> {
        let behaviors = self.store.load_behaviors(scope)?;
        let edges = self.store.load_edges(scope)?;
        let counts = BackupCounts {
            nodes: behaviors.len(),
            edges: edges.len(),
            nodes_restored: behaviors.len(),
            nodes_skipped: 0,
        };
        let payload = backup::BackupPayload { nodes: behaviors, edges };
        backup::write_v2(path, &payload, serde_json::json!({}), Utc::now())?;
        Ok(counts)
    }

    /// `restore_backup`: load a backup file and either merge it into the
    /// existing graph or replace the graph outright. `cancel` is checked
    /// between records during a merge (§5); a cancelled run leaves the
    /// store untouched since nothing is written until the method returns.
    pub fn restore_backup(
        &self,
        path: &Path,
        mode: RestoreMode,
        scope: Scope,
        cancel: &CancellationToken,
    ) -> Result<BackupCounts> {
        let payload = backup::read(path, self.config.max_restore_bytes)?;

        let (nodes, edges, nodes_restored, nodes_skipped) = match mode {
            RestoreMode::Replace => {
                let restored = payload.nodes.len();
                (payload.nodes, payload.edges, restored, 0)
            }
            RestoreMode::Merge => {
                let mut existing = self.store.load_behaviors(scope)?;
                let mut by_id: std::collections::HashMap<String, Behavior> =
                    existing.drain(..).map(|b| (b.id.clone(), b)).collect();
                let mut restored = 0usize;
                let mut skipped = 0usize;
                for node in payload.nodes {
                    cancel.check()?;
                    if by_id.contains_key(&node.id) {
                        skipped += 1;
                    } else {
                        restored += 1;
                        by_id.insert(node.id.clone(), node);
                    }
                }
                let mut existing_edges = self.store.load_edges(scope)?;
                existing_edges.extend(payload.edges);
                (by_id.into_values().collect(), existing_edges, restored, skipped)
            }
        };

        let counts =
            BackupCounts { nodes: nodes.len(), edges: edges.len(), nodes_restored, nodes_skipped };
        self.store.replace_behaviors(scope, &nodes)?;
        self.store.replace_edges(scope, &edges)?;
        Ok(counts)
    }

    pub fn local_root(&self) -> Option<PathBuf> {
        self.store.local_root().map(|p| p.to_path_buf())
    }
}

/// Approximate an ACT-R activation history from the summary stats a
/// behavior already carries: `times_activated` events, all assumed to have
/// last occurred at `stats.updated_at`. This keeps the model from needing
/// to persist a full access-time log purely for ranking.
fn synthetic_history(behavior: &Behavior, _now: chrono::DateTime<Utc>) -> Vec<chrono::DateTime<Utc>> {
    if behavior.stats.times_activated == 0 {
        Vec::new()
    } else {
        vec![behavior.stats.updated_at; behavior.stats.times_activated as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine(dir: &Path) -> BehaviorEngine {
        BehaviorEngine::open(dir, FloopConfig::default(), true).unwrap()
    }

    #[test]
    fn learn_then_active_surfaces_the_new_behavior() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());

        let mut ctx = ContextSnapshot::new(Utc::now());
        ctx.file_path = Some("app.py".to_string());
        ctx.infer_language();

        engine
            .learn(
                "used os.path".to_string(),
                "use pathlib instead".to_string(),
                ctx.clone(),
                vec![],
                Scope::Local,
            )
            .unwrap();

        let mut query_ctx = ContextSnapshot::new(Utc::now());
        query_ctx.file_path = Some("main.py".to_string());
        query_ctx.infer_language();

        let (_assembled, active) = engine
            .active(&query_ctx, 10_000, AssemblyFormat::Plain, false, Scope::Local)
            .unwrap();
        assert_eq!(active.len(), 1);
        assert!(active[0].content.canonical.contains("pathlib"));
        assert_eq!(active[0].kind, BehaviorKind::Directive);
        assert!(active[0].confidence >= 0.7);
    }

    #[test]
    fn forget_then_restore_roundtrips() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let ctx = ContextSnapshot::new(Utc::now());
        let result = engine
            .learn("wrong".to_string(), "do the right thing".to_string(), ctx, vec![], Scope::Local)
            .unwrap();
        let id = result.behavior().id.clone();

        let forgotten = engine.forget(&[id.clone()], Scope::Local).unwrap();
        assert_eq!(forgotten[0].kind, BehaviorKind::Forgotten);

        let restored = engine.restore(&[id], Scope::Local).unwrap();
        assert_eq!(restored[0].kind, BehaviorKind::Directive);
    }

    #[test]
    fn backup_then_restore_preserves_node_count() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let ctx = ContextSnapshot::new(Utc::now());
        engine
            .learn("wrong".to_string(), "never commit secrets".to_string(), ctx, vec![], Scope::Local)
            .unwrap();

        let backup_path = dir.path().join("backup.json.gz");
        let counts = engine.backup(&backup_path, Scope::Local).unwrap();
        assert_eq!(counts.nodes, 1);

        let restored_counts = engine
            .restore_backup(&backup_path, RestoreMode::Replace, Scope::Local, &CancellationToken::new())
            .unwrap();
        assert_eq!(restored_counts.nodes, 1);
    }

    #[test]
    fn restore_merge_keeps_existing_node_and_adds_new_ones() {
        let source_dir = tempdir().unwrap();
        let source = engine(source_dir.path());
        let ctx = ContextSnapshot::new(Utc::now());
        let a = source
            .learn("wrong-a".to_string(), "source version of a".to_string(), ctx.clone(), vec![], Scope::Local)
            .unwrap()
            .behavior()
            .id
            .clone();
        source
            .learn("wrong-b".to_string(), "behavior b".to_string(), ctx.clone(), vec![], Scope::Local)
            .unwrap();
        source
            .learn("wrong-c".to_string(), "behavior c".to_string(), ctx.clone(), vec![], Scope::Local)
            .unwrap();
        let backup_path = source_dir.path().join("backup.json.gz");
        source.backup(&backup_path, Scope::Local).unwrap();

        let dest_dir = tempdir().unwrap();
        let dest = engine(dest_dir.path());
        let mut dest_a = source.store.load_behaviors(Scope::Local).unwrap().into_iter().find(|b| b.id == a).unwrap();
        dest_a.content.canonical = "destination version of a".to_string();
        dest.store.append_behavior(Scope::Local, &dest_a).unwrap();

        let counts = dest
            .restore_backup(&backup_path, RestoreMode::Merge, Scope::Local, &CancellationToken::new())
            .unwrap();
        assert_eq!(counts.nodes, 3);
        assert_eq!(counts.nodes_restored, 2);
        assert_eq!(counts.nodes_skipped, 1);

        let merged = dest.store.load_behaviors(Scope::Local).unwrap();
        assert_eq!(merged.len(), 3);
        let kept_a = merged.iter().find(|b| b.id == a).unwrap();
        assert_eq!(kept_a.content.canonical, "destination version of a");
    }

    #[test]
    fn validate_reports_missing_edge_endpoints() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let store = MultiScopeStore::open(dir.path(), false, false).unwrap();
        let edge = Edge::new("ghost-a", "ghost-b", crate::model::EdgeKind::SimilarTo, 0.5, Utc::now());
        store.append_edge(Scope::Local, &edge).unwrap();

        let problems = engine.validate(Scope::Local, &CancellationToken::new()).unwrap();
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn store_embedding_then_vector_search_finds_the_closest_match() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let ctx = ContextSnapshot::new(Utc::now());
        let near = engine
            .learn("wrong".to_string(), "use pathlib".to_string(), ctx.clone(), vec![], Scope::Local)
            .unwrap()
            .behavior()
            .id
            .clone();
        let far = engine
            .learn("wrong2".to_string(), "never commit secrets".to_string(), ctx, vec![], Scope::Local)
            .unwrap()
            .behavior()
            .id
            .clone();

        engine.store_embedding(&near, &[1.0, 0.0, 0.0], "test-model", Scope::Local).unwrap();
        engine.store_embedding(&far, &[0.0, 1.0, 0.0], "test-model", Scope::Local).unwrap();

        let hits = engine.vector_search(&[0.9, 0.1, 0.0], 1, Scope::Local).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, near);
    }

    #[test]
    fn pack_install_then_list_then_remove_roundtrips() {
        use crate::packs::{self, PackManifest};

        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let pack_path = dir.path().join("style.fpack");
        let manifest = PackManifest::new("floop-core/style", "1.0.0").unwrap();
        let behavior = Behavior::new("style-1", "n", "prefer tabs over spaces");
        packs::create(&pack_path, &manifest, vec![behavior], vec![], Utc::now()).unwrap();

        let result = engine
            .pack_install(&pack_path, Scope::Local, false, &CancellationToken::new())
            .unwrap();
        assert_eq!(result.nodes_added, 1);
        assert_eq!(result.installed_ids, vec!["style-1".to_string()]);

        let summaries = engine.pack_list(Scope::Local).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].pack_id, "floop-core/style");
        assert_eq!(summaries[0].node_count, 1);

        let removed = engine.pack_remove("floop-core/style", Scope::Local).unwrap();
        assert_eq!(removed, 1);
        assert!(engine.pack_list(Scope::Local).unwrap().is_empty());
    }

    #[test]
    fn pack_install_with_derive_edges_links_against_existing_behaviors() {
        use crate::packs::{self, PackManifest};

        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let ctx = ContextSnapshot::new(Utc::now());
        engine
            .learn(
                "wrong".to_string(),
                "never commit secrets to the repository".to_string(),
                ctx,
                vec![],
                Scope::Local,
            )
            .unwrap();

        let pack_path = dir.path().join("style.fpack");
        let manifest = PackManifest::new("floop-core/style", "1.0.0").unwrap();
        let behavior = Behavior::new("style-1", "n", "never commit secrets anywhere in the repo");
        packs::create(&pack_path, &manifest, vec![behavior], vec![], Utc::now()).unwrap();

        engine
            .pack_install(&pack_path, Scope::Local, true, &CancellationToken::new())
            .unwrap();

        let store = MultiScopeStore::open(dir.path(), false, false).unwrap();
        let edges = store.load_edges(Scope::Local).unwrap();
        assert!(edges.iter().any(|e| e.kind == crate::model::EdgeKind::SimilarTo));
    }

    #[test]
    fn seed_core_adds_nine_behaviors_once() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let added_first = engine.seed_core(Scope::Local).unwrap();
        let added_second = engine.seed_core(Scope::Local).unwrap();
        assert_eq!(added_first, 9);
        assert_eq!(added_second, 0);
    }
}
