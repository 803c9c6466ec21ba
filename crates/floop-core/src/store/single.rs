//! A single `.floop/` scope directory: three JSONL logs plus a rebuildable
//! cache (§6.2 layout).

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::{FloopError, Result};
use crate::model::{Behavior, Correction, Edge};

use super::cache;
use super::jsonl::JsonlLog;

/// One `.floop/` directory: source-of-truth logs plus its derived cache.
pub struct ScopeStore {
    root: PathBuf,
    behaviors: JsonlLog<Behavior>,
    edges: JsonlLog<Edge>,
    corrections: JsonlLog<Correction>,
    cache: Connection,
}

impl ScopeStore {
    /// Open an existing scope, or create one at `root` if `create` is set.
    pub fn open(root: impl Into<PathBuf>, create: bool) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            if !create {
                return Err(FloopError::NotInitialized(root.display().to_string()));
            }
            fs::create_dir_all(&root)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&root, fs::Permissions::from_mode(0o700))?;
            }
            fs::write(root.join(".gitignore"), "floop.db\nfloop.db-shm\nfloop.db-wal\nhnsw.bin\nbehaviors.json\naudit.jsonl\n")?;
        }

        let behaviors = JsonlLog::new(root.join("nodes.jsonl"));
        let edges = JsonlLog::new(root.join("edges.jsonl"));
        let corrections = JsonlLog::new(root.join("corrections.jsonl"));
        let cache = cache::open(&root.join("floop.db"))?;

        let store = Self { root, behaviors, edges, corrections, cache };
        store.rebuild_cache()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_initialized(root: &Path) -> bool {
        root.join("nodes.jsonl").exists() || root.join("manifest.yaml").exists() || root.exists()
    }

    pub fn load_behaviors(&self) -> Result<Vec<Behavior>> {
        self.behaviors.read_all()
    }

    pub fn load_edges(&self) -> Result<Vec<Edge>> {
        self.edges.read_all()
    }

    pub fn load_corrections(&self) -> Result<Vec<Correction>> {
        self.corrections.read_all()
    }

    pub fn append_correction(&self, correction: &Correction) -> Result<()> {
        self.corrections.append(correction)
    }

    /// Append a new behavior to the log and refresh the cache.
    pub fn append_behavior(&self, behavior: &Behavior) -> Result<()> {
        self.behaviors.append(behavior)?;
        self.rebuild_cache()
    }

    /// Compact-rewrite the full behavior set (used by forget/merge/restore,
    /// where an existing record's content changes rather than a new one
    /// being appended).
    pub fn replace_behaviors(&self, behaviors: &[Behavior]) -> Result<()> {
        self.behaviors.rewrite(behaviors)?;
        self.rebuild_cache()
    }

    pub fn append_edge(&self, edge: &Edge) -> Result<()> {
        self.edges.append(edge)?;
        self.rebuild_cache()
    }

    pub fn replace_edges(&self, edges: &[Edge]) -> Result<()> {
        self.edges.rewrite(edges)?;
        self.rebuild_cache()
    }

    /// `sync`: establishes a happens-before point observable by a
    /// subsequent reopen (§5). Since every mutation above already
    /// fsyncs its JSONL write and rebuilds the cache synchronously, this
    /// is a no-op placed at the API boundary so collaborators have an
    /// explicit barrier to call.
    pub fn sync(&self) -> Result<()> {
        Ok(())
    }

    pub fn list_behaviors_by_kind(&self, kind: Option<&str>) -> Result<Vec<Behavior>> {
        cache::list_behaviors(&self.cache, kind)
    }

    /// `store_embedding`: stamp a behavior's `metadata.embedding` and
    /// rewrite the log (source of truth), then refresh the derived cache's
    /// `embeddings` side-table in the same pass (§4.A).
    pub fn store_embedding(&self, id: &str, vector: &[f32], model: &str) -> Result<()> {
        let mut behaviors = self.load_behaviors()?;
        let behavior = behaviors
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| FloopError::NotFound(id.to_string()))?;
        behavior.set_embedding(vector, model);
        self.replace_behaviors(&behaviors)
    }

    /// `get_all_embeddings`: read straight from the derived cache rather
    /// than decoding every behavior's base64 blob.
    pub fn get_all_embeddings(&self) -> Result<Vec<(String, String, Vec<f32>)>> {
        cache::get_all_embeddings(&self.cache)
    }

    fn rebuild_cache(&self) -> Result<()> {
        let behaviors = self.behaviors.read_all()?;
        let edges = self.edges.read_all()?;
        cache::rebuild(&self.cache, &behaviors, &edges)
    }
}
