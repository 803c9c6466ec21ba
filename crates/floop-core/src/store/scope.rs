//! Dual-scope composition: a project-local `.floop/` store and a
//! user-global one, with local winning on ID collision (§1, Open Question
//! (b) in the expanded spec).

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{FloopError, Result};
use crate::model::{Behavior, Correction, Edge};

use super::single::ScopeStore;

/// Which scope(s) an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Global,
    Both,
}

/// Composes a local and a global `ScopeStore`. Reads merge both with local
/// entries shadowing global entries of the same ID; writes go to whichever
/// scope(s) the caller specifies. No cross-scope reconciliation is
/// attempted if both independently diverge for the same ID under `Both`.
pub struct MultiScopeStore {
    local: Option<ScopeStore>,
    global: Option<ScopeStore>,
}

impl MultiScopeStore {
    /// `project_root` is the repo/working directory; the local store lives
    /// at `<project_root>/.floop`. The global store lives at the
    /// platform's standard data directory for `com.floop.floop`.
    pub fn open(project_root: &Path, create_local: bool, create_global: bool) -> Result<Self> {
        let local_path = project_root.join(".floop");
        let local = if local_path.exists() || create_local {
            Some(ScopeStore::open(&local_path, create_local)?)
        } else {
            None
        };

        let global_path = global_scope_path()?;
        let global = if global_path.exists() || create_global {
            Some(ScopeStore::open(&global_path, create_global)?)
        } else {
            None
        };

        Ok(Self { local, global })
    }

    /// Resolve a single concrete scope to its store. `Scope::Both` has no
    /// single store to return — every write path that accepts `Both` must
    /// handle it explicitly by targeting both stores independently (§1 Open
    /// Question (b): no cross-scope merge/CRDT reconciliation).
    fn store_for(&self, scope: Scope) -> Result<&ScopeStore> {
        match scope {
            Scope::Local => self.local.as_ref().ok_or_else(|| FloopError::NotInitialized("local".to_string())),
            Scope::Global => self.global.as_ref().ok_or_else(|| FloopError::NotInitialized("global".to_string())),
            Scope::Both => unreachable!("store_for must not be called with Scope::Both"),
        }
    }

    /// All behaviors visible from `scope`. Under `Both`, local entries take
    /// precedence over a global entry with the same ID.
    pub fn load_behaviors(&self, scope: Scope) -> Result<Vec<Behavior>> {
        match scope {
            Scope::Local => self.store_for(Scope::Local)?.load_behaviors(),
            Scope::Global => self.store_for(Scope::Global)?.load_behaviors(),
            Scope::Both => {
                let mut merged = std::collections::HashMap::new();
                if let Some(global) = &self.global {
                    for b in global.load_behaviors()? {
                        merged.insert(b.id.clone(), b);
                    }
                }
                if let Some(local) = &self.local {
                    for b in local.load_behaviors()? {
                        merged.insert(b.id.clone(), b);
                    }
                }
                Ok(merged.into_values().collect())
            }
        }
    }

    pub fn load_edges(&self, scope: Scope) -> Result<Vec<Edge>> {
        match scope {
            Scope::Local => self.store_for(Scope::Local)?.load_edges(),
            Scope::Global => self.store_for(Scope::Global)?.load_edges(),
            Scope::Both => {
                let mut edges = Vec::new();
                if let Some(global) = &self.global {
                    edges.extend(global.load_edges()?);
                }
                if let Some(local) = &self.local {
                    edges.extend(local.load_edges()?);
                }
                Ok(edges)
            }
        }
    }

    pub fn append_behavior(&self, scope: Scope, behavior: &Behavior) -> Result<()> {
        match scope {
            Scope::Both => {
                self.store_for(Scope::Local)?.append_behavior(behavior)?;
                self.store_for(Scope::Global)?.append_behavior(behavior)?;
                Ok(())
            }
            other => self.store_for(other)?.append_behavior(behavior),
        }
    }

    pub fn replace_behaviors(&self, scope: Scope, behaviors: &[Behavior]) -> Result<()> {
        match scope {
            Scope::Both => {
                self.store_for(Scope::Local)?.replace_behaviors(behaviors)?;
                self.store_for(Scope::Global)?.replace_behaviors(behaviors)?;
                Ok(())
            }
            other => self.store_for(other)?.replace_behaviors(behaviors),
        }
    }

    pub fn append_edge(&self, scope: Scope, edge: &Edge) -> Result<()> {
        match scope {
            Scope::Both => {
                self.store_for(Scope::Local)?.append_edge(edge)?;
                self.store_for(Scope::Global)?.append_edge(edge)?;
                Ok(())
            }
            other => self.store_for(other)?.append_edge(edge),
        }
    }

    pub fn replace_edges(&self, scope: Scope, edges: &[Edge]) -> Result<()> {
        match scope {
            Scope::Both => {
                self.store_for(Scope::Local)?.replace_edges(edges)?;
                self.store_for(Scope::Global)?.replace_edges(edges)?;
                Ok(())
            }
            other => self.store_for(other)?.replace_edges(edges),
        }
    }

    pub fn append_correction(&self, scope: Scope, correction: &Correction) -> Result<()> {
        match scope {
            Scope::Both => {
                self.store_for(Scope::Local)?.append_correction(correction)?;
                self.store_for(Scope::Global)?.append_correction(correction)?;
                Ok(())
            }
            other => self.store_for(other)?.append_correction(correction),
        }
    }

    /// `store_embedding`. Under `Both`, targets the local store only —
    /// embeddings are a per-scope enrichment, not a dual-write concern.
    pub fn store_embedding(&self, scope: Scope, id: &str, vector: &[f32], model: &str) -> Result<()> {
        match scope {
            Scope::Global => self.store_for(Scope::Global)?.store_embedding(id, vector, model),
            Scope::Local | Scope::Both => self.store_for(Scope::Local)?.store_embedding(id, vector, model),
        }
    }

    /// `get_all_embeddings`. Under `Both`, merges both scopes with local
    /// entries shadowing a global entry for the same ID, mirroring
    /// `load_behaviors`.
    pub fn get_all_embeddings(&self, scope: Scope) -> Result<Vec<(String, String, Vec<f32>)>> {
        match scope {
            Scope::Local => self.store_for(Scope::Local)?.get_all_embeddings(),
            Scope::Global => self.store_for(Scope::Global)?.get_all_embeddings(),
            Scope::Both => {
                let mut merged = std::collections::HashMap::new();
                if let Some(global) = &self.global {
                    for (id, model, vector) in global.get_all_embeddings()? {
                        merged.insert(id, (model, vector));
                    }
                }
                if let Some(local) = &self.local {
                    for (id, model, vector) in local.get_all_embeddings()? {
                        merged.insert(id, (model, vector));
                    }
                }
                Ok(merged.into_iter().map(|(id, (model, vector))| (id, model, vector)).collect())
            }
        }
    }

    pub fn local_root(&self) -> Option<&Path> {
        self.local.as_ref().map(|s| s.root())
    }

    pub fn global_root(&self) -> Option<&Path> {
        self.global.as_ref().map(|s| s.root())
    }
}

fn global_scope_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "floop", "floop")
        .ok_or_else(|| FloopError::Io(std::io::Error::other("no home directory available")))?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn local_only_scope_works_without_global() {
        let dir = tempdir().unwrap();
        let store = MultiScopeStore::open(dir.path(), true, false).unwrap();
        let b = Behavior::new("a", "n", "x");
        store.append_behavior(Scope::Local, &b).unwrap();
        assert_eq!(store.load_behaviors(Scope::Local).unwrap().len(), 1);
    }

    #[test]
    fn missing_local_scope_returns_not_initialized() {
        let dir = tempdir().unwrap();
        let store = MultiScopeStore::open(dir.path(), false, false).unwrap();
        assert!(store.load_behaviors(Scope::Local).is_err());
    }

    #[test]
    fn replace_behaviors_both_writes_to_both_stores_independently() {
        // Constructed directly (rather than via `open`) so the "global" half
        // stays inside the tempdir instead of touching the real platform
        // data directory.
        let dir = tempdir().unwrap();
        let store = MultiScopeStore {
            local: Some(ScopeStore::open(dir.path().join("local"), true).unwrap()),
            global: Some(ScopeStore::open(dir.path().join("global"), true).unwrap()),
        };
        let b = Behavior::new("a", "n", "x");
        store.append_behavior(Scope::Both, &b).unwrap();

        let mut updated = b.clone();
        updated.priority = 9;
        store.replace_behaviors(Scope::Both, &[updated]).unwrap();

        assert_eq!(store.store_for(Scope::Local).unwrap().load_behaviors().unwrap()[0].priority, 9);
        assert_eq!(store.store_for(Scope::Global).unwrap().load_behaviors().unwrap()[0].priority, 9);
    }
}
