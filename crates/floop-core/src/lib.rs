//! # floop-core
//!
//! A persistent, context-aware behavior graph for AI coding agents. An
//! agent's corrections ("no, do it this way") are distilled into typed
//! `Behavior` nodes, linked by weighted edges, ranked by a four-signal
//! relevance score, and assembled into a token-budgeted prompt block for
//! the next session.
//!
//! - **Learning**: corrections are deduplicated against existing behaviors
//!   by content/tag/context similarity and either merged, queued for
//!   review, or created fresh.
//! - **Ranking**: context match, ACT-R base-level activation, feedback
//!   quality, and kind/priority combine into a single relevance score.
//! - **Graph resolution**: `requires`/`overrides`/`conflicts` edges turn a
//!   scored candidate set into a conflict-free active set.
//! - **Persistence**: an append-only JSONL log is the source of truth; a
//!   SQLite cache is rebuilt from it for fast filtered reads.
//! - **Packs**: versioned, portable bundles of behaviors that install
//!   against a scope without reviving anything the operator forgot.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use floop_core::{BehaviorEngine, FloopConfig, Scope};
//! use floop_core::model::ContextSnapshot;
//! use chrono::Utc;
//!
//! let engine = BehaviorEngine::open(std::path::Path::new("."), FloopConfig::default(), true)?;
//! let ctx = ContextSnapshot::new(Utc::now());
//! let result = engine.learn(
//!     "used os.path".to_string(),
//!     "use pathlib instead".to_string(),
//!     ctx,
//!     vec![],
//!     Scope::Local,
//! )?;
//! # Ok::<(), floop_core::FloopError>(())
//! ```
//!
//! ## Feature flags
//!
//! - `bundled-sqlite` (default): statically link SQLite rather than
//!   requiring a system library.
//! - `vector-search` (default): promote the vector index to HNSW
//!   (`usearch`) once a scope clears `tier_threshold` entries.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod activation;
pub mod assembly;
pub mod backup;
pub mod cancel;
pub mod config;
pub mod edges;
pub mod engine;
pub mod error;
pub mod learning;
pub mod model;
pub mod packs;
pub mod ranking;
pub mod sanitize;
pub mod seed;
pub mod similarity;
pub mod store;
pub mod vector_index;

pub use cancel::CancellationToken;
pub use config::FloopConfig;
pub use engine::{ActivationExplanation, BackupCounts, BehaviorEngine, FeedbackSignal, RestoreMode};
pub use error::{FloopError, Result};
pub use store::Scope;

/// Crate version, exposed for `provenance.package_version` stamping and
/// diagnostic output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for a typical collaborator (CLI, hook, MCP server).
pub mod prelude {
    pub use crate::assembly::{AssemblyFormat, AssemblyResult};
    pub use crate::cancel::CancellationToken;
    pub use crate::config::FloopConfig;
    pub use crate::engine::{ActivationExplanation, BackupCounts, BehaviorEngine, FeedbackSignal, RestoreMode};
    pub use crate::error::{FloopError, Result};
    pub use crate::model::{
        Behavior, BehaviorKind, ContextSnapshot, Correction, CorrectionInput, Edge, EdgeKind,
    };
    pub use crate::packs::PackManifest;
    pub use crate::store::Scope;
    pub use crate::vector_index::SearchHit;
}
