//! Persistence layer: JSONL source of truth plus a derived SQLite cache,
//! composed into local/global scopes (§4.A, §6.2).

pub mod cache;
mod jsonl;
mod scope;
mod single;

pub use jsonl::JsonlLog;
pub use scope::{MultiScopeStore, Scope};
pub use single::ScopeStore;
