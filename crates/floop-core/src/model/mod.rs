//! Core entity types: behaviors, corrections, context snapshots, edges.

mod behavior;
mod context;
mod correction;
mod edge;

pub use behavior::{
    Behavior, BehaviorContent, BehaviorKind, BehaviorStats, PredicateValue, Provenance,
    WhenPredicate,
};
pub use context::ContextSnapshot;
pub use correction::{correction_hash, Correction, CorrectionInput};
pub use edge::{Edge, EdgeKind};
