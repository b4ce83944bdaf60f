//! Environment: hierarchical spatial decomposition of a scenario's volume.
//!
//! # Invariants
//! - A node is refined iff it has children.
//! - Refine only acts on a leaf, coarsen only on a refined node; a failed
//!   call leaves the tree untouched.
//! - Every node except the root has exactly one parent; there are no cycles.
//! - Handles to released nodes never resolve again.
//!
//! Nodes live in an arena and are addressed by generational [`NodeId`]s, so
//! coarsening releases a subtree by invalidating slots rather than by
//! walking an ownership graph of boxed children.

mod tree;

use serde::{Deserialize, Serialize};

pub use tree::{EnvironmentTree, MAX_REFINE_FACTOR, Node, NodeId};

/// Structural change published by the owning scenario as `environmentChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentChange {
    /// `node` was split into `children` new leaves.
    Refined { node: NodeId, children: usize },
    /// `node` became a leaf again; `released` descendants were dropped.
    Coarsened { node: NodeId, released: usize },
    /// The whole tree was replaced by a single root leaf.
    Reset { root: NodeId },
}
