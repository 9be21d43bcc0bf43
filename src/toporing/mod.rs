//! Ring trees: one ring per interior topology node, built together.
//!
//! The [`RingTreeBuilder`] walks the topology from a ring parent. At each
//! node it partitions the node's region among its eligible children under
//! the storage policy in effect there. It then recurses into each child with
//! the sub-policy that applies to the child's class.
//!
//! ```text
//!   RingTreeRecipe ──► RingTreeBuilder ──► RingTree ──► ResolvedReplicaMap
//!   (topology, policy,    (fresh or          (node id →     (region → servers)
//!    weights, scope)       incremental)       TopologyRing)
//! ```

mod builder;
mod feasibility;
mod recipe;
mod tree;

pub use builder::RingTreeBuilder;
pub use feasibility::{check_convergence_feasible, convergence_feasible};
pub use recipe::RingTreeRecipe;
pub use tree::RingTree;
