//! Static cluster shape and the replication rules attached to it.
//!
//! Everything here is supplied from outside and read-only for the duration
//! of a ring tree build:
//!
//! - [`Topology`]: rooted tree of [`Node`]s, servers at the leaves
//! - [`StoragePolicyGroup`]: per-level replica counts and sub-policies
//! - [`WeightSpecification`]: relative capacity of each node
//! - [`ExclusionSet`]: nodes that must not own data
//! - [`HostGroupTable`]: named server sets that scope a build

mod exclusion;
mod host_group;
mod node;
mod policy;
mod weights;

pub use exclusion::ExclusionSet;
pub use host_group::HostGroupTable;
pub use node::{Node, NodeClass, Topology};
pub use policy::{ChildPolicy, StoragePolicy, StoragePolicyGroup, SubPolicy};
pub use weights::{WeightSpecification, DEFAULT_WEIGHT};
