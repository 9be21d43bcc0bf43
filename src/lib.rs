//! Topology-aware replica placement for a distributed key-value store.
//!
//! This crate computes which servers own which regions of a 64-bit ring and
//! tracks how a cluster converges onto a new placement:
//! - **Ring trees** built per interior topology node, honoring storage
//!   policies, capacity weights, exclusions and host-group scope
//! - **Incremental rebuilds** that move as little of the ring as possible
//! - **Convergence states** with strict transition rules and persistence
//! - **Version counters** that are unique and increasing per key
//!
//! # Example
//!
//! ```rust,no_run
//! use ringtree::topology::{Node, NodeClass, StoragePolicy, StoragePolicyGroup, SubPolicy, Topology};
//! use ringtree::{OwnerQueryMode, RingBuildConfig, RingTreeBuilder, RingTreeRecipe};
//! use std::sync::Arc;
//!
//! fn main() -> ringtree::Result<()> {
//!     let topology = Topology::new(Node::intermediate(
//!         "rack1",
//!         NodeClass::Rack,
//!         vec![Node::server("s1"), Node::server("s2"), Node::server("s3")],
//!     ))?;
//!     let policies = StoragePolicyGroup::new().with_policy(StoragePolicy::new(
//!         "rack_policy",
//!         NodeClass::Rack,
//!         SubPolicy::new(2),
//!     ));
//!
//!     let recipe = RingTreeRecipe::new(Arc::new(topology), "rack1", Arc::new(policies), "rack_policy")?;
//!     let builder = RingTreeBuilder::new(RingBuildConfig::default())?;
//!     let tree = builder.build(&recipe, None)?;
//!
//!     let owners = tree.owners(b"user:123", OwnerQueryMode::Primary)?;
//!     println!("user:123 -> {:?}", owners);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  ┌──────────┐  ┌──────────────┐
//! │ topology │  │  loader  │  │    config    │
//! └────┬─────┘  └────┬─────┘  └──────┬───────┘
//!      └─────────────┼───────────────┘
//!                    ▼
//!            ┌───────────────┐       ┌──────────────┐
//!            │   toporing    │──────►│ partitioning │
//!            │ (ring trees)  │       │ (one ring)   │
//!            └───────┬───────┘       └──────────────┘
//!                    ▼
//!            ┌───────────────┐       ┌──────────────┐
//!            │  convergence  │       │  versioning  │
//!            └───────────────┘       └──────────────┘
//! ```

pub mod config;
pub mod convergence;
pub mod error;
pub mod loader;
pub mod partitioning;
pub mod topology;
pub mod toporing;
pub mod types;
pub mod versioning;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use config::RingBuildConfig;
pub use error::{Error, Result};
pub use types::{NodeId, OwnerQueryMode, RingCoordinate};

// Re-export ring tree types
pub use toporing::{check_convergence_feasible, convergence_feasible, RingTree, RingTreeBuilder, RingTreeRecipe};

// Re-export partitioning types
pub use partitioning::{OwnershipChange, OwnershipRole, Owners, ResolvedReplicaMap, RingRegion, TopologyRing};

// Re-export convergence types
pub use convergence::{
    InMemoryRingStateStore, RingId, RingIdAndVersionPair, RingState, RingStateRecord, RingStateStore,
    RingStateTracker,
};

pub use versioning::VersionCounter;
