//! Partitioning of the ring identifier space.
//!
//! Each interior topology node owns a [`RingRegion`] of the 64-bit identifier
//! space and splits it among its children with a weighted partitioner. The
//! result is a [`TopologyRing`]. Flattening the rings of a whole tree down to
//! servers yields a [`ResolvedReplicaMap`].
//!
//! # Architecture
//!
//! ```text
//!   region [0, 2^64)  at dc1
//!   ┌──────────────┬──────────────┬──────────────┐
//!   │    rack1     │    rack2     │    rack3     │   TopologyRing(dc1)
//!   └──────────────┴──────────────┴──────────────┘
//!   ┌────┬────┬────┐
//!   │ s1 │ s2 │ s3 │                                TopologyRing(rack1)
//!   └────┴────┴────┘
//!
//!   key "user:123" → xxHash64 → coordinate → rack1 → s2
//! ```

mod ownership;
mod partitioner;
mod region;
mod ring;

pub use ownership::{OwnershipChange, OwnershipRole, Owners, ResolvedReplicaMap};
pub use partitioner::{partition, try_partition, PartitionError, PartitionInput, PartitionMember};
pub use region::{coordinate_of, RingRegion, RING_SIZE};
pub use ring::{RingEntry, TopologyRing};

pub(crate) use ownership::overlay;
