//! Identifiers for one version of a named ring.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Identity of a named ring, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RingId(u64);

impl RingId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Hash a ring name into its id.
    pub fn from_name(name: &str) -> Self {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(name.as_bytes());
        Self(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A ring id plus its (config version, instance version).
///
/// Only versions of the same ring are ordered; `partial_cmp` across rings
/// is `None` and [`try_cmp`](Self::try_cmp) fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RingIdAndVersionPair {
    pub ring_id: RingId,
    pub config_version: u64,
    pub instance_version: u64,
}

impl RingIdAndVersionPair {
    pub fn new(ring_id: RingId, config_version: u64, instance_version: u64) -> Self {
        Self {
            ring_id,
            config_version,
            instance_version,
        }
    }

    pub fn from_name_and_versions(name: &str, config_version: u64, instance_version: u64) -> Self {
        Self::new(RingId::from_name(name), config_version, instance_version)
    }

    /// The (config, instance) version pair.
    pub fn version(&self) -> (u64, u64) {
        (self.config_version, self.instance_version)
    }

    /// Order two versions of the same ring.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering> {
        self.partial_cmp(other).ok_or_else(|| Error::Incomparable {
            left: self.to_string(),
            right: other.to_string(),
        })
    }
}

impl PartialOrd for RingIdAndVersionPair {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.ring_id != other.ring_id {
            return None;
        }
        Some(self.version().cmp(&other.version()))
    }
}

impl std::fmt::Display for RingIdAndVersionPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.ring_id, self.config_version, self.instance_version
        )
    }
}
