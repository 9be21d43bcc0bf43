//! Per-node rings: which children own which regions of the identifier space.
//!
//! A [`TopologyRing`] is immutable once built. Its entries are sorted by
//! start position, never overlap, and exactly cover the ring's region.

use crate::error::{Error, Result};
use crate::partitioning::ownership::OwnershipRole;
use crate::partitioning::region::RingRegion;
use crate::topology::ExclusionSet;
use crate::types::{NodeId, OwnerQueryMode, RingCoordinate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Owners of one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingEntry {
    pub region: RingRegion,
    /// Primary owners, in replica order.
    pub primary_owners: Vec<NodeId>,
    /// Secondary owners, in preference order.
    pub secondary_owners: Vec<NodeId>,
}

impl RingEntry {
    pub fn new(region: RingRegion, primary_owners: Vec<NodeId>, secondary_owners: Vec<NodeId>) -> Self {
        Self {
            region,
            primary_owners,
            secondary_owners,
        }
    }

    /// Owners for a query mode. `All` lists primaries first.
    pub fn owners(&self, mode: OwnerQueryMode) -> Vec<&NodeId> {
        let mut owners = Vec::new();
        if mode.includes_primary() {
            owners.extend(self.primary_owners.iter());
        }
        if mode.includes_secondary() {
            owners.extend(self.secondary_owners.iter());
        }
        owners
    }

    pub fn is_owner(&self, id: &str) -> bool {
        self.role(id) != OwnershipRole::None
    }

    pub fn role(&self, id: &str) -> OwnershipRole {
        if self.primary_owners.iter().any(|o| o == id) {
            OwnershipRole::Primary
        } else if self.secondary_owners.iter().any(|o| o == id) {
            OwnershipRole::Secondary
        } else {
            OwnershipRole::None
        }
    }

    fn same_owners(&self, other: &RingEntry) -> bool {
        self.primary_owners == other.primary_owners
            && self.secondary_owners == other.secondary_owners
    }
}

impl std::fmt::Display for RingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} primary={:?} secondary={:?}",
            self.region, self.primary_owners, self.secondary_owners
        )
    }
}

/// Sort entries and merge neighbours with identical owner lists.
pub(crate) fn coalesce(mut entries: Vec<RingEntry>) -> Vec<RingEntry> {
    entries.sort_by(|a, b| a.region.cmp(&b.region));
    let mut merged: Vec<RingEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(last) = merged.last_mut() {
            if last.same_owners(&entry)
                && last.region.end().checked_add(1) == Some(entry.region.start())
            {
                last.region = RingRegion::new(last.region.start(), entry.region.end())
                    .unwrap_or(last.region);
                continue;
            }
        }
        merged.push(entry);
    }
    merged
}

/// Check that `entries` are sorted, contiguous and cover exactly `region`.
pub(crate) fn check_coverage(region: &RingRegion, entries: &[RingEntry]) -> Result<()> {
    let first = entries
        .first()
        .ok_or_else(|| Error::InvalidRing("ring has no entries".to_string()))?;
    if first.region.start() != region.start() {
        return Err(Error::InvalidRing(format!(
            "first entry {} does not start the ring region {}",
            first.region, region
        )));
    }
    for pair in entries.windows(2) {
        if pair[0].region.end().checked_add(1) != Some(pair[1].region.start()) {
            return Err(Error::InvalidRing(format!(
                "entries {} and {} are not contiguous",
                pair[0].region, pair[1].region
            )));
        }
    }
    let last = &entries[entries.len() - 1];
    if last.region.end() != region.end() {
        return Err(Error::InvalidRing(format!(
            "last entry {} does not end the ring region {}",
            last.region, region
        )));
    }
    Ok(())
}

/// Binary search for the entry covering `coordinate`.
pub(crate) fn find_entry(entries: &[RingEntry], coordinate: RingCoordinate) -> Option<&RingEntry> {
    let idx = entries.partition_point(|e| e.region.end() < coordinate);
    entries.get(idx).filter(|e| e.region.contains(coordinate))
}

/// The regions of one topology node's identifier space, owned by its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyRing {
    /// Node whose children own this ring.
    node_id: NodeId,
    /// Storage policy the ring was built with.
    storage_policy_name: String,
    /// Identifier space covered.
    region: RingRegion,
    /// Effective primary replica count per region.
    primary_replicas: usize,
    /// Effective secondary replica count per region.
    secondary_replicas: usize,
    /// Tolerance the successful partitioning attempt used.
    magnitude_tolerance: f64,
    entries: Vec<RingEntry>,
}

impl TopologyRing {
    /// Build a ring, validating coverage and owner lists.
    pub fn new(
        node_id: impl Into<NodeId>,
        storage_policy_name: impl Into<String>,
        region: RingRegion,
        primary_replicas: usize,
        secondary_replicas: usize,
        magnitude_tolerance: f64,
        entries: Vec<RingEntry>,
    ) -> Result<Self> {
        let entries = coalesce(entries);
        check_coverage(&region, &entries)?;
        for entry in &entries {
            if entry.primary_owners.is_empty() {
                return Err(Error::InvalidRing(format!(
                    "region {} has no primary owner",
                    entry.region
                )));
            }
            let distinct: BTreeSet<&NodeId> = entry.primary_owners.iter().collect();
            if distinct.len() != entry.primary_owners.len() {
                return Err(Error::InvalidRing(format!(
                    "region {} lists a primary owner twice",
                    entry.region
                )));
            }
        }
        Ok(Self {
            node_id: node_id.into(),
            storage_policy_name: storage_policy_name.into(),
            region,
            primary_replicas,
            secondary_replicas,
            magnitude_tolerance,
            entries,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn storage_policy_name(&self) -> &str {
        &self.storage_policy_name
    }

    pub fn region(&self) -> RingRegion {
        self.region
    }

    pub fn primary_replicas(&self) -> usize {
        self.primary_replicas
    }

    pub fn secondary_replicas(&self) -> usize {
        self.secondary_replicas
    }

    pub fn magnitude_tolerance(&self) -> f64 {
        self.magnitude_tolerance
    }

    pub fn entries(&self) -> &[RingEntry] {
        &self.entries
    }

    /// The entry covering a coordinate.
    pub fn entry_at(&self, coordinate: RingCoordinate) -> Option<&RingEntry> {
        find_entry(&self.entries, coordinate)
    }

    /// Owners of the region covering a coordinate.
    pub fn owners_at(&self, coordinate: RingCoordinate, mode: OwnerQueryMode) -> Vec<&NodeId> {
        self.entry_at(coordinate)
            .map(|e| e.owners(mode))
            .unwrap_or_default()
    }

    /// Entries overlapping `region`, in order.
    pub fn entries_overlapping<'a>(&'a self, region: &'a RingRegion) -> impl Iterator<Item = &'a RingEntry> + 'a {
        let idx = self.entries.partition_point(|e| e.region.end() < region.start());
        self.entries[idx..]
            .iter()
            .take_while(move |e| e.region.start() <= region.end())
    }

    /// Every child owning at least one region, sorted.
    pub fn members(&self) -> BTreeSet<&NodeId> {
        self.entries
            .iter()
            .flat_map(|e| e.primary_owners.iter().chain(e.secondary_owners.iter()))
            .collect()
    }

    /// Total size of the regions a child owns in the given role(s).
    pub fn owned_size(&self, id: &str, mode: OwnerQueryMode) -> u128 {
        self.entries
            .iter()
            .filter(|e| e.owners(mode).iter().any(|o| o.as_str() == id))
            .map(|e| e.region.size())
            .sum()
    }

    /// Share of the ring's primary replica capacity held by a child.
    pub fn primary_share(&self, id: &str) -> f64 {
        let capacity = self.region.size() as f64 * self.primary_replicas.max(1) as f64;
        self.owned_size(id, OwnerQueryMode::Primary) as f64 / capacity
    }

    /// Number of regions a child appears in for the given role(s).
    pub fn region_count(&self, id: &str, mode: OwnerQueryMode) -> usize {
        self.entries
            .iter()
            .filter(|e| e.owners(mode).iter().any(|o| o.as_str() == id))
            .count()
    }

    /// A copy of this ring with excluded nodes struck from every owner list.
    ///
    /// Fails if a region would be left without a primary owner.
    pub fn without_excluded(&self, exclusions: &ExclusionSet) -> Result<TopologyRing> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let primary_owners = exclusions.filter(&entry.primary_owners);
            if primary_owners.is_empty() {
                return Err(Error::InvalidRing(format!(
                    "ring {}: excluding {:?} leaves region {} without a primary owner",
                    self.node_id, entry.primary_owners, entry.region
                )));
            }
            entries.push(RingEntry::new(
                entry.region,
                primary_owners,
                exclusions.filter(&entry.secondary_owners),
            ));
        }
        TopologyRing::new(
            self.node_id.clone(),
            self.storage_policy_name.clone(),
            self.region,
            self.primary_replicas,
            self.secondary_replicas,
            self.magnitude_tolerance,
            entries,
        )
    }
}

impl std::fmt::Display for TopologyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "ring {} policy={} primary={} secondary={} tolerance={:e}",
            self.node_id,
            self.storage_policy_name,
            self.primary_replicas,
            self.secondary_replicas,
            self.magnitude_tolerance
        )?;
        for entry in &self.entries {
            writeln!(f, "  {}", entry)?;
        }
        Ok(())
    }
}
