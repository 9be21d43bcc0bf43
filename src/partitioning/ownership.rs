//! Server-level ownership and ownership changes between ring trees.
//!
//! A [`ResolvedReplicaMap`] is a ring tree flattened down to servers: for
//! every region it lists the primary and secondary servers. Comparing two
//! maps yields the [`OwnershipChange`]s a convergence has to carry out.

use crate::error::{Error, Result};
use crate::partitioning::region::RingRegion;
use crate::partitioning::ring::{check_coverage, coalesce, find_entry, RingEntry};
use crate::types::{NodeId, OwnerQueryMode, RingCoordinate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role of a node for a specific region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnershipRole {
    /// Primary owner - serves reads and writes for the region.
    Primary,
    /// Secondary owner - holds a replica for fault tolerance.
    Secondary,
    /// Not an owner.
    None,
}

/// Push `id` unless already present.
fn push_unique(list: &mut Vec<NodeId>, id: &NodeId) {
    if !list.contains(id) {
        list.push(id.clone());
    }
}

/// Overlay several entry lists covering `region` and union their owners.
///
/// Each list must cover `region` without gaps. The result is split at every
/// breakpoint of every list; a server listed as primary anywhere is dropped
/// from the secondaries of the same region.
pub(crate) fn overlay(region: &RingRegion, lists: &[Vec<RingEntry>]) -> Vec<RingEntry> {
    let mut starts: BTreeSet<RingCoordinate> = BTreeSet::new();
    starts.insert(region.start());
    for list in lists {
        for entry in list {
            if region.contains(entry.region.start()) {
                starts.insert(entry.region.start());
            }
        }
    }

    let starts: Vec<RingCoordinate> = starts.into_iter().collect();
    let mut entries = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = match starts.get(i + 1) {
            Some(next) => next - 1,
            None => region.end(),
        };
        let mut primary = Vec::new();
        let mut secondary = Vec::new();
        for list in lists {
            if let Some(entry) = find_entry(list, start) {
                entry.primary_owners.iter().for_each(|o| push_unique(&mut primary, o));
                entry.secondary_owners.iter().for_each(|o| push_unique(&mut secondary, o));
            }
        }
        secondary.retain(|o| !primary.contains(o));
        if let Ok(sub) = RingRegion::new(start, end) {
            entries.push(RingEntry::new(sub, primary, secondary));
        }
    }
    coalesce(entries)
}

/// A ring tree resolved down to server owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReplicaMap {
    region: RingRegion,
    entries: Vec<RingEntry>,
}

impl ResolvedReplicaMap {
    /// Build a map from entries that exactly cover `region`.
    pub fn new(region: RingRegion, entries: Vec<RingEntry>) -> Result<Self> {
        let entries = coalesce(entries);
        check_coverage(&region, &entries)?;
        Ok(Self { region, entries })
    }

    pub fn region(&self) -> RingRegion {
        self.region
    }

    pub fn entries(&self) -> &[RingEntry] {
        &self.entries
    }

    pub fn entry_at(&self, coordinate: RingCoordinate) -> Option<&RingEntry> {
        find_entry(&self.entries, coordinate)
    }

    /// Servers owning the region that covers `coordinate`.
    pub fn owners_at(&self, coordinate: RingCoordinate, mode: OwnerQueryMode) -> Vec<NodeId> {
        self.entry_at(coordinate)
            .map(|e| e.owners(mode).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every server that owns anything.
    pub fn servers(&self) -> BTreeSet<&NodeId> {
        self.entries
            .iter()
            .flat_map(|e| e.primary_owners.iter().chain(e.secondary_owners.iter()))
            .collect()
    }

    /// Total size of the regions a server owns in the given role(s).
    pub fn owned_size(&self, id: &str, mode: OwnerQueryMode) -> u128 {
        self.entries
            .iter()
            .filter(|e| e.owners(mode).iter().any(|o| o.as_str() == id))
            .map(|e| e.region.size())
            .sum()
    }

    /// Role of a server in the region covering `coordinate`.
    pub fn role_at(&self, coordinate: RingCoordinate, id: &str) -> OwnershipRole {
        self.entry_at(coordinate)
            .map_or(OwnershipRole::None, |e| e.role(id))
    }

    /// Regions whose owners differ between `self` (old) and `new`.
    ///
    /// Both maps must cover the same region.
    pub fn ownership_changes(&self, new: &ResolvedReplicaMap) -> Result<Vec<OwnershipChange>> {
        if self.region != new.region {
            return Err(Error::InvalidRing(format!(
                "cannot diff maps over different regions {} and {}",
                self.region, new.region
            )));
        }

        let mut starts: BTreeSet<RingCoordinate> = BTreeSet::new();
        starts.extend(self.entries.iter().map(|e| e.region.start()));
        starts.extend(new.entries.iter().map(|e| e.region.start()));
        let starts: Vec<RingCoordinate> = starts.into_iter().collect();

        let mut changes: Vec<OwnershipChange> = Vec::new();
        for (i, &start) in starts.iter().enumerate() {
            let end = match starts.get(i + 1) {
                Some(next) => next - 1,
                None => self.region.end(),
            };
            let (Some(old_entry), Some(new_entry)) = (self.entry_at(start), new.entry_at(start)) else {
                continue;
            };
            if old_entry.primary_owners == new_entry.primary_owners
                && old_entry.secondary_owners == new_entry.secondary_owners
            {
                continue;
            }
            let region = RingRegion::new(start, end)?;
            let change = OwnershipChange {
                region,
                from: old_entry.clone_owners(),
                to: new_entry.clone_owners(),
            };
            if let Some(last) = changes.last_mut() {
                if last.extends_with(&change) {
                    last.region = RingRegion::new(last.region.start(), end)?;
                    continue;
                }
            }
            changes.push(change);
        }
        Ok(changes)
    }
}

impl RingEntry {
    fn clone_owners(&self) -> Owners {
        Owners {
            primary: self.primary_owners.clone(),
            secondary: self.secondary_owners.clone(),
        }
    }
}

/// Primary and secondary owner lists of a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owners {
    pub primary: Vec<NodeId>,
    pub secondary: Vec<NodeId>,
}

impl Owners {
    pub fn all(&self) -> BTreeSet<&NodeId> {
        self.primary.iter().chain(self.secondary.iter()).collect()
    }
}

/// Represents a change in region ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipChange {
    /// Affected region.
    pub region: RingRegion,
    /// Owners under the old ring tree.
    pub from: Owners,
    /// Owners under the new ring tree.
    pub to: Owners,
}

impl OwnershipChange {
    /// Servers that must receive data for this region.
    pub fn gaining(&self) -> Vec<&NodeId> {
        let old = self.from.all();
        self.to.all().into_iter().filter(|id| !old.contains(id)).collect()
    }

    /// Servers that no longer hold this region.
    pub fn losing(&self) -> Vec<&NodeId> {
        let new = self.to.all();
        self.from.all().into_iter().filter(|id| !new.contains(id)).collect()
    }

    fn extends_with(&self, next: &OwnershipChange) -> bool {
        self.from == next.from
            && self.to == next.to
            && self.region.end().checked_add(1) == Some(next.region.start())
    }
}
