//! The immutable set of rings produced by one build.

use crate::error::{Error, Result};
use crate::partitioning::{
    coordinate_of, overlay, OwnershipChange, Owners, ResolvedReplicaMap, RingEntry, RingRegion,
    TopologyRing,
};
use crate::topology::{ExclusionSet, Topology};
use crate::toporing::feasibility;
use crate::types::{current_time_millis, NodeId, OwnerQueryMode, RingCoordinate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Rings for every built node below a ring parent.
///
/// Never mutated; deriving a variant produces a new tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingTree {
    topology: Arc<Topology>,
    ring_parent: NodeId,
    maps: HashMap<NodeId, Arc<TopologyRing>>,
    config_version: u64,
    creation_time: u64,
    region: RingRegion,
}

impl RingTree {
    pub fn new(
        topology: Arc<Topology>,
        ring_parent: impl Into<NodeId>,
        maps: HashMap<NodeId, Arc<TopologyRing>>,
        config_version: u64,
        creation_time: u64,
        region: RingRegion,
    ) -> Self {
        Self {
            topology,
            ring_parent: ring_parent.into(),
            maps,
            config_version,
            creation_time,
            region,
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn ring_parent(&self) -> &NodeId {
        &self.ring_parent
    }

    pub fn config_version(&self) -> u64 {
        self.config_version
    }

    pub fn creation_time(&self) -> u64 {
        self.creation_time
    }

    pub fn region(&self) -> RingRegion {
        self.region
    }

    /// The ring built at a node, if any.
    pub fn ring(&self, node_id: &str) -> Option<&Arc<TopologyRing>> {
        self.maps.get(node_id)
    }

    /// Ids of the nodes that have a ring, sorted.
    pub fn node_ids(&self) -> Vec<&NodeId> {
        let mut ids: Vec<&NodeId> = self.maps.keys().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    fn ring_for(&self, node_id: &str) -> Result<&Arc<TopologyRing>> {
        self.maps.get(node_id).ok_or_else(|| {
            Error::InvalidRing(format!("node {} owns regions but has no ring", node_id))
        })
    }

    /// Server-level owners of every region below `ring_parent`.
    pub fn resolve(&self, ring_parent: &str) -> Result<ResolvedReplicaMap> {
        let entries = self.resolve_region(ring_parent, self.region)?;
        ResolvedReplicaMap::new(self.region, entries)
    }

    fn resolve_region(&self, node_id: &str, region: RingRegion) -> Result<Vec<RingEntry>> {
        let node = self.topology.node(node_id)?;
        if node.is_server() {
            return Ok(vec![RingEntry::new(region, vec![node.id().clone()], Vec::new())]);
        }

        let ring = self.ring_for(node_id)?;
        let mut resolved = Vec::new();
        for entry in ring.entries_overlapping(&region) {
            let Some(sub) = entry.region.intersection(&region) else {
                continue;
            };
            let mut lists = Vec::with_capacity(entry.primary_owners.len() + entry.secondary_owners.len());
            for child in &entry.primary_owners {
                lists.push(self.resolve_region(child, sub)?);
            }
            for child in &entry.secondary_owners {
                // Everything a secondary child holds is a secondary copy here.
                let demoted = self
                    .resolve_region(child, sub)?
                    .into_iter()
                    .map(|e| {
                        let owners = e.primary_owners.into_iter().chain(e.secondary_owners).collect();
                        RingEntry::new(e.region, Vec::new(), owners)
                    })
                    .collect();
                lists.push(demoted);
            }
            resolved.extend(overlay(&sub, &lists));
        }
        Ok(resolved)
    }

    /// Server-level owners of the region covering one coordinate.
    pub fn owners_at(&self, coordinate: RingCoordinate, mode: OwnerQueryMode) -> Result<Vec<NodeId>> {
        let owners = self.owners_below(&self.ring_parent, coordinate)?;
        let mut result = Vec::new();
        if mode.includes_primary() {
            result.extend(owners.primary);
        }
        if mode.includes_secondary() {
            result.extend(owners.secondary);
        }
        Ok(result)
    }

    /// Server-level owners of a key.
    pub fn owners(&self, key: &[u8], mode: OwnerQueryMode) -> Result<Vec<NodeId>> {
        self.owners_at(coordinate_of(key), mode)
    }

    fn owners_below(&self, node_id: &str, coordinate: RingCoordinate) -> Result<Owners> {
        let node = self.topology.node(node_id)?;
        if node.is_server() {
            return Ok(Owners {
                primary: vec![node.id().clone()],
                secondary: Vec::new(),
            });
        }

        let ring = self.ring_for(node_id)?;
        let entry = ring.entry_at(coordinate).ok_or_else(|| {
            Error::InvalidRing(format!(
                "ring {} does not cover coordinate {:016x}",
                node_id, coordinate
            ))
        })?;

        let mut primary: Vec<NodeId> = Vec::new();
        let mut secondary: Vec<NodeId> = Vec::new();
        for child in &entry.primary_owners {
            let below = self.owners_below(child, coordinate)?;
            extend_unique(&mut primary, below.primary);
            extend_unique(&mut secondary, below.secondary);
        }
        for child in &entry.secondary_owners {
            let below = self.owners_below(child, coordinate)?;
            extend_unique(&mut secondary, below.primary);
            extend_unique(&mut secondary, below.secondary);
        }
        secondary.retain(|id| !primary.contains(id));
        Ok(Owners { primary, secondary })
    }

    /// Regions whose server owners differ between this tree and `new`.
    pub fn ownership_changes(&self, new: &RingTree) -> Result<Vec<OwnershipChange>> {
        let old_map = self.resolve(&self.ring_parent)?;
        let new_map = new.resolve(&new.ring_parent)?;
        old_map.ownership_changes(&new_map)
    }

    /// A copy with excluded nodes struck from every ring.
    ///
    /// Keeps the config version and stamps a fresh creation time. Fails if a
    /// region would lose all of its primary owners.
    pub fn remove_excluded_nodes(&self, exclusions: &ExclusionSet) -> Result<RingTree> {
        let mut maps = HashMap::with_capacity(self.maps.len());
        for (node_id, ring) in &self.maps {
            maps.insert(node_id.clone(), Arc::new(ring.without_excluded(exclusions)?));
        }
        tracing::info!(
            ring_parent = %self.ring_parent,
            excluded = exclusions.len(),
            version = self.config_version,
            "Removed excluded nodes from ring tree"
        );
        Ok(RingTree {
            topology: self.topology.clone(),
            ring_parent: self.ring_parent.clone(),
            maps,
            config_version: self.config_version,
            creation_time: current_time_millis(),
            region: self.region,
        })
    }

    /// Whether excluding `exclusions` still leaves every region below
    /// `ring_parent` a primary owner.
    pub fn check_convergence_feasible(&self, ring_parent: &str, exclusions: &ExclusionSet) -> Result<()> {
        let map = self.resolve(ring_parent)?;
        feasibility::check_convergence_feasible(&map, exclusions)
    }

    /// Snapshot for handing to another participant.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn extend_unique(list: &mut Vec<NodeId>, ids: Vec<NodeId>) {
    for id in ids {
        if !list.contains(&id) {
            list.push(id);
        }
    }
}

impl std::fmt::Display for RingTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "RingTree parent={} version={} created={} rings={}",
            self.ring_parent,
            self.config_version,
            self.creation_time,
            self.maps.len()
        )?;
        for node_id in self.node_ids() {
            write!(f, "{}", self.maps[node_id])?;
        }
        Ok(())
    }
}
