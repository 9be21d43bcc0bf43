//! Inputs for one ring tree build.

use crate::error::Result;
use crate::partitioning::{PartitionMember, RingRegion};
use crate::topology::{
    ExclusionSet, HostGroupTable, Node, StoragePolicy, StoragePolicyGroup, Topology,
    WeightSpecification,
};
use crate::types::{current_time_millis, NodeId};
use std::collections::HashSet;
use std::sync::Arc;

/// Everything a ring tree build reads, narrowed to one subtree.
///
/// Cloning is cheap; the large inputs are shared.
#[derive(Debug, Clone)]
pub struct RingTreeRecipe {
    topology: Arc<Topology>,
    ring_parent: NodeId,
    weights: Arc<WeightSpecification>,
    exclusions: Arc<ExclusionSet>,
    policy_group: Arc<StoragePolicyGroup>,
    policy_name: String,
    host_group_table: Arc<HostGroupTable>,
    host_groups: Vec<String>,
    /// Servers of the selected host groups. `None` puts every server in scope.
    scope: Option<Arc<HashSet<NodeId>>>,
    config_version: u64,
    creation_time: u64,
    region: RingRegion,
}

impl RingTreeRecipe {
    /// Create a recipe rooted at `ring_parent` using policy `policy_name`.
    ///
    /// Both must exist. Weights default to 1.0, nothing is excluded and
    /// every server is in scope until the `with_*` methods say otherwise.
    pub fn new(
        topology: Arc<Topology>,
        ring_parent: impl Into<NodeId>,
        policy_group: Arc<StoragePolicyGroup>,
        policy_name: impl Into<String>,
    ) -> Result<Self> {
        let ring_parent = ring_parent.into();
        let policy_name = policy_name.into();
        topology.node(&ring_parent)?;
        policy_group.policy(&policy_name)?;

        Ok(Self {
            topology,
            ring_parent,
            weights: Arc::new(WeightSpecification::default()),
            exclusions: Arc::new(ExclusionSet::default()),
            policy_group,
            policy_name,
            host_group_table: Arc::new(HostGroupTable::default()),
            host_groups: Vec::new(),
            scope: None,
            config_version: 0,
            creation_time: current_time_millis(),
            region: RingRegion::full(),
        })
    }

    pub fn with_weights(mut self, weights: WeightSpecification) -> Self {
        self.weights = Arc::new(weights);
        self
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionSet) -> Self {
        self.exclusions = Arc::new(exclusions);
        self
    }

    /// Restrict the build to the servers of the named host groups.
    pub fn with_host_groups<I, S>(mut self, table: HostGroupTable, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let servers = table.servers_in(&names)?;
        self.host_group_table = Arc::new(table);
        self.host_groups = names;
        self.scope = Some(Arc::new(servers));
        Ok(self)
    }

    pub fn with_config_version(mut self, version: u64) -> Self {
        self.config_version = version;
        self
    }

    pub fn with_creation_time(mut self, creation_time: u64) -> Self {
        self.creation_time = creation_time;
        self
    }

    /// Partition a sub-range of the identifier space instead of all of it.
    pub fn with_region(mut self, region: RingRegion) -> Self {
        self.region = region;
        self
    }

    /// The same recipe rooted at `child` with policy `policy_name`.
    pub fn for_child(&self, child: &Node, policy_name: &str) -> Self {
        Self {
            ring_parent: child.id().clone(),
            policy_name: policy_name.to_string(),
            ..self.clone()
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn ring_parent(&self) -> &NodeId {
        &self.ring_parent
    }

    pub fn weights(&self) -> &WeightSpecification {
        &self.weights
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    /// The policy in effect at this recipe's ring parent.
    pub fn storage_policy(&self) -> Result<&StoragePolicy> {
        self.policy_group.policy(&self.policy_name)
    }

    pub fn host_group_table(&self) -> &HostGroupTable {
        &self.host_group_table
    }

    pub fn host_groups(&self) -> &[String] {
        &self.host_groups
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

    /// Whether a server belongs to the selected host groups.
    pub fn in_scope(&self, server: &str) -> bool {
        self.scope.as_ref().map_or(true, |scope| scope.contains(server))
    }

    /// Whether an in-scope server is reachable from `node` without passing
    /// through an excluded node of any class.
    pub fn has_descendant_in_scope(&self, node: &Node) -> bool {
        node.any_server_path(&|n| !self.exclusions.is_excluded(n.id()), &|id| self.in_scope(id))
    }

    /// Whether `node` may own regions of its parent's ring.
    ///
    /// It must not be excluded and must lead to at least one in-scope server
    /// along a path free of excluded racks, datacenters or servers.
    pub fn is_eligible(&self, node: &Node) -> bool {
        self.has_descendant_in_scope(node)
    }

    /// Eligible children of `node` with their weights, in topology order.
    pub fn members_of(&self, node: &Node) -> Vec<PartitionMember> {
        node.children()
            .iter()
            .filter(|child| self.is_eligible(child))
            .map(|child| PartitionMember::new(child.id().clone(), self.weights.weight(child.id())))
            .collect()
    }
}
