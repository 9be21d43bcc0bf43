use crate::topology::{
    ChildPolicy, ExclusionSet, HostGroupTable, Node, NodeClass, StoragePolicy, StoragePolicyGroup,
    SubPolicy, Topology, WeightSpecification,
};
use crate::toporing::RingTreeRecipe;
use std::sync::Arc;

pub(crate) const DC_POLICY: &str = "dc_policy";
pub(crate) const RACK_POLICY: &str = "rack_policy";
pub(crate) const REGION_POLICY: &str = "region_policy";
pub(crate) const SITE_POLICY: &str = "site_policy";

pub(crate) fn topology() -> Topology {
    Topology::new(Node::intermediate(
        "dc1",
        NodeClass::Datacenter,
        vec![
            Node::intermediate(
                "rack1",
                NodeClass::Rack,
                vec![Node::server("s1"), Node::server("s2"), Node::server("s3")],
            ),
            Node::intermediate(
                "rack2",
                NodeClass::Rack,
                vec![Node::server("s4"), Node::server("s5"), Node::server("s6")],
            ),
            Node::intermediate(
                "rack3",
                NodeClass::Rack,
                vec![Node::server("s7"), Node::server("s8")],
            ),
        ],
    ))
    .unwrap()
}

pub(crate) fn policy_group() -> StoragePolicyGroup {
    StoragePolicyGroup::new()
        .with_policy(
            StoragePolicy::new(
                DC_POLICY,
                NodeClass::Datacenter,
                SubPolicy::new(2).with_child_policy(ChildPolicy::new(NodeClass::Rack, RACK_POLICY)),
            )
            .with_secondary(
                SubPolicy::new(1).with_child_policy(ChildPolicy::new(NodeClass::Rack, RACK_POLICY)),
            ),
        )
        .with_policy(
            StoragePolicy::new(RACK_POLICY, NodeClass::Rack, SubPolicy::new(1))
                .with_secondary(SubPolicy::new(1)),
        )
}

pub(crate) fn host_groups() -> HostGroupTable {
    HostGroupTable::new()
        .with_group("east", ["s1", "s2", "s3", "s4", "s5", "s6"])
        .with_group("west", ["s7", "s8"])
}

/// Recipe over the whole fixture topology, every host group selected.
pub(crate) fn recipe() -> RingTreeRecipe {
    RingTreeRecipe::new(Arc::new(topology()), "dc1", Arc::new(policy_group()), DC_POLICY)
        .unwrap()
        .with_host_groups(host_groups(), ["east", "west"])
        .unwrap()
        .with_config_version(1)
        .with_creation_time(1_000)
}

/// Three levels of rings below `r`: region, datacenters, racks.
pub(crate) fn deep_topology() -> Topology {
    Topology::new(Node::intermediate(
        "r",
        NodeClass::Region,
        vec![
            Node::intermediate(
                "dc1",
                NodeClass::Datacenter,
                vec![
                    Node::intermediate("rackA", NodeClass::Rack, vec![Node::server("s1"), Node::server("s2")]),
                    Node::intermediate("rackB", NodeClass::Rack, vec![Node::server("s3"), Node::server("s4")]),
                ],
            ),
            Node::intermediate(
                "dc2",
                NodeClass::Datacenter,
                vec![Node::intermediate(
                    "rackC",
                    NodeClass::Rack,
                    vec![Node::server("s5"), Node::server("s6")],
                )],
            ),
        ],
    ))
    .unwrap()
}

pub(crate) fn deep_policy_group() -> StoragePolicyGroup {
    let sites = || SubPolicy::new(1).with_child_policy(ChildPolicy::new(NodeClass::Datacenter, SITE_POLICY));
    let racks = || SubPolicy::new(1).with_child_policy(ChildPolicy::new(NodeClass::Rack, RACK_POLICY));
    StoragePolicyGroup::new()
        .with_policy(StoragePolicy::new(REGION_POLICY, NodeClass::Region, sites()).with_secondary(sites()))
        .with_policy(StoragePolicy::new(SITE_POLICY, NodeClass::Datacenter, racks()).with_secondary(racks()))
        .with_policy(
            StoragePolicy::new(RACK_POLICY, NodeClass::Rack, SubPolicy::new(1))
                .with_secondary(SubPolicy::new(1)),
        )
}

/// Recipe rooted at `r` over [`deep_topology`].
pub(crate) fn deep_recipe() -> RingTreeRecipe {
    RingTreeRecipe::new(Arc::new(deep_topology()), "r", Arc::new(deep_policy_group()), REGION_POLICY)
        .unwrap()
        .with_config_version(1)
        .with_creation_time(1_000)
}

pub(crate) fn excluding(ids: &[&str]) -> ExclusionSet {
    ids.iter().copied().collect()
}

pub(crate) fn weights(pairs: &[(&str, f64)]) -> WeightSpecification {
    let mut weights = WeightSpecification::new();
    for (id, weight) in pairs {
        weights.set_weight(*id, *weight).unwrap();
    }
    weights
}
