//! Storage policies: per-level replica counts and the sub-policies that
//! apply further down the topology.

use crate::error::{Error, Result};
use crate::topology::{Node, NodeClass};
use crate::types::{NodeId, OwnerQueryMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Names the policy used for children of a given class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildPolicy {
    /// Class of the children this rule applies to.
    pub node_class: NodeClass,
    /// Policy used when recursing into a matching child.
    pub policy_name: String,
    /// Restricts the rule to these child ids when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ids: Option<BTreeSet<NodeId>>,
}

impl ChildPolicy {
    pub fn new(node_class: NodeClass, policy_name: impl Into<String>) -> Self {
        Self {
            node_class,
            policy_name: policy_name.into(),
            node_ids: None,
        }
    }

    /// Restrict the rule to specific child ids.
    pub fn with_node_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.node_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    fn applies_to(&self, node_class: NodeClass, child: &Node) -> bool {
        self.node_class == node_class
            && self
                .node_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(child.id()))
    }
}

/// One replica role of a storage policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPolicy {
    /// Number of children that own each region in this role.
    pub replicas: u32,
    /// Policies for the next level down.
    #[serde(default)]
    pub children: Vec<ChildPolicy>,
}

impl SubPolicy {
    pub fn new(replicas: u32) -> Self {
        Self {
            replicas,
            children: Vec::new(),
        }
    }

    pub fn with_child_policy(mut self, child: ChildPolicy) -> Self {
        self.children.push(child);
        self
    }

    /// Names of the policies that apply to `child`, in declaration order.
    pub fn sub_policy_names_for(&self, node_class: NodeClass, child: &Node) -> Vec<String> {
        self.children
            .iter()
            .filter(|c| c.applies_to(node_class, child))
            .map(|c| c.policy_name.clone())
            .collect()
    }
}

/// Replication rules for one topology level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePolicy {
    pub name: String,
    /// Class of node this policy is bound to.
    pub node_class: NodeClass,
    pub primary: SubPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<SubPolicy>,
}

impl StoragePolicy {
    pub fn new(name: impl Into<String>, node_class: NodeClass, primary: SubPolicy) -> Self {
        Self {
            name: name.into(),
            node_class,
            primary,
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: SubPolicy) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Replica count for a single role.
    ///
    /// `All` is not a role and is rejected; use [`total_replicas`](Self::total_replicas).
    pub fn replicas(&self, mode: OwnerQueryMode) -> Result<u32> {
        match mode {
            OwnerQueryMode::Primary => Ok(self.primary.replicas),
            OwnerQueryMode::Secondary => Ok(self.secondary.as_ref().map_or(0, |s| s.replicas)),
            OwnerQueryMode::All => Err(Error::Policy(format!(
                "policy {}: replica count requires a single role, not {}",
                self.name, mode
            ))),
        }
    }

    /// Primary plus secondary replicas.
    pub fn total_replicas(&self) -> u32 {
        self.primary.replicas + self.secondary.as_ref().map_or(0, |s| s.replicas)
    }

    /// The sub-policy for a single role.
    pub fn sub_policy(&self, mode: OwnerQueryMode) -> Result<Option<&SubPolicy>> {
        match mode {
            OwnerQueryMode::Primary => Ok(Some(&self.primary)),
            OwnerQueryMode::Secondary => Ok(self.secondary.as_ref()),
            OwnerQueryMode::All => Err(Error::Policy(format!(
                "policy {}: sub-policy lookup requires a single role",
                self.name
            ))),
        }
    }

    fn sub_policies(&self) -> impl Iterator<Item = &SubPolicy> {
        std::iter::once(&self.primary).chain(self.secondary.iter())
    }

    /// Names of the policies applicable to `child`, primary rules first,
    /// without duplicates.
    pub fn sub_policy_names_for(&self, node_class: NodeClass, child: &Node) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self
            .sub_policies()
            .flat_map(|p| p.sub_policy_names_for(node_class, child))
        {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

impl std::fmt::Display for StoragePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} primary={} secondary={}",
            self.node_class,
            self.name,
            self.primary.replicas,
            self.secondary.as_ref().map_or(0, |s| s.replicas)
        )
    }
}

/// A named collection of storage policies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<StoragePolicy>", into = "Vec<StoragePolicy>")]
pub struct StoragePolicyGroup {
    policies: HashMap<String, StoragePolicy>,
}

impl StoragePolicyGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: StoragePolicy) -> Self {
        self.insert(policy);
        self
    }

    pub fn insert(&mut self, policy: StoragePolicy) {
        self.policies.insert(policy.name.clone(), policy);
    }

    /// Look up a policy by name.
    pub fn policy(&self, name: &str) -> Result<&StoragePolicy> {
        self.policies
            .get(name)
            .ok_or_else(|| Error::PolicyNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl From<Vec<StoragePolicy>> for StoragePolicyGroup {
    fn from(policies: Vec<StoragePolicy>) -> Self {
        let mut group = StoragePolicyGroup::new();
        for policy in policies {
            group.insert(policy);
        }
        group
    }
}

impl From<StoragePolicyGroup> for Vec<StoragePolicy> {
    fn from(group: StoragePolicyGroup) -> Self {
        let mut policies: Vec<StoragePolicy> = group.policies.into_values().collect();
        policies.sort_by(|a, b| a.name.cmp(&b.name));
        policies
    }
}
