//! Host groups scope which servers take part in a ring tree.

use crate::error::{Error, Result};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Named sets of servers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostGroupTable {
    groups: BTreeMap<String, BTreeSet<NodeId>>,
}

impl HostGroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group<I, S>(mut self, name: impl Into<String>, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.groups
            .entry(name.into())
            .or_default()
            .extend(servers.into_iter().map(Into::into));
        self
    }

    pub fn group(&self, name: &str) -> Option<&BTreeSet<NodeId>> {
        self.groups.get(name)
    }

    /// Union of the servers in the named groups.
    ///
    /// Unknown group names are an error so a typo cannot silently empty
    /// the build scope.
    pub fn servers_in<'a, I>(&self, names: I) -> Result<HashSet<NodeId>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut servers = HashSet::new();
        for name in names {
            let group = self
                .groups
                .get(name)
                .ok_or_else(|| Error::Config(format!("unknown host group: {}", name)))?;
            servers.extend(group.iter().cloned());
        }
        Ok(servers)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_servers_in_union() {
        let table = HostGroupTable::new()
            .with_group("a", ["s1", "s2"])
            .with_group("b", ["s2", "s3"]);
        let names = vec!["a".to_string(), "b".to_string()];
        let servers = table.servers_in(&names).unwrap();
        assert_eq!(servers.len(), 3);
        assert!(servers.contains("s3"));
    }

    #[test]
    fn test_unknown_group_rejected() {
        let table = HostGroupTable::new().with_group("a", ["s1"]);
        let names = vec!["nope".to_string()];
        assert!(matches!(table.servers_in(&names), Err(Error::Config(_))));
    }
}
