//! Sets of nodes excluded from ownership.

use crate::error::Result;
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Node ids that must not own any region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionSet {
    excluded: BTreeSet<NodeId>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_excluded(mut self, id: impl Into<NodeId>) -> Self {
        self.excluded.insert(id.into());
        self
    }

    pub fn insert(&mut self, id: impl Into<NodeId>) -> bool {
        self.excluded.insert(id.into())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.excluded.remove(id)
    }

    pub fn is_excluded(&self, id: &str) -> bool {
        self.excluded.contains(id)
    }

    /// Keep only non-excluded ids, preserving input order.
    pub fn filter<'a, I>(&self, ids: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        ids.into_iter()
            .filter(|id| !self.is_excluded(id))
            .cloned()
            .collect()
    }

    /// Set containing the ids of both sets.
    pub fn union(&self, other: &ExclusionSet) -> ExclusionSet {
        ExclusionSet {
            excluded: self.excluded.union(&other.excluded).cloned().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.excluded.iter()
    }

    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    /// Parse one id per line; `#` starts a comment.
    pub fn parse_lines(text: &str) -> Result<Self> {
        Ok(text
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty())
            .collect())
    }
}

impl<S: Into<NodeId>> FromIterator<S> for ExclusionSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            excluded: iter.into_iter().map(Into::into).collect(),
        }
    }
}
