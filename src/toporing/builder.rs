//! Recursive construction of ring trees.

use crate::config::RingBuildConfig;
use crate::error::{Error, Result};
use crate::partitioning::{partition, PartitionInput, TopologyRing};
use crate::topology::Node;
use crate::toporing::recipe::RingTreeRecipe;
use crate::toporing::tree::RingTree;
use crate::types::{NodeId, OwnerQueryMode};
use dashmap::DashMap;
use std::sync::Arc;

type RingMap = DashMap<NodeId, Arc<TopologyRing>>;

/// Builds a [`RingTree`] from a [`RingTreeRecipe`].
///
/// A ring is built at every node below the recipe's ring parent that has
/// children and an in-scope server below it. Server nodes are never
/// expanded. Any failing node aborts the whole build.
#[derive(Debug, Clone)]
pub struct RingTreeBuilder {
    config: RingBuildConfig,
}

impl RingTreeBuilder {
    pub fn new(config: RingBuildConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RingBuildConfig {
        &self.config
    }

    /// Build a tree, seeding each node from `prior` when given.
    ///
    /// Runs [`build_parallel`](Self::build_parallel) when the config asks for it.
    pub fn build(&self, recipe: &RingTreeRecipe, prior: Option<&RingTree>) -> Result<RingTree> {
        if self.config.parallel {
            self.build_parallel(recipe, prior)
        } else {
            self.build_sequential(recipe, prior)
        }
    }

    /// Build the whole tree on the calling thread.
    pub fn build_sequential(&self, recipe: &RingTreeRecipe, prior: Option<&RingTree>) -> Result<RingTree> {
        let root = recipe.topology().node(recipe.ring_parent())?.clone();
        tracing::info!(
            ring_parent = %recipe.ring_parent(),
            policy = %recipe.policy_name(),
            incremental = prior.is_some(),
            "Building ring tree"
        );

        let maps = RingMap::new();
        self.build_subtree(&root, recipe, prior, &maps)?;
        Ok(self.finish(recipe, maps))
    }

    /// Build each child subtree of the ring parent on its own thread.
    ///
    /// Produces the same tree as [`build_sequential`](Self::build_sequential).
    pub fn build_parallel(&self, recipe: &RingTreeRecipe, prior: Option<&RingTree>) -> Result<RingTree> {
        let root = recipe.topology().node(recipe.ring_parent())?.clone();
        tracing::info!(
            ring_parent = %recipe.ring_parent(),
            policy = %recipe.policy_name(),
            incremental = prior.is_some(),
            "Building ring tree in parallel"
        );

        let maps = RingMap::new();
        if self.should_build(&root, recipe) {
            let ring = self.build_node(&root, recipe, prior)?;
            maps.insert(root.id().clone(), Arc::new(ring));

            let subtrees = self.child_recipes(&root, recipe)?;
            let shared = &maps;
            std::thread::scope(|scope| {
                let handles: Vec<_> = subtrees
                    .iter()
                    .map(|(child, child_recipe)| {
                        let handle = scope.spawn(move || self.build_subtree(child, child_recipe, prior, shared));
                        (child.id(), handle)
                    })
                    .collect();

                // Join everything, then report the first failure in child order.
                let mut first_error: Option<Error> = None;
                for (child_id, handle) in handles {
                    let outcome = handle.join().unwrap_or_else(|_| {
                        Err(Error::StructuralBuild {
                            node: child_id.clone(),
                            reason: "subtree build panicked".to_string(),
                        })
                    });
                    if let Err(e) = outcome {
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(()), Err)
            })?;
        }
        Ok(self.finish(recipe, maps))
    }

    fn finish(&self, recipe: &RingTreeRecipe, maps: RingMap) -> RingTree {
        let tree = RingTree::new(
            recipe.topology().clone(),
            recipe.ring_parent().clone(),
            maps.into_iter().collect(),
            recipe.config_version(),
            recipe.creation_time(),
            recipe.region(),
        );
        tracing::info!(
            ring_parent = %tree.ring_parent(),
            rings = tree.len(),
            version = tree.config_version(),
            "Built ring tree"
        );
        tree
    }

    fn should_build(&self, node: &Node, recipe: &RingTreeRecipe) -> bool {
        !node.children().is_empty() && recipe.has_descendant_in_scope(node)
    }

    fn build_subtree(
        &self,
        node: &Arc<Node>,
        recipe: &RingTreeRecipe,
        prior: Option<&RingTree>,
        maps: &RingMap,
    ) -> Result<()> {
        if !self.should_build(node, recipe) {
            return Ok(());
        }
        let ring = self.build_node(node, recipe, prior)?;
        maps.insert(node.id().clone(), Arc::new(ring));

        for (child, child_recipe) in self.child_recipes(node, recipe)? {
            self.build_subtree(child, &child_recipe, prior, maps)?;
        }
        Ok(())
    }

    /// Non-server children worth expanding, each with its narrowed recipe.
    fn child_recipes<'a>(
        &self,
        node: &'a Node,
        recipe: &RingTreeRecipe,
    ) -> Result<Vec<(&'a Arc<Node>, RingTreeRecipe)>> {
        let policy = recipe.storage_policy()?;
        let mut children = Vec::new();
        for child in node.children() {
            if child.is_server() || !recipe.is_eligible(child) {
                continue;
            }
            let names = policy.sub_policy_names_for(child.class(), child);
            match names.split_first() {
                None => {
                    tracing::debug!(
                        node_id = %child.id(),
                        policy = %policy.name,
                        "No sub-policy applies, not expanding"
                    );
                }
                Some((first, rest)) => {
                    if !rest.is_empty() {
                        tracing::warn!(
                            node_id = %child.id(),
                            chosen = %first,
                            ignored = ?rest,
                            "Several sub-policies apply, using the first"
                        );
                    }
                    children.push((child, recipe.for_child(child, first)));
                }
            }
        }
        Ok(children)
    }

    fn build_node(&self, node: &Node, recipe: &RingTreeRecipe, prior: Option<&RingTree>) -> Result<TopologyRing> {
        let policy = recipe.storage_policy()?;
        let input = PartitionInput {
            node_id: node.id().clone(),
            storage_policy_name: policy.name.clone(),
            region: recipe.region(),
            members: recipe.members_of(node),
            primary_replicas: policy.replicas(OwnerQueryMode::Primary)?,
            secondary_replicas: policy.replicas(OwnerQueryMode::Secondary)?,
        };

        let prior_ring = prior.and_then(|tree| {
            let ring = tree.ring(node.id());
            if ring.is_none() {
                tracing::debug!(node_id = %node.id(), "No prior ring, partitioning fresh");
            }
            ring
        });
        partition(&input, prior_ring.map(|ring| &**ring), &self.config)
    }
}
