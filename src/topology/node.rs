//! Topology tree: servers at the leaves, intermediate classes above them.

use crate::error::{Error, Result};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Class of a topology node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    Server,
    Rack,
    Cabinet,
    Datacenter,
    Region,
    Root,
}

impl NodeClass {
    /// Whether nodes of this class are leaves.
    pub fn is_server(&self) -> bool {
        matches!(self, NodeClass::Server)
    }
}

impl std::fmt::Display for NodeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeClass::Server => write!(f, "server"),
            NodeClass::Rack => write!(f, "rack"),
            NodeClass::Cabinet => write!(f, "cabinet"),
            NodeClass::Datacenter => write!(f, "datacenter"),
            NodeClass::Region => write!(f, "region"),
            NodeClass::Root => write!(f, "root"),
        }
    }
}

/// A node in the topology tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// A storage server. Never has children.
    Server { id: NodeId },
    /// A grouping node such as a rack or datacenter.
    Intermediate {
        id: NodeId,
        class: NodeClass,
        children: Vec<Arc<Node>>,
    },
}

impl Node {
    /// Create a server node.
    pub fn server(id: impl Into<NodeId>) -> Self {
        Node::Server { id: id.into() }
    }

    /// Create an intermediate node.
    pub fn intermediate(id: impl Into<NodeId>, class: NodeClass, children: Vec<Node>) -> Self {
        Node::Intermediate {
            id: id.into(),
            class,
            children: children.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn id(&self) -> &NodeId {
        match self {
            Node::Server { id } | Node::Intermediate { id, .. } => id,
        }
    }

    pub fn class(&self) -> NodeClass {
        match self {
            Node::Server { .. } => NodeClass::Server,
            Node::Intermediate { class, .. } => *class,
        }
    }

    /// Children in topology order. Empty for servers.
    pub fn children(&self) -> &[Arc<Node>] {
        match self {
            Node::Server { .. } => &[],
            Node::Intermediate { children, .. } => children,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Node::Server { .. })
    }

    /// All server ids at or below this node, in depth-first order.
    pub fn servers(&self) -> Vec<NodeId> {
        let mut servers = Vec::new();
        self.collect_servers(&mut servers);
        servers
    }

    fn collect_servers(&self, out: &mut Vec<NodeId>) {
        match self {
            Node::Server { id } => out.push(id.clone()),
            Node::Intermediate { children, .. } => {
                for child in children {
                    child.collect_servers(out);
                }
            }
        }
    }

    /// Whether a server satisfying `pred` is reachable from this node
    /// through nodes that all satisfy `keep`.
    ///
    /// A node failing `keep`, this one included, cuts off its whole subtree.
    pub fn any_server_path(&self, keep: &impl Fn(&Node) -> bool, pred: &impl Fn(&NodeId) -> bool) -> bool {
        if !keep(self) {
            return false;
        }
        match self {
            Node::Server { id } => pred(id),
            Node::Intermediate { children, .. } => children.iter().any(|c| c.any_server_path(keep, pred)),
        }
    }
}

/// The static shape of the cluster: a rooted tree of nodes with an id index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Node", into = "Node")]
pub struct Topology {
    root: Arc<Node>,
    index: HashMap<NodeId, Arc<Node>>,
}

impl Topology {
    /// Build a topology, validating node ids and classes.
    pub fn new(root: Node) -> Result<Self> {
        let root = Arc::new(root);
        let mut index = HashMap::new();
        Self::index_node(&root, &mut index)?;
        Ok(Self { root, index })
    }

    fn index_node(node: &Arc<Node>, index: &mut HashMap<NodeId, Arc<Node>>) -> Result<()> {
        if node.id().is_empty() {
            return Err(Error::Topology("node with empty id".to_string()));
        }
        if let Node::Intermediate { id, class, .. } = node.as_ref() {
            if class.is_server() {
                return Err(Error::Topology(format!(
                    "intermediate node {} cannot have class server",
                    id
                )));
            }
        }
        if index.insert(node.id().clone(), node.clone()).is_some() {
            return Err(Error::Topology(format!("duplicate node id: {}", node.id())));
        }
        for child in node.children() {
            Self::index_node(child, index)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Result<&Arc<Node>> {
        self.index
            .get(id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Number of nodes of every class.
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    /// All server ids, depth-first.
    pub fn servers(&self) -> Vec<NodeId> {
        self.root.servers()
    }
}

impl TryFrom<Node> for Topology {
    type Error = Error;

    fn try_from(root: Node) -> Result<Self> {
        Topology::new(root)
    }
}

impl From<Topology> for Node {
    fn from(topology: Topology) -> Self {
        topology.root.as_ref().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_racks() -> Node {
        Node::intermediate(
            "dc",
            NodeClass::Datacenter,
            vec![
                Node::intermediate(
                    "rack1",
                    NodeClass::Rack,
                    vec![Node::server("s1"), Node::server("s2")],
                ),
                Node::intermediate("rack2", NodeClass::Rack, vec![Node::server("s3")]),
            ],
        )
    }

    #[test]
    fn test_topology_index() {
        let topology = Topology::new(two_racks()).unwrap();

        assert_eq!(topology.node_count(), 6);
        assert_eq!(topology.node("rack1").unwrap().class(), NodeClass::Rack);
        assert!(topology.node("s2").unwrap().is_server());
        assert_eq!(topology.servers(), vec!["s1", "s2", "s3"]);
        assert!(matches!(topology.node("nope"), Err(Error::NodeNotFound(_))));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let root = Node::intermediate(
            "rack",
            NodeClass::Rack,
            vec![Node::server("s1"), Node::server("s1")],
        );
        assert!(matches!(Topology::new(root), Err(Error::Topology(_))));
    }

    #[test]
    fn test_intermediate_server_class_rejected() {
        let root = Node::intermediate("bad", NodeClass::Server, vec![Node::server("s1")]);
        assert!(matches!(Topology::new(root), Err(Error::Topology(_))));
    }

    #[test]
    fn test_any_server_path() {
        let node = two_racks();
        let everything = |_: &Node| true;
        assert!(node.any_server_path(&everything, &|id| id == "s3"));
        assert!(!node.any_server_path(&everything, &|id| id == "s9"));

        // Cutting rack2 hides s3 even though s3 itself passes.
        let without_rack2 = |n: &Node| n.id() != "rack2";
        assert!(!node.any_server_path(&without_rack2, &|id| id == "s3"));
        assert!(node.any_server_path(&without_rack2, &|id| id == "s1"));

        let without_dc = |n: &Node| n.id() != "dc";
        assert!(!node.any_server_path(&without_dc, &|_| true));
    }

    #[test]
    fn test_serde_round_trip_rebuilds_index() {
        let topology = Topology::new(two_racks()).unwrap();
        let json = serde_json::to_string(&topology).unwrap();
        let decoded: Topology = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.node_count(), topology.node_count());
        assert!(decoded.contains("rack2"));
    }
}
