//! Cluster nodes
//!
//! A node is addressed by the endpoint of its container host. Several node
//! ids may share one endpoint; the endpoint is what identifies a physical
//! machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("invalid node id '{0}': must start with a lowercase letter followed by lowercase letters or digits")]
    InvalidId(String),

    #[error("invalid endpoint '{endpoint}' for node '{id}': must start with http:// or https://")]
    InvalidEndpoint { id: String, endpoint: String },

    #[error("duplicate node id '{0}'")]
    Duplicate(String),

    #[error("cluster has no nodes")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Base URL of the node's container host, without a trailing slash
    pub endpoint: String,
}

impl Node {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Result<Self, NodeError> {
        let id = id.into();
        let endpoint = endpoint.into();

        if !Self::is_valid_id(&id) {
            return Err(NodeError::InvalidId(id));
        }
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(NodeError::InvalidEndpoint { id, endpoint });
        }

        Ok(Self {
            id,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Node ids are embedded in container names and must stay parseable:
    /// a lowercase letter followed by lowercase letters or digits.
    pub fn is_valid_id(id: &str) -> bool {
        let mut chars = id.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    }
}

/// The set of nodes the scheduler manages. The first node is the control
/// node, which hosts every pit's daemon container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    nodes: Vec<Node>,
}

impl Cluster {
    pub fn new(nodes: Vec<Node>) -> Result<Self, NodeError> {
        if nodes.is_empty() {
            return Err(NodeError::Empty);
        }
        for (i, node) in nodes.iter().enumerate() {
            if nodes[..i].iter().any(|n| n.id == node.id) {
                return Err(NodeError::Duplicate(node.id.clone()));
            }
        }
        Ok(Self { nodes })
    }

    /// The control node
    pub fn head(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
