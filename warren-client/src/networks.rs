//! Network endpoints

use serde_json::Value;
use warren_core::domain::node::Node;

use crate::LxdClient;
use crate::containers::names_from_urls;
use crate::error::Result;
use crate::transport::Body;

impl LxdClient {
    /// List the names of all networks on a node
    pub async fn list_networks(&self, node: &Node) -> Result<Vec<String>> {
        let metadata = self.get(node, "networks").await?;
        names_from_urls(&metadata)
    }

    /// Create a network from a full network definition
    pub async fn create_network(&self, node: &Node, definition: Value) -> Result<()> {
        self.post(node, "networks", Body::Json(definition)).await?;
        Ok(())
    }

    /// Delete a network
    pub async fn delete_network(&self, node: &Node, name: &str) -> Result<()> {
        self.delete(node, &format!("networks/{}", name)).await?;
        Ok(())
    }
}
