//! Container, image, file and server endpoints

use serde::Serialize;
use serde_json::{Value, json};
use warren_core::domain::node::Node;

use crate::LxdClient;
use crate::error::{ClientError, Result};
use crate::transport::Body;

/// Container state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateAction {
    Start,
    Stop,
}

impl LxdClient {
    // =============================================================================
    // Server & Images
    // =============================================================================

    /// Get the server information of a node
    pub async fn server_info(&self, node: &Node) -> Result<Value> {
        self.get(node, "").await
    }

    /// Resolve an image alias to the fingerprint it points at
    pub async fn image_fingerprint(&self, node: &Node, alias: &str) -> Result<String> {
        let metadata = self.get(node, &format!("images/aliases/{}", alias)).await?;

        metadata
            .get("target")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::ParseError(format!("Alias '{}' has no target", alias)))
    }

    // =============================================================================
    // Containers
    // =============================================================================

    /// List the names of all containers on a node
    pub async fn list_containers(&self, node: &Node) -> Result<Vec<String>> {
        let metadata = self.get(node, "containers").await?;
        names_from_urls(&metadata)
    }

    /// Create a container from a full container definition
    pub async fn create_container(&self, node: &Node, definition: Value) -> Result<()> {
        self.post(node, "containers", Body::Json(definition)).await?;
        Ok(())
    }

    /// Change the running state of a container
    pub async fn set_container_state(
        &self,
        node: &Node,
        name: &str,
        action: StateAction,
        timeout_secs: u64,
        force: bool,
    ) -> Result<()> {
        let body = json!({
            "action": action,
            "timeout": timeout_secs,
            "force": force,
            "stateful": false,
        });
        self.put(node, &format!("containers/{}/state", name), Body::Json(body))
            .await?;
        Ok(())
    }

    /// Delete a container
    pub async fn delete_container(&self, node: &Node, name: &str) -> Result<()> {
        self.delete(node, &format!("containers/{}", name)).await?;
        Ok(())
    }

    /// Write a file into a container, replacing any existing file
    pub async fn push_file(
        &self,
        node: &Node,
        container: &str,
        path: &str,
        content: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.post(
            node,
            &format!("containers/{}/files?path={}", container, path),
            Body::File(content.into()),
        )
        .await?;
        Ok(())
    }
}

/// Listing endpoints return resource URLs (`/1.0/containers/<name>`);
/// the name is the last path segment.
pub(crate) fn names_from_urls(metadata: &Value) -> Result<Vec<String>> {
    let urls = metadata
        .as_array()
        .ok_or_else(|| ClientError::ParseError("Expected a list of resources".to_string()))?;

    Ok(urls
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|url| url.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}
