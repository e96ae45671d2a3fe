//! Warren container host client
//!
//! A typed client for the REST protocol spoken by the container hosts of
//! the cluster. Every call is normalized into a single result:
//!
//! - `sync` envelopes yield their metadata (or fail if it carries an error)
//! - `async` envelopes are followed through their operation's `/wait`
//!   endpoint until a `sync` or `error` envelope settles the call
//! - `error` envelopes and transport failures become [`ClientError`]s
//!
//! The following of async operations is bounded, so a host that never
//! settles an operation cannot stall the caller forever.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use warren_client::{HttpTransport, LxdClient};
//! use warren_core::domain::node::Node;
//!
//! # async fn example(cert: &[u8], key: &[u8]) -> warren_client::Result<()> {
//! let transport = HttpTransport::with_identity(cert, key, false, Duration::from_secs(30))?;
//! let client = LxdClient::new(Arc::new(transport));
//!
//! let head = Node::new("head", "https://10.0.0.1:8443").unwrap();
//! let containers = client.list_containers(&head).await?;
//! println!("{} containers on {}", containers.len(), head.id);
//! # Ok(())
//! # }
//! ```

mod containers;
pub mod envelope;
pub mod error;
mod networks;
pub mod transport;

// Re-export commonly used types
pub use containers::StateAction;
pub use envelope::Envelope;
pub use error::{ClientError, Result};
pub use reqwest::Method;
pub use transport::{Body, HttpTransport, Request, Transport};

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use warren_core::domain::node::Node;

/// Version prefix of every resource path
pub const API_ROOT: &str = "/1.0";

/// Default bound on the number of async operations followed per call
pub const DEFAULT_MAX_ASYNC_HOPS: usize = 16;

/// Client for the container hosts of the cluster
///
/// Cheap to clone; clones share the underlying transport.
#[derive(Clone)]
pub struct LxdClient {
    transport: Arc<dyn Transport>,
    max_async_hops: usize,
}

impl LxdClient {
    /// Create a new client on top of a transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            max_async_hops: DEFAULT_MAX_ASYNC_HOPS,
        }
    }

    /// Change how many chained async operations a single call may follow
    pub fn with_max_async_hops(mut self, hops: usize) -> Self {
        self.max_async_hops = hops;
        self
    }

    // =============================================================================
    // Verbs
    // =============================================================================

    /// GET a resource below the API root ("" addresses the root itself)
    pub async fn get(&self, node: &Node, resource: &str) -> Result<Value> {
        self.call(node, Request::get(resource_path(resource))).await
    }

    /// POST to a resource below the API root
    pub async fn post(&self, node: &Node, resource: &str, body: Body) -> Result<Value> {
        self.call(node, Request::new(Method::POST, resource_path(resource), body))
            .await
    }

    /// PUT to a resource below the API root
    pub async fn put(&self, node: &Node, resource: &str, body: Body) -> Result<Value> {
        self.call(node, Request::new(Method::PUT, resource_path(resource), body))
            .await
    }

    /// DELETE a resource below the API root
    pub async fn delete(&self, node: &Node, resource: &str) -> Result<Value> {
        self.call(
            node,
            Request::new(Method::DELETE, resource_path(resource), Body::Empty),
        )
        .await
    }

    // =============================================================================
    // Response Handling
    // =============================================================================

    /// Send a request and settle its envelope
    ///
    /// Async envelopes are followed one hop at a time; each hop is awaited
    /// before the next is issued.
    pub async fn call(&self, node: &Node, request: Request) -> Result<Value> {
        let mut envelope = self.transport.send(node, request).await?;
        let mut hops = 0;

        loop {
            match envelope {
                Envelope::Sync { metadata } => return envelope::settle(metadata),
                Envelope::Error { error, error_code } => {
                    return Err(ClientError::Remote {
                        code: error_code,
                        message: error,
                    });
                }
                Envelope::Async { operation, .. } => {
                    if hops >= self.max_async_hops {
                        return Err(ClientError::AsyncChainTooDeep { operation, hops });
                    }
                    hops += 1;
                    debug!("Forwarding to {}/wait on {}", operation, node.id);
                    envelope = self
                        .transport
                        .send(node, Request::get(format!("{}/wait", operation)))
                        .await?;
                }
            }
        }
    }
}

fn resource_path(resource: &str) -> String {
    if resource.is_empty() {
        API_ROOT.to_string()
    } else {
        format!("{}/{}", API_ROOT, resource.trim_start_matches('/'))
    }
}
