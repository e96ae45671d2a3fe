//! Transport layer
//!
//! A transport delivers one request to one node and hands back the
//! response envelope unmodified. Following async operations is the
//! client's job, so transports stay trivial and easy to fake in tests.

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use warren_core::domain::node::Node;

use crate::envelope::Envelope;
use crate::error::{ClientError, Result};

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    /// Raw file content written into a container
    File(Vec<u8>),
}

/// A request against a node, `path` being absolute (e.g. `/1.0/containers`)
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>, body: Body) -> Self {
        Self {
            method,
            path: path.into(),
            body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, Body::Empty)
    }
}

/// Delivers requests to container hosts
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request to `node` and returns its response envelope
    async fn send(&self, node: &Node, request: Request) -> Result<Envelope>;
}

/// HTTPS transport authenticating with a client certificate
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport around a configured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Create a transport presenting the given PEM certificate and key
    ///
    /// Container hosts usually serve self-signed certificates, so server
    /// verification is optional.
    pub fn with_identity(
        cert_pem: &[u8],
        key_pem: &[u8],
        verify_server: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let mut pem = Vec::with_capacity(cert_pem.len() + key_pem.len() + 1);
        pem.extend_from_slice(cert_pem);
        pem.push(b'\n');
        pem.extend_from_slice(key_pem);

        let identity =
            reqwest::Identity::from_pem(&pem).map_err(|e| ClientError::Identity(e.to_string()))?;

        let client = Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .danger_accept_invalid_certs(!verify_server)
            .timeout(timeout)
            .build()?;

        Ok(Self::with_client(client))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, node: &Node, request: Request) -> Result<Envelope> {
        let url = format!("{}{}", node.endpoint, request.path);
        debug!("{} {}", request.method, url);

        let builder = self.client.request(request.method, &url);
        let builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::File(content) => builder
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header("X-LXD-type", "file")
                .header("X-LXD-write", "overwrite")
                .body(content),
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        match serde_json::from_slice::<Envelope>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(ClientError::api_error(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            )),
            Err(e) => Err(ClientError::ParseError(format!(
                "Invalid envelope from {}: {}",
                url, e
            ))),
        }
    }
}
