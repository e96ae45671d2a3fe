//! Response envelopes
//!
//! Every response of the container host is wrapped in an envelope tagged
//! `sync`, `async` or `error`. Async envelopes name an operation whose
//! `/wait` endpoint answers with another envelope once it settles.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Sync {
        #[serde(default)]
        metadata: Value,
    },
    Async {
        /// Operation path, e.g. `/1.0/operations/<uuid>`
        operation: String,
        #[serde(default)]
        metadata: Value,
    },
    Error {
        #[serde(default)]
        error: String,
        #[serde(default)]
        error_code: i64,
    },
}

impl Envelope {
    pub fn sync(metadata: Value) -> Self {
        Envelope::Sync { metadata }
    }

    pub fn operation(operation: impl Into<String>) -> Self {
        Envelope::Async {
            operation: operation.into(),
            metadata: Value::Null,
        }
    }

    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Envelope::Error {
            error: message.into(),
            error_code: code,
        }
    }
}

/// Extracts the payload of a settled `sync` envelope.
///
/// A completed operation reports failure through an `err` field in its
/// metadata; that is surfaced as an error rather than as data.
pub(crate) fn settle(metadata: Value) -> Result<Value, ClientError> {
    match metadata.get("err").and_then(Value::as_str) {
        Some(err) if !err.is_empty() => Err(ClientError::Remote {
            code: metadata
                .get("status_code")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            message: err.to_string(),
        }),
        _ => Ok(metadata),
    }
}
