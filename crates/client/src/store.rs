//! Content-addressed storage client.
//!
//! Ciphertext lives on a durable, publicly readable network reached
//! through an upload node and a read gateway. Both operations are
//! idempotent: the same bytes always map to the same content address.
//! Payloads can be large, so requests run under a deliberately generous
//! timeout and a timeout failure names the address to resume from
//! instead of hanging forever.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{FETCH_TIMEOUT, UPLOAD_TIMEOUT};

/// Address of a stored payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Name/value pair recorded alongside an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage request timed out after {timeout:?}; retry with the same content address")]
    Timeout { timeout: Duration },

    #[error("storage node funds are too low to pay for the upload")]
    InsufficientStorageFunds,

    #[error("content {0} not found")]
    NotFound(ContentId),

    #[error("storage node returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("storage transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed storage response: {0}")]
    InvalidResponse(String),
}

/// Durable content-addressed storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a payload with its tags. Returns the content address.
    async fn put(&self, bytes: Vec<u8>, tags: &[Tag]) -> Result<ContentId, StoreError>;

    /// Fetch a payload by content address.
    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError>;
}

/// HTTP client for an upload node and read gateway pair.
pub struct GatewayStore {
    node_url: String,
    gateway_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
}

impl GatewayStore {
    pub fn new(
        node_url: impl Into<String>,
        gateway_url: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            node_url: trim_trailing_slash(node_url.into()),
            gateway_url: trim_trailing_slash(gateway_url.into()),
            http,
        })
    }
}

#[async_trait]
impl ContentStore for GatewayStore {
    async fn put(&self, bytes: Vec<u8>, tags: &[Tag]) -> Result<ContentId, StoreError> {
        let payload_len = bytes.len();
        let tags_json = serde_json::to_string(tags)
            .map_err(|e| StoreError::InvalidResponse(format!("tag encoding: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name("content.bin"),
            )
            .text("tags", tags_json);

        debug!(bytes = payload_len, "uploading payload");
        let response = self
            .http
            .post(format!("{}/tx", self.node_url))
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| wrap_transport(e, UPLOAD_TIMEOUT))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }
        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("upload receipt: {e}")))?;
        let id = ContentId::new(upload.id);
        info!(%id, bytes = payload_len, "payload stored");
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError> {
        debug!(%id, "fetching payload");
        let response = self
            .http
            .get(format!("{}/{}", self.gateway_url, id))
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| wrap_transport(e, FETCH_TIMEOUT))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(StoreError::NotFound(id.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| wrap_transport(e, FETCH_TIMEOUT))?;
        Ok(bytes.to_vec())
    }
}

fn wrap_transport(error: reqwest::Error, timeout: Duration) -> StoreError {
    if error.is_timeout() {
        StoreError::Timeout { timeout }
    } else {
        StoreError::Transport(error)
    }
}

/// Map a non-success upload status. 402 is the node's signal that its
/// funded balance cannot cover the payload.
fn classify_status(status: u16, body: String) -> StoreError {
    if status == 402 {
        StoreError::InsufficientStorageFunds
    } else {
        StoreError::Status { status, body }
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_required_maps_to_funding_error() {
        assert!(matches!(
            classify_status(402, String::new()),
            StoreError::InsufficientStorageFunds
        ));
        assert!(matches!(
            classify_status(500, "boom".to_string()),
            StoreError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn tags_serialize_as_name_value_pairs() {
        let tags = vec![Tag::new("Content-Type", "application/octet-stream")];
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(
            json,
            r#"[{"name":"Content-Type","value":"application/octet-stream"}]"#
        );
    }

    #[test]
    fn urls_are_normalized() {
        let store = GatewayStore::new("https://node.example/", "https://gw.example//").unwrap();
        assert_eq!(store.node_url, "https://node.example");
        assert_eq!(store.gateway_url, "https://gw.example");
    }
}
