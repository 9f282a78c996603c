//! Listing metadata client.
//!
//! The metadata service is a descriptive cache for discovery: titles,
//! descriptions, prices, and the pointers needed to open an asset. It
//! holds nothing authoritative. Access decisions always come from the
//! ledger, and the sealed key stored here is useless without a
//! custodian release.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::SERVICE_TIMEOUT;
use crate::pipeline::PublishReceipt;

/// A listing as stored by the metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price_lamports: u64,
    /// Content address of the stored ciphertext.
    pub content_id: String,
    /// Base58 address of the on-ledger asset record.
    pub asset_address: String,
    /// Base64 sealed key blob, released only by the custodian.
    pub sealed_key: String,
    /// Hex digest of the policy the key was sealed under.
    pub policy_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Fields the caller supplies when creating a listing; the service
/// assigns the id.
#[derive(Debug, Clone, Serialize)]
pub struct NewListing {
    pub title: String,
    pub description: String,
    pub price_lamports: u64,
    pub content_id: String,
    pub asset_address: String,
    pub sealed_key: String,
    pub policy_digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl NewListing {
    /// Compose the listing for a completed publish. The caller supplies
    /// the descriptive fields; every pointer a buyer needs to open the
    /// asset comes from the receipt.
    pub fn for_receipt(
        receipt: &PublishReceipt,
        title: impl Into<String>,
        description: impl Into<String>,
        thumbnail_url: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            price_lamports: receipt.price,
            content_id: receipt.content_id.to_string(),
            asset_address: receipt.asset_address.to_string(),
            sealed_key: receipt.sealed_key.ciphertext_base64(),
            policy_digest: receipt.sealed_key.digest_hex(),
            thumbnail_url,
        }
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("listing {0} not found")]
    NotFound(String),

    #[error("metadata service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("metadata transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed metadata response: {0}")]
    InvalidResponse(String),
}

/// HTTP client for the listing service.
pub struct MetadataClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct CreateResponse {
    id: String,
}

impl MetadataClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, MetadataError> {
        let http = reqwest::Client::builder().timeout(SERVICE_TIMEOUT).build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { base_url, http })
    }

    /// Publish a listing. Returns the service-assigned id.
    pub async fn create_listing(&self, listing: &NewListing) -> Result<String, MetadataError> {
        let response = self
            .http
            .post(format!("{}/api/assets", self.base_url))
            .json(listing)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetadataError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| MetadataError::InvalidResponse(e.to_string()))?;
        debug!(id = %created.id, "listing created");
        Ok(created.id)
    }

    pub async fn fetch_listing(&self, id: &str) -> Result<ListingRecord, MetadataError> {
        let response = self
            .http
            .get(format!("{}/api/assets/{}", self.base_url, id))
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(MetadataError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetadataError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| MetadataError::InvalidResponse(e.to_string()))
    }
}
