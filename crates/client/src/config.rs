//! Configuration constants for the client.
//!
//! This module centralizes protocol constants and tunable values so the
//! rest of the crate never carries magic numbers inline.

use std::time::Duration;

use anchor_lang::prelude::Pubkey;

/// Address of the deployed sealgate program.
pub const PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("EhsDqCSNL6FWnYryn6bM2wQFX8ZrSuJiHfiaiNk5aD9d");

/// Timeout for storage uploads. Payloads can run to many megabytes over
/// slow links, so this is deliberately generous.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for storage fetches, sized like [`UPLOAD_TIMEOUT`].
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for ledger RPC calls.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for key custodian and metadata service calls.
pub const SERVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a signed release proof stays valid, in seconds.
pub const PROOF_TTL_SECS: u64 = 300;

/// Domain separator for the bytes a policy digest commits to.
pub const POLICY_DOMAIN: &[u8] = b"sealgate:entitlement-policy:v1";

/// Domain separator for the statement signed in a release proof.
pub const RELEASE_DOMAIN: &[u8] = b"sealgate:release:v1";

/// Return the current Unix timestamp in seconds.
pub fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
