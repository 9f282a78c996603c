/// Byte budget for the content id stored on an asset account. The
/// account is allocated at a fixed size, so longer ids are rejected at
/// registration time.
pub const MAX_CONTENT_ID_LEN: usize = 64;

/// Leading bytes of the content id that feed the asset address
/// derivation. The host caps each derivation seed at 32 bytes, so ids
/// sharing this prefix derive the same address.
pub const CONTENT_ID_SEED_LEN: usize = 32;
