//! Opaque token issuance and hashing
//!
//! Bundle tokens (`mcpb_`) and management API keys (`mcpa_`) share the same
//! scheme: 32 cryptographically-random bytes, hex-encoded behind a prefix.
//! Only the SHA-256 of the full string is ever persisted.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix of bundle access tokens.
pub const TOKEN_PREFIX: &str = "mcpb_";

/// Prefix of management API keys.
pub const ADMIN_KEY_PREFIX: &str = "mcpa_";

/// Minimum number of characters after the prefix.
const MIN_BODY_LEN: usize = 32;

/// Mint a fresh bundle token: `mcpb_` + 64 lowercase hex chars.
pub fn mint_token() -> String {
    mint_with_prefix(TOKEN_PREFIX)
}

/// Mint a fresh management API key: `mcpa_` + 64 lowercase hex chars.
pub fn mint_admin_key() -> String {
    mint_with_prefix(ADMIN_KEY_PREFIX)
}

fn mint_with_prefix(prefix: &str) -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}", prefix, hex::encode(bytes))
}

/// SHA-256 of an arbitrary string, hex-encoded.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// SHA-256 of the token string, hex-encoded. This is the only form that
/// reaches storage.
pub fn hash_token(token: &str) -> String {
    sha256_hex(token)
}

/// Whether a string is shaped like a bundle token.
pub fn is_token_format(value: &str) -> bool {
    has_prefix_and_body(value, TOKEN_PREFIX)
}

/// Whether a string is shaped like a management API key.
pub fn is_admin_key_format(value: &str) -> bool {
    has_prefix_and_body(value, ADMIN_KEY_PREFIX)
}

fn has_prefix_and_body(value: &str, prefix: &str) -> bool {
    value
        .strip_prefix(prefix)
        .map(|body| body.len() >= MIN_BODY_LEN)
        .unwrap_or(false)
}
