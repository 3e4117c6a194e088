//! Deterministic backend key derivation.
//!
//! The gateway signs registry transactions with a pool of Ed25519 keys, all
//! derived from a single root seed so that restarts and horizontally scaled
//! replicas agree on the key set without shared storage:
//!
//! `seed_i = SHA256(DOMAIN_LANE_KEY || root_seed || U32_BE(i))`
//!
//! Every derived key is added to the backend account as a full-access key by
//! the bootstrapper, after which each key serves as an independent
//! transaction-nonce lane.

use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};

use super::nep413::ED25519_KEY_PREFIX;

/// Domain prefix for signing-lane seed derivation.
pub const DOMAIN_LANE_KEY: &[u8] = b"PERSONHOOD_LANE_KEY_V1";

/// Expected hex length of the root seed (32 bytes).
pub const ROOT_SEED_HEX_LEN: usize = 64;

/// Errors from root seed parsing.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("root seed must be {ROOT_SEED_HEX_LEN} hex characters, got {0}")]
    WrongLength(usize),
    #[error("root seed is not valid hex: {0}")]
    NotHex(#[from] hex::FromHexError),
}

/// Parse a 64-character hex string into a 32-byte root seed.
pub fn root_seed_from_hex(text: &str) -> Result<[u8; 32], SeedError> {
    let trimmed = text.trim();
    if trimmed.len() != ROOT_SEED_HEX_LEN {
        return Err(SeedError::WrongLength(trimmed.len()));
    }
    let bytes = hex::decode(trimmed)?;
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&bytes);
    Ok(seed)
}

/// Derive the signing key for one lane of the pool.
pub fn derive_lane_signing_key(root_seed: &[u8; 32], index: u32) -> SigningKey {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_LANE_KEY);
    hasher.update(root_seed);
    hasher.update(index.to_be_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    SigningKey::from_bytes(&digest)
}

/// Render a verifying key in the chain's `ed25519:<base58>` text form.
pub fn public_key_text(key: &SigningKey) -> String {
    format!(
        "{ED25519_KEY_PREFIX}{}",
        bs58::encode(key.verifying_key().as_bytes()).into_string()
    )
}
