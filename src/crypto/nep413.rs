//! Off-chain message signing: canonical payload, domain tag, digest, and
//! Ed25519 verification.
//!
//! The scheme is deliberately minimal: a fixed borsh schema over
//! `{message, nonce, recipient, callbackUrl}`, a 4-byte little-endian domain
//! tag, a SHA-256 digest, and a detached Ed25519 signature over that digest.
//! Clients transmit only the signature, key, and nonce; the message
//! (challenge) and recipient are reconstructed server-side, so a signature
//! is only ever valid against the server's current expectations.

use base64::Engine;
use borsh::BorshSerialize;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Domain tag prepended (little-endian) to the serialized payload.
///
/// 2^31 + 413: on-chain transactions use tags below 2^31, so a signed
/// message can never be replayed as a transaction.
pub const SIGNED_MESSAGE_TAG: u32 = 2_147_484_061;

/// Textual prefix of the chain's Ed25519 public keys.
pub const ED25519_KEY_PREFIX: &str = "ed25519:";

/// The record a wallet signs. Serialization is fixed borsh:
/// length-prefixed UTF-8 strings, a raw 32-byte nonce, and a one-byte
/// option tag for the callback URL.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct SignedMessagePayload {
    pub message: String,
    pub nonce: [u8; 32],
    pub recipient: String,
    pub callback_url: Option<String>,
}

impl SignedMessagePayload {
    pub fn new(message: &str, nonce: [u8; 32], recipient: &str) -> Self {
        SignedMessagePayload {
            message: message.to_string(),
            nonce,
            recipient: recipient.to_string(),
            callback_url: None,
        }
    }

    /// Compute the digest a signature must cover: tag || borsh(payload),
    /// hashed with SHA-256.
    pub fn signing_digest(&self) -> Result<[u8; 32], SignatureCheckError> {
        let mut buf = SIGNED_MESSAGE_TAG.to_le_bytes().to_vec();
        self.serialize(&mut buf)?;
        Ok(Sha256::digest(&buf).into())
    }
}

/// Why a signature check could not be completed or did not pass.
#[derive(Debug, thiserror::Error)]
pub enum SignatureCheckError {
    #[error("public key is not a valid ed25519 key: {0}")]
    BadPublicKey(String),
    #[error("signature is not valid base64 ed25519 bytes: {0}")]
    BadSignature(String),
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] std::io::Error),
    #[error("signature does not match the expected payload")]
    Mismatch,
}

/// Parse an `ed25519:`-prefixed (or bare) base58 public key.
pub fn parse_public_key(text: &str) -> Result<VerifyingKey, SignatureCheckError> {
    let encoded = text.strip_prefix(ED25519_KEY_PREFIX).unwrap_or(text);
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| SignatureCheckError::BadPublicKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| {
            SignatureCheckError::BadPublicKey(format!("expected 32 bytes, got {}", v.len()))
        })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| SignatureCheckError::BadPublicKey(e.to_string()))
}

/// Decode a base64 detached signature.
pub fn parse_signature_b64(text: &str) -> Result<Signature, SignatureCheckError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| SignatureCheckError::BadSignature(e.to_string()))?;
    Signature::from_slice(&bytes).map_err(|e| SignatureCheckError::BadSignature(e.to_string()))
}

/// Verify a wallet signature over the reconstructed payload.
pub fn verify_signed_message(
    payload: &SignedMessagePayload,
    public_key_text: &str,
    signature_b64: &str,
) -> Result<(), SignatureCheckError> {
    let key = parse_public_key(public_key_text)?;
    let signature = parse_signature_b64(signature_b64)?;
    let digest = payload.signing_digest()?;
    key.verify(&digest, &signature)
        .map_err(|_| SignatureCheckError::Mismatch)
}
