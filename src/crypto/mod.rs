//! Cryptographic utilities for the personhood gateway
//!
//! Provides:
//! - Off-chain message digests and Ed25519 verification (NEP-413 style)
//! - Deterministic derivation of the backend signing-key pool

mod keys;
mod nep413;

pub use keys::*;
pub use nep413::*;
