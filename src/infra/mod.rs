//! Infrastructure layer for the personhood gateway
//!
//! Contains:
//! - Replay protection (PostgreSQL and in-memory nonce stores)
//! - Retry with exponential backoff for chain RPC traffic

mod nonce_store;
mod retry;

pub use nonce_store::*;
pub use retry::*;
