//! Chain access for the personhood gateway
//!
//! Contains:
//! - JSON-RPC client and borsh transaction encoding
//! - Backend signing-key pool with per-key nonce lanes
//! - Identity registry contract client
//! - Startup key registration (bootstrapper)

mod error;
mod key_pool;
mod registrar;
mod registry;
mod rpc;

pub use error::*;
pub use key_pool::*;
pub use registrar::*;
pub use registry::*;
pub use rpc::*;
