//! Domain models for the personhood gateway.
//!
//! Core types for proof submissions, verifier outcomes, embedded wallet
//! signatures, on-chain verification records, and pollable session state.

mod attestation;
mod codes;
mod disclosure;
mod record;
mod session;
mod signature;

pub use attestation::*;
pub use codes::*;
pub use disclosure::*;
pub use record::*;
pub use session::*;
pub use signature::*;
