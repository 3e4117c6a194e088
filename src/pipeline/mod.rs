//! Proof verification pipeline
//!
//! `verifier` talks to the external zero-knowledge proof verifier;
//! `orchestrator` runs a submission through verification, wallet-signature
//! checks, nonce reservation, and the chain commit.

mod orchestrator;
mod verifier;

pub use orchestrator::*;
pub use verifier::*;
