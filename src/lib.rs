//! Personhood Gateway Library
//!
//! Verification gateway for zero-knowledge proof-of-personhood: validates
//! identity proofs, authenticates the submitting wallet, and records each
//! verified person on-chain exactly once.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (submissions, verifier outcomes, signature payloads)
//! - [`crypto`] - Signed-message digests and lane key derivation
//! - [`chain`] - Chain RPC client, registry contract client, signing key pool
//! - [`infra`] - Nonce reservation store, retry policy
//! - [`pipeline`] - Proof verifier adapter and the verification orchestrator
//! - [`projection`] - Pollable session status store
//! - [`api`] - REST API routes and handlers

pub mod api;
pub mod chain;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod migrations;
pub mod pipeline;
pub mod projection;
pub mod server;

// Re-export commonly used types
pub use domain::{
    AttestationKind, SessionProjection, SessionStatus, SubmissionBody, VerificationRequest,
    VerifiedRecord, VerifierOutcome, VerifyErrorCode,
};

pub use pipeline::{PipelineError, VerificationPipeline, VerificationPolicy, VerifySuccess};
