//! HTTP surface for the verification gateway.

mod error;
mod rest;
mod types;

pub mod handlers;

pub use error::*;
pub use rest::*;
pub use types::*;
