//! REST handlers for the verification gateway.

pub mod health;
pub mod status;
pub mod verify;

pub use health::*;
pub use status::*;
pub use verify::*;
