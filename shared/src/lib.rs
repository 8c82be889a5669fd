//! Shared building blocks for the ephemeral Kerberos realm fixture
//!
//! Holds the pieces that both the realm library and the operator CLI use:
//! error types, logging macros, daemon roles and port blocks, and the krb5
//! profile model (merge, render, read back).

pub mod errors;
pub mod logging;
pub mod profile;
pub mod types;

pub use errors::*;
pub use profile::{ProfileValue, Section, Substitutions};
pub use types::*;
