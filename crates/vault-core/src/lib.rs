//! vault-core: Shared types, amount arithmetic, errors, and configuration
//!
//! This crate provides the foundational types used across the vault workspace.
//! Every conversion between decimal strings, base units and percentages goes
//! through [`amount`].

pub mod amount;
pub mod config;
pub mod errors;
pub mod types;

pub use amount::AmountError;
pub use config::*;
pub use errors::*;
pub use types::*;
