//! vault-api: HTTP API layer for the vault client
//!
//! Exposes sessions, positions and the deposit/withdraw flows to the
//! presentation layer.

pub mod dto;
pub mod routes;
pub mod server;
pub mod state;

pub use server::*;
pub use state::{ApiError, AppState};
