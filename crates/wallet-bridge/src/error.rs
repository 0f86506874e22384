//! Error types for the signing bridge

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("Signing request {request_id} expired without a wallet response")]
    Expired { request_id: String },

    #[error("Signing request {request_id} was withdrawn before the wallet answered")]
    Cancelled { request_id: String },
}
