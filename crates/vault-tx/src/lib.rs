//! vault-tx: transaction building for the permit vault
//!
//! Nonce allocation over the Permit2 bitmap, time-bounded permit construction,
//! and the transaction specs handed to the wallet for signing.

pub mod call;
pub mod nonce;
pub mod permit;

pub use call::{
    ContractCall, Permit2Payload, TokenPermissions, TransactionKind, TransactionSpec,
    PERMIT2_SIGNATURE_PLACEHOLDER,
};
pub use nonce::{allocate_nonce, Nonce};
pub use permit::{unix_now_secs, PermitBuilder, PermitTransfer};
