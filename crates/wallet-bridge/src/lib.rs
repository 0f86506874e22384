//! Signing bridge for wallet integration
//!
//! The vault client never holds keys. Every write goes through a
//! [`SigningBridge`], which hands a [`TransactionSpec`] to the wallet and
//! reports back what the wallet did with it.

pub mod error;
pub mod handlers;
pub mod server;
pub mod types;

use async_trait::async_trait;
use vault_tx::TransactionSpec;

pub use error::BridgeError;
pub use server::BridgeServer;
pub use types::*;

/// External sign-and-broadcast collaborator.
///
/// One call is one signing prompt; implementations must not retry.
#[async_trait]
pub trait SigningBridge: Send + Sync {
    async fn submit(&self, spec: TransactionSpec) -> Result<SubmitResult, BridgeError>;
}
