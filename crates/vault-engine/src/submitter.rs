//! One-shot hand-off of a transaction to the signing bridge

use std::sync::Arc;

use vault_core::{TxId, VaultError};
use vault_tx::TransactionSpec;
use wallet_bridge::{BridgeError, SigningBridge, SubmitResult, SubmitStatus};

/// Wraps exactly one bridge call per submission. Never retries: a second
/// attempt could spend the same nonce or amount twice.
#[derive(Clone)]
pub struct TransactionSubmitter {
    bridge: Arc<dyn SigningBridge>,
}

impl TransactionSubmitter {
    pub fn new(bridge: Arc<dyn SigningBridge>) -> Self {
        Self { bridge }
    }

    pub async fn submit(&self, spec: TransactionSpec) -> Result<TxId, VaultError> {
        let kind = spec.kind;
        let result = self.bridge.submit(spec).await;

        match &result {
            Ok(r) if r.status == SubmitStatus::Success => {
                tracing::info!(kind = ?kind, tx_id = ?r.transaction_id, "Transaction sent")
            }
            Ok(r) => tracing::warn!(kind = ?kind, error_code = ?r.error_code, "Wallet reported error"),
            Err(e) => tracing::warn!(kind = ?kind, "Signing bridge failed: {}", e),
        }

        interpret(result)
    }
}

fn interpret(result: Result<SubmitResult, BridgeError>) -> Result<TxId, VaultError> {
    match result {
        Ok(r) if r.is_user_rejection() => Err(VaultError::UserCancelled),
        Ok(SubmitResult {
            status: SubmitStatus::Success,
            transaction_id: Some(id),
            ..
        }) if !id.is_empty() => Ok(TxId::new(id)),
        Ok(SubmitResult {
            status: SubmitStatus::Success,
            ..
        }) => Err(VaultError::Submission {
            message: "Wallet reported success without a transaction id".to_string(),
        }),
        Ok(SubmitResult { error_code, .. }) => Err(VaultError::Submission {
            message: format!(
                "Wallet rejected the transaction ({})",
                error_code.as_deref().unwrap_or("no error code")
            ),
        }),
        // Withdrawn before the wallet saw it: nothing was broadcast
        Err(BridgeError::Cancelled { .. }) => Err(VaultError::UserCancelled),
        // The wallet may have broadcast without reporting back
        Err(e @ BridgeError::Expired { .. }) => Err(VaultError::Submission {
            message: e.to_string(),
        }),
    }
}
