//! Signing bridge types

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use vault_tx::TransactionSpec;

/// Wallet-reported outcome of a signing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Success,
    Error,
}

/// Result of one sign-and-broadcast round trip.
///
/// Mirrors the wallet's final payload: on success `transaction_id` is set, on
/// error `error_code` says why (e.g. `user_rejected`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub status: SubmitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl SubmitResult {
    pub fn success(transaction_id: impl Into<String>) -> Self {
        Self {
            status: SubmitStatus::Success,
            transaction_id: Some(transaction_id.into()),
            error_code: None,
        }
    }

    pub fn error(error_code: impl Into<String>) -> Self {
        Self {
            status: SubmitStatus::Error,
            transaction_id: None,
            error_code: Some(error_code.into()),
        }
    }

    /// The wallet says the user declined (or closed the prompt)
    pub fn is_user_rejection(&self) -> bool {
        self.status == SubmitStatus::Error
            && self
                .error_code
                .as_deref()
                .map(|code| code.contains("user_rejected") || code.contains("cancelled"))
                .unwrap_or(false)
    }
}

/// Callback payload POSTed by the wallet after it handled a request
pub type TxCallback = SubmitResult;

/// Status of a pending request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting for the wallet
    Pending,
    /// Wallet signed and broadcast
    Submitted { tx_id: String },
    /// Wallet reported an error
    Rejected { error_code: String },
    /// Nobody answered in time
    Expired,
}

/// A signing request waiting for the wallet
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: String,
    pub spec: TransactionSpec,
    pub message: String,
    pub created_at: Instant,
    pub status: RequestStatus,
}

impl PendingRequest {
    pub fn new(id: String, spec: TransactionSpec) -> Self {
        let message = spec.describe();
        Self {
            id,
            spec,
            message,
            created_at: Instant::now(),
            status: RequestStatus::Pending,
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// What the wallet fetches for a request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequestResponse {
    pub id: String,
    pub message: String,
    pub transaction: TransactionSpec,
    /// URL the wallet POSTs its [`SubmitResult`] to
    pub reply_to: String,
}

/// Entry in a wallet's pending list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummary {
    pub id: String,
    pub message: String,
    pub age_secs: u64,
}
