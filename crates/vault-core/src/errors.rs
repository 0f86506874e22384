//! Error types for the vault client

use thiserror::Error;

use crate::{AmountError, DepositId, TokenAmount, TxId};

/// Top-level errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// JSON-RPC transport and decoding errors
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("RPC endpoint unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("RPC request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("RPC endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to parse RPC response: {0}")]
    ParseError(String),

    #[error("Value for {field} does not fit in 128 bits")]
    ValueOverflow { field: &'static str },
}

impl ChainError {
    /// Whether a read that failed this way may be retried with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status } => *status == 429 || *status >= 500,
            // -32005: request limit exceeded
            Self::Rpc { code, .. } => *code == -32005,
            Self::ParseError(_) | Self::ValueOverflow { .. } => false,
        }
    }
}

/// Deposit and withdraw workflow errors
#[derive(Debug, Clone, Error)]
pub enum VaultError {
    #[error("Invalid input: {message}")]
    Validation { message: String },

    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("All 256 nonces in bitmap word {word_position} are used")]
    NonceExhausted { word_position: u64 },

    #[error("Network error: {0}")]
    Network(#[from] ChainError),

    #[error("Transaction submission failed: {message}. Re-check balance and nonce state before retrying")]
    Submission { message: String },

    #[error("Transaction was cancelled by user")]
    UserCancelled,

    #[error("Transaction {tx_id} not confirmed after {waited_secs}s. It may still land on-chain; re-check state before retrying")]
    ConfirmationTimeout { tx_id: TxId, waited_secs: u64 },

    #[error("Transaction {tx_id} reverted on-chain")]
    TransactionReverted { tx_id: TxId },

    #[error("A deposit is already in progress for {wallet}")]
    AttemptInFlight { wallet: String },

    #[error("Withdrawal of deposit {deposit_id} is already in progress")]
    WithdrawInFlight { deposit_id: DepositId },

    #[error("Deposit {deposit_id} is not in the active set")]
    DepositNotFound { deposit_id: DepositId },

    #[error("Deposit {deposit_id} has nothing left to withdraw")]
    NothingToWithdraw { deposit_id: DepositId },

    #[error("Session has been closed")]
    SessionClosed,
}

impl From<AmountError> for VaultError {
    fn from(e: AmountError) -> Self {
        Self::Validation {
            message: e.to_string(),
        }
    }
}

impl VaultError {
    /// Get an HTTP-friendly error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NonceExhausted { .. } => "nonce_exhausted",
            Self::Network(_) => "network_error",
            Self::Submission { .. } => "submission_error",
            Self::UserCancelled => "user_cancelled",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
            Self::TransactionReverted { .. } => "transaction_reverted",
            Self::AttemptInFlight { .. } => "attempt_in_flight",
            Self::WithdrawInFlight { .. } => "withdraw_in_flight",
            Self::DepositNotFound { .. } => "deposit_not_found",
            Self::NothingToWithdraw { .. } => "nothing_to_withdraw",
            Self::SessionClosed => "session_closed",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::DepositNotFound { .. } => 404,
            Self::AttemptInFlight { .. } | Self::WithdrawInFlight { .. } => 409,
            Self::SessionClosed => 410,
            Self::InsufficientBalance { .. }
            | Self::NothingToWithdraw { .. }
            | Self::NonceExhausted { .. }
            | Self::UserCancelled
            | Self::TransactionReverted { .. } => 422,
            Self::Submission { .. } => 502,
            Self::Network(_) => 503,
            Self::ConfirmationTimeout { .. } => 504,
        }
    }

    /// Failed before any chain write was attempted; nothing to re-check
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InsufficientBalance { .. }
                | Self::AttemptInFlight { .. }
                | Self::WithdrawInFlight { .. }
                | Self::DepositNotFound { .. }
                | Self::NothingToWithdraw { .. }
                | Self::SessionClosed
        )
    }

    /// Whether the caller may retry as-is. Fund-moving failures never qualify;
    /// they need a fresh state read and an explicit restart.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_error_codes() {
        let err = VaultError::Validation {
            message: "test".into(),
        };
        assert_eq!(err.error_code(), "validation_error");
        assert_eq!(err.status_code(), 400);
        assert!(err.is_local());

        let err = VaultError::InsufficientBalance {
            required: TokenAmount::new(100),
            available: TokenAmount::new(50),
        };
        assert_eq!(err.error_code(), "insufficient_balance");
        assert_eq!(err.status_code(), 422);
        assert!(err.is_local());
    }

    #[test]
    fn test_chain_facing_errors_are_not_local() {
        let timeout = VaultError::ConfirmationTimeout {
            tx_id: TxId::new("0xabc"),
            waited_secs: 900,
        };
        assert!(!timeout.is_local());
        assert!(!timeout.is_retryable());
        assert!(timeout.to_string().contains("re-check state"));

        let submission = VaultError::Submission {
            message: "bridge error".into(),
        };
        assert!(!submission.is_local());
        assert!(!submission.is_retryable());
    }

    #[test]
    fn test_network_retry_classification() {
        let transient = VaultError::Network(ChainError::Timeout { secs: 30 });
        assert!(transient.is_retryable());

        let revert = VaultError::Network(ChainError::Rpc {
            code: 3,
            message: "execution reverted".into(),
        });
        assert!(!revert.is_retryable());

        assert!(ChainError::HttpStatus { status: 503 }.is_transient());
        assert!(!ChainError::HttpStatus { status: 400 }.is_transient());
    }

    #[test]
    fn test_amount_error_becomes_validation() {
        let err: VaultError = AmountError::NotPositive.into();
        assert!(matches!(err, VaultError::Validation { .. }));
    }
}
