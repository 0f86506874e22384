//! vault-engine: session state and the deposit/withdraw orchestrators
//!
//! A [`VaultSession`] ties one connected wallet to the chain reader, the
//! signing bridge and the confirmation monitor. Everything the presentation
//! layer needs goes through it.

pub mod aggregator;
pub mod bookkeeping;
pub mod deposit;
pub mod monitor;
pub mod session;
pub mod submitter;
pub mod withdraw;

#[cfg(test)]
mod testing;

pub use aggregator::{aggregate, PositionTotals};
pub use bookkeeping::{BookkeepingError, BookkeepingSink, DepositRecord, HttpBookkeeping, NoopBookkeeping};
pub use deposit::{DepositOrchestrator, DepositPhase, DepositReceipt};
pub use monitor::{FailureReason, MonitorHandle, TransactionLifecycle, TransactionMonitor, TxStatus};
pub use session::{
    AttemptLocks, AttemptOutcome, AttemptReport, ChainSnapshot, SessionStatus, VaultContext,
    VaultPosition, VaultSession,
};
pub use submitter::TransactionSubmitter;
pub use withdraw::{WithdrawOrchestrator, WithdrawReceipt};
