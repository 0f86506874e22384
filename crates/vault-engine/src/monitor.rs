//! Confirmation tracking for submitted transactions
//!
//! Each watched transaction gets its own polling task with a hard deadline.
//! The task is owned by a [`MonitorHandle`]; stopping or dropping the handle
//! ends polling immediately.

use std::sync::Arc;
use std::time::Duration;

use evm_rpc_client::{ChainTxStatus, TransactionStatusSource};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use vault_core::{MonitorConfig, TxId};

/// Why a transaction ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// Mined with a failing receipt
    Reverted { block: u64 },
    /// Gave up waiting. The transaction may still land later.
    Timeout { waited_secs: u64 },
}

/// Lifecycle of one transaction id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    /// Id received, tracking not started yet
    Pending,
    /// Tracking accepted; waiting for inclusion
    Confirming,
    Confirmed { block: u64 },
    Failed(FailureReason),
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::Failed(_))
    }
}

/// A transaction id plus its current status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionLifecycle {
    pub id: TxId,
    #[serde(flatten)]
    pub status: TxStatus,
}

/// Spawns watchers over a shared status source
#[derive(Clone)]
pub struct TransactionMonitor {
    source: Arc<dyn TransactionStatusSource>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl TransactionMonitor {
    pub fn new(source: Arc<dyn TransactionStatusSource>, config: &MonitorConfig) -> Self {
        Self {
            source,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_wait: Duration::from_secs(config.max_wait_secs),
        }
    }

    /// Start tracking `tx_id`
    pub fn watch(&self, tx_id: TxId) -> MonitorHandle {
        let (status_tx, status_rx) = watch::channel(TxStatus::Pending);

        let task = tokio::spawn(poll_until_terminal(
            self.source.clone(),
            tx_id.clone(),
            self.poll_interval,
            self.max_wait,
            status_tx,
        ));

        MonitorHandle {
            tx_id,
            status_rx,
            task,
        }
    }
}

/// Owner of one watcher task
pub struct MonitorHandle {
    tx_id: TxId,
    status_rx: watch::Receiver<TxStatus>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn tx_id(&self) -> &TxId {
        &self.tx_id
    }

    pub fn status(&self) -> TxStatus {
        self.status_rx.borrow().clone()
    }

    pub fn lifecycle(&self) -> TransactionLifecycle {
        TransactionLifecycle {
            id: self.tx_id.clone(),
            status: self.status(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TxStatus> {
        self.status_rx.clone()
    }

    /// Wait for a terminal status. Returns the last known status if the
    /// watcher is stopped first.
    pub async fn wait(&mut self) -> TxStatus {
        loop {
            let current = self.status_rx.borrow_and_update().clone();
            if current.is_terminal() {
                return current;
            }
            if self.status_rx.changed().await.is_err() {
                return self.status_rx.borrow().clone();
            }
        }
    }

    /// Stop polling. The status freezes at its current value.
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_until_terminal(
    source: Arc<dyn TransactionStatusSource>,
    tx_id: TxId,
    poll_interval: Duration,
    max_wait: Duration,
    status_tx: watch::Sender<TxStatus>,
) {
    let started = Instant::now();
    let deadline = started + max_wait;

    status_tx.send_replace(TxStatus::Confirming);
    tracing::debug!(tx_id = %tx_id, "Tracking transaction");

    loop {
        match source.transaction_status(&tx_id).await {
            Ok(ChainTxStatus::Mined {
                success: true,
                block,
            }) => {
                tracing::info!(tx_id = %tx_id, block, "Transaction confirmed");
                status_tx.send_replace(TxStatus::Confirmed { block });
                return;
            }
            Ok(ChainTxStatus::Mined {
                success: false,
                block,
            }) => {
                tracing::warn!(tx_id = %tx_id, block, "Transaction reverted");
                status_tx.send_replace(TxStatus::Failed(FailureReason::Reverted { block }));
                return;
            }
            Ok(ChainTxStatus::Seen) | Ok(ChainTxStatus::Unknown) => {}
            Err(e) => {
                // Transient or not, a failed poll never decides the outcome
                tracing::warn!(tx_id = %tx_id, "Status poll failed: {}", e);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            let waited_secs = now.duration_since(started).as_secs();
            tracing::warn!(
                tx_id = %tx_id,
                waited_secs,
                "Gave up waiting for confirmation; transaction may still land"
            );
            status_tx.send_replace(TxStatus::Failed(FailureReason::Timeout { waited_secs }));
            return;
        }

        tokio::time::sleep_until((now + poll_interval).min(deadline)).await;
    }
}
