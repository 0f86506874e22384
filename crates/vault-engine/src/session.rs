//! Per-wallet session context
//!
//! A [`VaultSession`] is created when a wallet connects and closed when it
//! disconnects. It owns the cached chain snapshot and the per-deposit
//! withdraw exclusion set. The deposit serialization lock belongs to the
//! wallet and outlives any one session.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use evm_rpc_client::{ChainStateReader, TransactionStatusSource};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use vault_core::{
    AllowanceState, ContractConfig, Deposit, DepositId, MonitorConfig, TokenAmount, TxId,
    VaultError, WalletAddress,
};
use vault_tx::{unix_now_secs, TransactionKind};
use wallet_bridge::SigningBridge;

use crate::aggregator::{aggregate, PositionTotals};
use crate::bookkeeping::BookkeepingSink;
use crate::deposit::{DepositOrchestrator, DepositPhase, DepositReceipt};
use crate::monitor::{FailureReason, TransactionLifecycle, TransactionMonitor, TxStatus};
use crate::submitter::TransactionSubmitter;
use crate::withdraw::{WithdrawOrchestrator, WithdrawReceipt};

/// Collaborators shared by every session
#[derive(Clone)]
pub struct VaultContext {
    pub reader: Arc<dyn ChainStateReader>,
    pub tx_status: Arc<dyn TransactionStatusSource>,
    pub bridge: Arc<dyn SigningBridge>,
    pub bookkeeping: Arc<dyn BookkeepingSink>,
    pub contracts: ContractConfig,
    pub monitor: MonitorConfig,
    pub attempt_locks: AttemptLocks,
}

/// Deposit attempt locks keyed by wallet. Shared through [`VaultContext`],
/// so a reconnect does not hand out a second lock for the same wallet.
#[derive(Clone, Default)]
pub struct AttemptLocks {
    locks: Arc<Mutex<HashMap<WalletAddress, Arc<tokio::sync::Mutex<()>>>>>,
}

impl AttemptLocks {
    pub fn for_wallet(&self, wallet: &WalletAddress) -> Arc<tokio::sync::Mutex<()>> {
        lock(&*self.locks).entry(wallet.clone()).or_default().clone()
    }
}

/// Chain state for one wallet as of `fetched_at`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub balance: TokenAmount,
    /// Token allowance granted to the Permit2 contract
    pub permit2_allowance: AllowanceState,
    pub deposits: Vec<Deposit>,
    /// Unix seconds
    pub fetched_at: u64,
    /// Set once a write was attempted; the next read goes to the chain
    pub stale: bool,
}

/// Snapshot plus aggregate totals
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultPosition {
    pub wallet: WalletAddress,
    #[serde(flatten)]
    pub snapshot: ChainSnapshot,
    pub totals: PositionTotals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed {
        error_code: String,
        message: String,
        /// No chain write happened
        local: bool,
    },
}

/// Result of the most recent deposit or withdraw attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptReport {
    pub kind: TransactionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<TxId>,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub finished_at: u64,
}

impl AttemptReport {
    pub(crate) fn from_result<T>(
        kind: TransactionKind,
        result: &Result<T, VaultError>,
        tx_id: impl Fn(&T) -> TxId,
    ) -> Self {
        let (tx_id, outcome) = match result {
            Ok(value) => (Some(tx_id(value)), AttemptOutcome::Succeeded),
            Err(e) => (
                failed_tx_id(e),
                AttemptOutcome::Failed {
                    error_code: e.error_code().to_string(),
                    message: e.to_string(),
                    local: e.is_local(),
                },
            ),
        };
        Self {
            kind,
            tx_id,
            outcome,
            finished_at: unix_now_secs(),
        }
    }
}

fn failed_tx_id(e: &VaultError) -> Option<TxId> {
    match e {
        VaultError::ConfirmationTimeout { tx_id, .. }
        | VaultError::TransactionReverted { tx_id } => Some(tx_id.clone()),
        _ => None,
    }
}

/// Session state for the presentation layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub wallet: WalletAddress,
    pub connected_secs: u64,
    pub closed: bool,
    pub deposit_phase: DepositPhase,
    pub withdrawals_in_flight: Vec<DepositId>,
    pub transactions: Vec<TransactionLifecycle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<AttemptReport>,
    pub snapshot_stale: bool,
}

pub struct VaultSession {
    wallet: WalletAddress,
    context: VaultContext,
    submitter: TransactionSubmitter,
    monitor: TransactionMonitor,
    snapshot: RwLock<Option<ChainSnapshot>>,
    /// Deposits confirmed withdrawn; never shown again even if a lagging node reports them
    withdrawn: Mutex<HashSet<DepositId>>,
    /// Held for the whole of a deposit attempt; shared with later sessions of this wallet
    pub(crate) deposit_attempt: Arc<tokio::sync::Mutex<()>>,
    pub(crate) deposit_phase: watch::Sender<DepositPhase>,
    withdrawals: Mutex<HashSet<DepositId>>,
    tracked: Mutex<HashMap<TxId, watch::Receiver<TxStatus>>>,
    last_attempt: Mutex<Option<AttemptReport>>,
    closed: watch::Sender<bool>,
    connected_at: Instant,
}

impl VaultSession {
    pub fn new(wallet: WalletAddress, context: VaultContext) -> Self {
        let submitter = TransactionSubmitter::new(context.bridge.clone());
        let monitor = TransactionMonitor::new(context.tx_status.clone(), &context.monitor);
        let (deposit_phase, _) = watch::channel(DepositPhase::Idle);
        let (closed, _) = watch::channel(false);
        let deposit_attempt = context.attempt_locks.for_wallet(&wallet);

        tracing::info!(wallet = %wallet, "Session opened");

        Self {
            wallet,
            context,
            submitter,
            monitor,
            snapshot: RwLock::new(None),
            withdrawn: Mutex::new(HashSet::new()),
            deposit_attempt,
            deposit_phase,
            withdrawals: Mutex::new(HashSet::new()),
            tracked: Mutex::new(HashMap::new()),
            last_attempt: Mutex::new(None),
            closed,
            connected_at: Instant::now(),
        }
    }

    pub fn wallet(&self) -> &WalletAddress {
        &self.wallet
    }

    pub fn context(&self) -> &VaultContext {
        &self.context
    }

    pub(crate) fn submitter(&self) -> &TransactionSubmitter {
        &self.submitter
    }

    /// Deposit `input` (a decimal token amount)
    pub async fn deposit(&self, input: &str) -> Result<DepositReceipt, VaultError> {
        DepositOrchestrator::new(self).run(input).await
    }

    /// Withdraw one deposit in full
    pub async fn withdraw(&self, deposit_id: DepositId) -> Result<WithdrawReceipt, VaultError> {
        WithdrawOrchestrator::new(self).run(deposit_id).await
    }

    // =========================================================================
    // Chain state
    // =========================================================================

    /// Read balance, Permit2 allowance and active deposits from the chain
    pub async fn refresh(&self) -> Result<ChainSnapshot, VaultError> {
        let reader = &self.context.reader;
        let permit2 = &self.context.contracts.permit2;

        let (balance, permit2_allowance, deposits) = tokio::try_join!(
            reader.get_balance(&self.wallet),
            reader.get_allowance(&self.wallet, permit2),
            reader.get_active_deposits(&self.wallet),
        )?;

        let deposits = {
            let withdrawn = lock(&self.withdrawn);
            deposits
                .into_iter()
                .filter(|d| !withdrawn.contains(&d.id))
                .collect()
        };

        let snapshot = ChainSnapshot {
            balance,
            permit2_allowance,
            deposits,
            fetched_at: unix_now_secs(),
            stale: false,
        };
        *self.snapshot.write().await = Some(snapshot.clone());

        tracing::debug!(
            wallet = %self.wallet,
            balance = %snapshot.balance,
            deposits = snapshot.deposits.len(),
            "Chain state refreshed"
        );
        Ok(snapshot)
    }

    /// Cached snapshot, or a fresh one if missing or stale
    pub async fn ensure_fresh(&self) -> Result<ChainSnapshot, VaultError> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            if !snapshot.stale {
                return Ok(snapshot.clone());
            }
        }
        self.refresh().await
    }

    pub async fn snapshot(&self) -> Option<ChainSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Force the next read to hit the chain
    pub async fn mark_stale(&self) {
        if let Some(snapshot) = self.snapshot.write().await.as_mut() {
            snapshot.stale = true;
        }
    }

    pub async fn position(&self) -> Result<VaultPosition, VaultError> {
        let snapshot = self.ensure_fresh().await?;
        let totals = aggregate(&snapshot.deposits)?;
        Ok(VaultPosition {
            wallet: self.wallet.clone(),
            snapshot,
            totals,
        })
    }

    /// Refresh after a confirmed write. The write already succeeded, so a
    /// failed read only leaves the snapshot stale.
    pub(crate) async fn refresh_after_write(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(wallet = %self.wallet, "Post-confirmation refresh failed: {}", e);
            self.mark_stale().await;
        }
    }

    /// Drop a confirmed-withdrawn deposit for good
    pub(crate) async fn forget_deposit(&self, deposit_id: DepositId) {
        lock(&self.withdrawn).insert(deposit_id);
        if let Some(snapshot) = self.snapshot.write().await.as_mut() {
            snapshot.deposits.retain(|d| d.id != deposit_id);
        }
    }

    // =========================================================================
    // Confirmation tracking
    // =========================================================================

    /// Watch `tx_id` until it is confirmed, fails, or the session closes
    pub(crate) async fn await_confirmation(&self, tx_id: TxId) -> Result<u64, VaultError> {
        let mut handle = self.monitor.watch(tx_id.clone());
        lock(&self.tracked).insert(tx_id.clone(), handle.subscribe());
        let started = Instant::now();

        let status = self
            .unless_closed(async { Ok::<_, VaultError>(handle.wait().await) })
            .await;
        handle.stop();
        lock(&self.tracked).remove(&tx_id);

        match status? {
            TxStatus::Confirmed { block } => Ok(block),
            TxStatus::Failed(FailureReason::Reverted { .. }) => {
                Err(VaultError::TransactionReverted { tx_id })
            }
            TxStatus::Failed(FailureReason::Timeout { waited_secs }) => {
                Err(VaultError::ConfirmationTimeout { tx_id, waited_secs })
            }
            _ => Err(VaultError::ConfirmationTimeout {
                tx_id,
                waited_secs: started.elapsed().as_secs(),
            }),
        }
    }

    /// Run `work` until it finishes or the session closes. On close the
    /// future is dropped, which withdraws any signing request it holds.
    pub(crate) async fn unless_closed<T, F>(&self, work: F) -> Result<T, VaultError>
    where
        F: Future<Output = Result<T, VaultError>>,
    {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            result = work => result,
            // Checks the current value first, so a close that already happened is seen
            _ = closed.wait_for(|closed| *closed) => Err(VaultError::SessionClosed),
        }
    }

    // =========================================================================
    // Attempt bookkeeping
    // =========================================================================

    /// Claim `deposit_id` for a withdraw; released when the guard drops
    pub(crate) fn begin_withdraw(
        &self,
        deposit_id: DepositId,
    ) -> Result<WithdrawGuard<'_>, VaultError> {
        if !lock(&self.withdrawals).insert(deposit_id) {
            return Err(VaultError::WithdrawInFlight { deposit_id });
        }
        Ok(WithdrawGuard {
            session: self,
            deposit_id,
        })
    }

    pub(crate) fn record_attempt(&self, report: AttemptReport) {
        *lock(&self.last_attempt) = Some(report);
    }

    pub fn deposit_phase(&self) -> DepositPhase {
        self.deposit_phase.borrow().clone()
    }

    pub fn subscribe_deposit_phase(&self) -> watch::Receiver<DepositPhase> {
        self.deposit_phase.subscribe()
    }

    pub fn last_attempt(&self) -> Option<AttemptReport> {
        lock(&self.last_attempt).clone()
    }

    pub fn withdrawals_in_flight(&self) -> Vec<DepositId> {
        let mut ids: Vec<DepositId> = lock(&self.withdrawals).iter().copied().collect();
        ids.sort();
        ids
    }

    pub async fn status(&self) -> SessionStatus {
        let transactions = lock(&self.tracked)
            .iter()
            .map(|(id, rx)| TransactionLifecycle {
                id: id.clone(),
                status: rx.borrow().clone(),
            })
            .collect();

        SessionStatus {
            wallet: self.wallet.clone(),
            connected_secs: self.connected_at.elapsed().as_secs(),
            closed: self.is_closed(),
            deposit_phase: self.deposit_phase(),
            withdrawals_in_flight: self.withdrawals_in_flight(),
            transactions,
            last_attempt: self.last_attempt(),
            snapshot_stale: self
                .snapshot
                .read()
                .await
                .as_ref()
                .map(|s| s.stale)
                .unwrap_or(true),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn ensure_open(&self) -> Result<(), VaultError> {
        if self.is_closed() {
            return Err(VaultError::SessionClosed);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Tear down: new operations are refused, signing and confirmation
    /// waits stop. Already-submitted transactions are unaffected on-chain.
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            tracing::info!(wallet = %self.wallet, "Session closed");
        }
    }
}

/// Withdraw exclusion for one deposit id
pub(crate) struct WithdrawGuard<'a> {
    session: &'a VaultSession,
    deposit_id: DepositId,
}

impl Drop for WithdrawGuard<'_> {
    fn drop(&mut self) {
        lock(&self.session.withdrawals).remove(&self.deposit_id);
    }
}

/// Lock, recovering from poisoning; the guarded data stays consistent
/// because no critical section here can panic midway.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deposit, FakeBridge, FakeChain, Harness, ONE_TOKEN};

    #[tokio::test]
    async fn test_refresh_reads_everything() {
        let chain = FakeChain::with_balance(ONE_TOKEN);
        chain.set_deposits(vec![deposit(1, 100, 110), deposit(2, 50, 45)]);
        let h = Harness::new(chain, FakeBridge::default());

        let position = h.session.position().await.unwrap();
        assert_eq!(position.snapshot.balance, TokenAmount::new(ONE_TOKEN));
        assert_eq!(position.totals.total_profit_percentage, 3.33);
        assert_eq!(
            position.snapshot.permit2_allowance.spender,
            h.session.context().contracts.permit2
        );

        // Cached until marked stale
        h.session.position().await.unwrap();
        assert_eq!(h.chain.balance_reads(), 1);
        h.session.mark_stale().await;
        h.session.position().await.unwrap();
        assert_eq!(h.chain.balance_reads(), 2);
    }

    #[tokio::test]
    async fn test_refresh_network_error_is_retryable() {
        let chain = FakeChain::with_balance(ONE_TOKEN);
        chain.fail_reads(1);
        let h = Harness::new(chain, FakeBridge::default());

        let err = h.session.refresh().await.unwrap_err();
        assert!(matches!(err, VaultError::Network(_)));
        assert!(err.is_retryable());
        assert!(h.session.refresh().await.is_ok());
    }

    #[tokio::test]
    async fn test_forgotten_deposit_stays_gone() {
        let chain = FakeChain::with_balance(ONE_TOKEN);
        chain.set_deposits(vec![deposit(1, 100, 110), deposit(2, 50, 45)]);
        let h = Harness::new(chain, FakeBridge::default());

        h.session.refresh().await.unwrap();
        h.session.forget_deposit(DepositId(1)).await;
        // Lagging node still reports it
        let snapshot = h.session.refresh().await.unwrap();
        assert_eq!(snapshot.deposits.len(), 1);
        assert_eq!(snapshot.deposits[0].id, DepositId(2));
    }

    #[tokio::test]
    async fn test_closed_session_refuses_work() {
        let h = Harness::new(FakeChain::with_balance(ONE_TOKEN), FakeBridge::default());
        h.session.close();
        assert!(matches!(
            h.session.deposit("0.1").await,
            Err(VaultError::SessionClosed)
        ));
        assert!(matches!(
            h.session.withdraw(DepositId(1)).await,
            Err(VaultError::SessionClosed)
        ));
        assert!(h.session.status().await.closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_before_confirmation_wait_is_seen() {
        let chain = FakeChain::with_balance(ONE_TOKEN);
        chain.set_default_tx_status(evm_rpc_client::ChainTxStatus::Seen);
        let h = Harness::new(chain, FakeBridge::default());

        // Closed after the open check but before the wait starts
        h.session.ensure_open().unwrap();
        h.session.close();
        let started = tokio::time::Instant::now();
        let err = h
            .session
            .await_confirmation(TxId::new("0xlate"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::SessionClosed));
        assert!(started.elapsed() < std::time::Duration::from_secs(60));
        assert!(h.session.status().await.transactions.is_empty());
    }

    #[test]
    fn test_attempt_lock_is_per_wallet() {
        let locks = AttemptLocks::default();
        let a = vault_core::Address::new(crate::testing::WALLET);
        let b = vault_core::Address::new("0x2222222222222222222222222222222222222222");
        assert!(Arc::ptr_eq(&locks.for_wallet(&a), &locks.for_wallet(&a)));
        assert!(!Arc::ptr_eq(&locks.for_wallet(&a), &locks.for_wallet(&b)));
    }

    #[test]
    fn test_withdraw_guard_releases() {
        let h = Harness::new(FakeChain::default(), FakeBridge::default());
        let guard = h.session.begin_withdraw(DepositId(4)).unwrap();
        assert!(matches!(
            h.session.begin_withdraw(DepositId(4)),
            Err(VaultError::WithdrawInFlight { .. })
        ));
        assert!(h.session.begin_withdraw(DepositId(5)).is_ok());
        assert_eq!(h.session.withdrawals_in_flight(), vec![DepositId(4)]);
        drop(guard);
        assert!(h.session.withdrawals_in_flight().is_empty());
    }
}
