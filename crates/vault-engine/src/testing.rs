//! In-memory fakes for the engine's seams

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use evm_rpc_client::{ChainStateReader, ChainTxStatus, TransactionStatusSource};
use tokio::sync::{Notify, Semaphore};
use vault_core::{
    Address, AllowanceState, ChainError, ContractConfig, Deposit, DepositId, MonitorConfig,
    NonceBitmap, TokenAmount, TxId,
};
use vault_tx::TransactionSpec;
use wallet_bridge::{BridgeError, SigningBridge, SubmitResult};

use crate::bookkeeping::{BookkeepingError, BookkeepingSink, DepositRecord};
use crate::session::{AttemptLocks, VaultContext, VaultSession};

pub const WALLET: &str = "0x1111111111111111111111111111111111111111";
pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

struct ChainState {
    balance: TokenAmount,
    allowance: TokenAmount,
    deposits: Vec<Deposit>,
    bitmap: NonceBitmap,
    tx_statuses: HashMap<String, ChainTxStatus>,
    default_tx_status: ChainTxStatus,
    failing_status_polls: usize,
    failing_reads: usize,
}

/// Chain double: answers reads from memory, counts calls
pub struct FakeChain {
    state: Mutex<ChainState>,
    balance_reads: AtomicUsize,
    bitmap_reads: AtomicUsize,
    status_polls: AtomicUsize,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            state: Mutex::new(ChainState {
                balance: TokenAmount::ZERO,
                allowance: TokenAmount::ZERO,
                deposits: Vec::new(),
                bitmap: NonceBitmap::EMPTY,
                tx_statuses: HashMap::new(),
                default_tx_status: ChainTxStatus::Mined {
                    success: true,
                    block: 1,
                },
                failing_status_polls: 0,
                failing_reads: 0,
            }),
            balance_reads: AtomicUsize::new(0),
            bitmap_reads: AtomicUsize::new(0),
            status_polls: AtomicUsize::new(0),
        }
    }
}

impl FakeChain {
    pub fn with_balance(balance: u128) -> Self {
        let chain = Self::default();
        chain.set_balance(balance);
        chain
    }

    pub fn set_balance(&self, balance: u128) {
        self.state.lock().unwrap().balance = TokenAmount::new(balance);
    }

    pub fn set_deposits(&self, deposits: Vec<Deposit>) {
        self.state.lock().unwrap().deposits = deposits;
    }

    pub fn set_bitmap(&self, bitmap: NonceBitmap) {
        self.state.lock().unwrap().bitmap = bitmap;
    }

    pub fn set_tx_status(&self, tx_id: &str, status: ChainTxStatus) {
        self.state
            .lock()
            .unwrap()
            .tx_statuses
            .insert(tx_id.to_string(), status);
    }

    /// Status for transactions without an explicit entry
    pub fn set_default_tx_status(&self, status: ChainTxStatus) {
        self.state.lock().unwrap().default_tx_status = status;
    }

    pub fn fail_status_polls(&self, count: usize) {
        self.state.lock().unwrap().failing_status_polls = count;
    }

    /// Next `count` state reads fail with a transient error
    pub fn fail_reads(&self, count: usize) {
        self.state.lock().unwrap().failing_reads = count;
    }

    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }

    pub fn bitmap_reads(&self) -> usize {
        self.bitmap_reads.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> usize {
        self.status_polls.load(Ordering::SeqCst)
    }

    fn maybe_fail(&self) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(ChainError::Timeout { secs: 30 });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainStateReader for FakeChain {
    async fn get_balance(&self, _owner: &Address) -> Result<TokenAmount, ChainError> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        Ok(self.state.lock().unwrap().balance)
    }

    async fn get_allowance(
        &self,
        owner: &Address,
        spender: &Address,
    ) -> Result<AllowanceState, ChainError> {
        self.maybe_fail()?;
        Ok(AllowanceState {
            owner: owner.clone(),
            spender: spender.clone(),
            amount: self.state.lock().unwrap().allowance,
        })
    }

    async fn get_active_deposits(&self, _owner: &Address) -> Result<Vec<Deposit>, ChainError> {
        self.maybe_fail()?;
        Ok(self.state.lock().unwrap().deposits.clone())
    }

    async fn get_nonce_bitmap(
        &self,
        _owner: &Address,
        _word_position: u64,
    ) -> Result<NonceBitmap, ChainError> {
        self.bitmap_reads.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        Ok(self.state.lock().unwrap().bitmap)
    }
}

#[async_trait]
impl TransactionStatusSource for FakeChain {
    async fn transaction_status(&self, tx_id: &TxId) -> Result<ChainTxStatus, ChainError> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.failing_status_polls > 0 {
            state.failing_status_polls -= 1;
            return Err(ChainError::HttpStatus { status: 503 });
        }
        Ok(state
            .tx_statuses
            .get(tx_id.as_str())
            .cloned()
            .unwrap_or_else(|| state.default_tx_status.clone()))
    }
}

/// Bridge double: scripted answers, optional gate to hold submissions open
pub struct FakeBridge {
    responses: Mutex<VecDeque<Result<SubmitResult, BridgeError>>>,
    submitted: Mutex<Vec<TransactionSpec>>,
    gate: Option<Arc<Semaphore>>,
    entered: Arc<Notify>,
    counter: AtomicUsize,
}

impl Default for FakeBridge {
    fn default() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            gate: None,
            entered: Arc::new(Notify::new()),
            counter: AtomicUsize::new(0),
        }
    }
}

impl FakeBridge {
    /// Submissions block until [`FakeBridge::release`] is called
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn push_response(&self, response: Result<SubmitResult, BridgeError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Resolves once a submission has reached the bridge
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn submitted(&self) -> Vec<TransactionSpec> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SigningBridge for FakeBridge {
    async fn submit(&self, spec: TransactionSpec) -> Result<SubmitResult, BridgeError> {
        self.submitted.lock().unwrap().push(spec);
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let scripted = self.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(SubmitResult::success(format!("0xtx{}", n)))
        })
    }
}

/// Bookkeeping double
#[derive(Default)]
pub struct RecordingBookkeeping {
    pub records: Mutex<Vec<DepositRecord>>,
    pub fail: bool,
}

#[async_trait]
impl BookkeepingSink for RecordingBookkeeping {
    async fn record(&self, record: &DepositRecord) -> Result<(), BookkeepingError> {
        if self.fail {
            return Err(BookkeepingError::Status { status: 500 });
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub fn deposit(id: u64, deposited: u128, withdrawable: u128) -> Deposit {
    Deposit {
        id: DepositId(id),
        deposited_amount: TokenAmount::new(deposited),
        withdrawable_amount: TokenAmount::new(withdrawable),
        timestamp: 1_700_000_000,
    }
}

/// Everything a session test needs to poke at
pub struct Harness {
    pub chain: Arc<FakeChain>,
    pub bridge: Arc<FakeBridge>,
    pub bookkeeping: Arc<RecordingBookkeeping>,
    pub session: Arc<VaultSession>,
}

impl Harness {
    pub fn new(chain: FakeChain, bridge: FakeBridge) -> Self {
        Self::with_bookkeeping(chain, bridge, RecordingBookkeeping::default())
    }

    pub fn with_bookkeeping(
        chain: FakeChain,
        bridge: FakeBridge,
        bookkeeping: RecordingBookkeeping,
    ) -> Self {
        let chain = Arc::new(chain);
        let bridge = Arc::new(bridge);
        let bookkeeping = Arc::new(bookkeeping);

        let context = VaultContext {
            reader: chain.clone(),
            tx_status: chain.clone(),
            bridge: bridge.clone(),
            bookkeeping: bookkeeping.clone(),
            contracts: ContractConfig::default(),
            monitor: MonitorConfig {
                poll_interval_ms: 1_000,
                max_wait_secs: 60,
            },
            attempt_locks: AttemptLocks::default(),
        };
        let session = Arc::new(VaultSession::new(Address::new(WALLET), context));

        Self {
            chain,
            bridge,
            bookkeeping,
            session,
        }
    }

    /// A new session for the same wallet over the same context
    pub fn reconnect(&self) -> Arc<VaultSession> {
        Arc::new(VaultSession::new(
            self.session.wallet().clone(),
            self.session.context().clone(),
        ))
    }
}
