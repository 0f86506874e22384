//! Deposit flow
//!
//! validate -> balance check -> nonce -> permit -> submit -> record -> confirm.
//! At most one attempt runs per wallet, across reconnects; a second one is
//! rejected, not queued.

use serde::Serialize;
use tokio::sync::{watch, OwnedMutexGuard};
use uuid::Uuid;
use vault_core::constants::NONCE_WORD_POSITION;
use vault_core::{amount, TokenAmount, TxId, VaultError};
use vault_tx::{allocate_nonce, Nonce, PermitBuilder, TransactionKind, TransactionSpec};

use crate::bookkeeping::{record_best_effort, DepositRecord};
use crate::session::{AttemptReport, VaultSession};

/// Where the current deposit attempt is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DepositPhase {
    Idle,
    Validating,
    AllocatingNonce,
    AwaitingSignature,
    Submitted { tx_id: TxId },
    Confirming { tx_id: TxId },
    Succeeded { tx_id: TxId },
    Failed { error_code: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReceipt {
    pub tx_id: TxId,
    pub amount: TokenAmount,
    pub nonce: Nonce,
    /// Permit deadline, unix seconds
    pub deadline: u64,
    pub block: u64,
}

pub struct DepositOrchestrator<'a> {
    session: &'a VaultSession,
}

/// Holds the wallet's deposit lock; phase falls back to `Idle` on drop
struct Attempt<'a> {
    id: Uuid,
    phase: &'a watch::Sender<DepositPhase>,
    _lock: OwnedMutexGuard<()>,
}

impl Attempt<'_> {
    fn enter(&self, phase: DepositPhase) {
        tracing::debug!(attempt = %self.id, phase = ?phase, "Deposit phase");
        self.phase.send_replace(phase);
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(DepositPhase::Idle);
    }
}

impl<'a> DepositOrchestrator<'a> {
    pub fn new(session: &'a VaultSession) -> Self {
        Self { session }
    }

    /// Run one deposit of `input` tokens (decimal string)
    pub async fn run(&self, input: &str) -> Result<DepositReceipt, VaultError> {
        let session = self.session;
        session.ensure_open()?;

        let lock = session
            .deposit_attempt
            .clone()
            .try_lock_owned()
            .map_err(|_| VaultError::AttemptInFlight {
                wallet: session.wallet().to_string(),
            })?;
        let attempt = Attempt {
            id: Uuid::new_v4(),
            phase: &session.deposit_phase,
            _lock: lock,
        };

        tracing::info!(attempt = %attempt.id, wallet = %session.wallet(), input, "Deposit started");
        let result = self.execute(&attempt, input).await;

        match &result {
            Ok(receipt) => {
                attempt.enter(DepositPhase::Succeeded {
                    tx_id: receipt.tx_id.clone(),
                });
                tracing::info!(attempt = %attempt.id, tx_id = %receipt.tx_id, "Deposit confirmed");
            }
            Err(e) if e.is_local() => {
                tracing::info!(attempt = %attempt.id, "Deposit refused: {}", e);
            }
            Err(e) => {
                attempt.enter(DepositPhase::Failed {
                    error_code: e.error_code().to_string(),
                });
                tracing::warn!(attempt = %attempt.id, "Deposit failed: {}", e);
            }
        }
        session.record_attempt(AttemptReport::from_result(
            TransactionKind::Deposit,
            &result,
            |r| r.tx_id.clone(),
        ));

        result
    }

    async fn execute(&self, attempt: &Attempt<'_>, input: &str) -> Result<DepositReceipt, VaultError> {
        let session = self.session;
        let context = session.context();
        let contracts = &context.contracts;

        attempt.enter(DepositPhase::Validating);
        let amount = amount::parse_positive_units(input, contracts.token_decimals)?;

        let snapshot = session.ensure_fresh().await?;
        if amount > snapshot.balance {
            return Err(VaultError::InsufficientBalance {
                required: amount,
                available: snapshot.balance,
            });
        }

        // Always read the bitmap fresh: a cached one may hand out a spent nonce
        attempt.enter(DepositPhase::AllocatingNonce);
        let bitmap = context
            .reader
            .get_nonce_bitmap(session.wallet(), NONCE_WORD_POSITION)
            .await?;
        let nonce = allocate_nonce(&bitmap, NONCE_WORD_POSITION)?;

        let permit = PermitBuilder::new(contracts.token.clone(), contracts.vault.clone())
            .build(amount, nonce)?;
        let spec = TransactionSpec::deposit(session.wallet().clone(), contracts.vault.clone(), &permit);

        attempt.enter(DepositPhase::AwaitingSignature);
        // From here on the chain may change under us, whatever the outcome
        session.mark_stale().await;
        let tx_id = session
            .unless_closed(session.submitter().submit(spec))
            .await?;

        attempt.enter(DepositPhase::Submitted {
            tx_id: tx_id.clone(),
        });
        record_best_effort(
            context.bookkeeping.as_ref(),
            &DepositRecord {
                deposit_amount: amount,
                wallet_address: session.wallet().clone(),
                transaction_id: tx_id.clone(),
            },
        )
        .await;

        attempt.enter(DepositPhase::Confirming {
            tx_id: tx_id.clone(),
        });
        let block = session.await_confirmation(tx_id.clone()).await?;
        session.refresh_after_write().await;

        Ok(DepositReceipt {
            tx_id,
            amount,
            nonce,
            deadline: permit.deadline,
            block,
        })
    }
}
