//! Withdraw flow
//!
//! Withdrawals of different deposits may run side by side; a second
//! withdrawal of the same deposit is refused while the first is in flight.

use serde::Serialize;
use vault_core::{DepositId, TokenAmount, TxId, VaultError};
use vault_tx::{TransactionKind, TransactionSpec};

use crate::session::{AttemptReport, VaultSession};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawReceipt {
    pub deposit_id: DepositId,
    pub tx_id: TxId,
    /// Withdrawable amount as last read before submission
    pub amount: TokenAmount,
    pub block: u64,
}

pub struct WithdrawOrchestrator<'a> {
    session: &'a VaultSession,
}

impl<'a> WithdrawOrchestrator<'a> {
    pub fn new(session: &'a VaultSession) -> Self {
        Self { session }
    }

    pub async fn run(&self, deposit_id: DepositId) -> Result<WithdrawReceipt, VaultError> {
        let session = self.session;
        session.ensure_open()?;
        let _guard = session.begin_withdraw(deposit_id)?;

        tracing::info!(wallet = %session.wallet(), deposit_id = %deposit_id, "Withdraw started");
        let result = self.execute(deposit_id).await;

        match &result {
            Ok(receipt) => tracing::info!(
                deposit_id = %deposit_id,
                tx_id = %receipt.tx_id,
                "Withdraw confirmed"
            ),
            Err(e) if e.is_local() => {
                tracing::info!(deposit_id = %deposit_id, "Withdraw refused: {}", e)
            }
            Err(e) => tracing::warn!(deposit_id = %deposit_id, "Withdraw failed: {}", e),
        }
        session.record_attempt(AttemptReport::from_result(
            TransactionKind::Withdraw,
            &result,
            |r| r.tx_id.clone(),
        ));

        result
    }

    async fn execute(&self, deposit_id: DepositId) -> Result<WithdrawReceipt, VaultError> {
        let session = self.session;
        let vault = session.context().contracts.vault.clone();

        let snapshot = session.ensure_fresh().await?;
        let deposit = snapshot
            .deposits
            .iter()
            .find(|d| d.id == deposit_id)
            .ok_or(VaultError::DepositNotFound { deposit_id })?;
        if !deposit.is_withdrawable() {
            return Err(VaultError::NothingToWithdraw { deposit_id });
        }
        let amount = deposit.withdrawable_amount;

        let spec = TransactionSpec::withdraw(session.wallet().clone(), vault, deposit_id);
        session.mark_stale().await;
        let tx_id = session
            .unless_closed(session.submitter().submit(spec))
            .await?;

        let block = session.await_confirmation(tx_id.clone()).await?;
        session.forget_deposit(deposit_id).await;
        session.refresh_after_write().await;

        Ok(WithdrawReceipt {
            deposit_id,
            tx_id,
            amount,
            block,
        })
    }
}
