//! Typed chain reads
//!
//! [`ChainStateReader`] is the read seam the vault workflows depend on; the
//! JSON-RPC client implements it, tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vault_core::{Address, AllowanceState, Deposit, NonceBitmap, TokenAmount, TxId};

use crate::abi::{self, selectors, Token};
use crate::retry::with_retry;
use crate::{parse_quantity, Result, RpcClient};

/// Read-only view of token, allowance, vault and Permit2 nonce state.
///
/// Every call reflects the latest block at call time; nothing is cached.
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    /// Token balance of `owner`
    async fn get_balance(&self, owner: &Address) -> Result<TokenAmount>;

    /// Token allowance from `owner` to `spender`
    async fn get_allowance(&self, owner: &Address, spender: &Address) -> Result<AllowanceState>;

    /// Active vault deposits of `owner`
    async fn get_active_deposits(&self, owner: &Address) -> Result<Vec<Deposit>>;

    /// Permit2 nonce bitmap word `word_position` for `owner`
    async fn get_nonce_bitmap(&self, owner: &Address, word_position: u64) -> Result<NonceBitmap>;
}

/// What the chain currently knows about a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChainTxStatus {
    /// Not known to the node
    Unknown,
    /// Known but not yet in a block
    Seen,
    /// Included in `block`; `success` is false for a reverted call
    Mined { success: bool, block: u64 },
}

/// Lookup of a broadcast transaction by id
#[async_trait]
pub trait TransactionStatusSource: Send + Sync {
    async fn transaction_status(&self, tx_id: &TxId) -> Result<ChainTxStatus>;
}

impl RpcClient {
    async fn read_call(&self, label: &str, to: &Address, data: String) -> Result<Vec<u8>> {
        with_retry(self.retry_policy(), label, || self.eth_call(to, &data)).await
    }
}

#[async_trait]
impl ChainStateReader for RpcClient {
    async fn get_balance(&self, owner: &Address) -> Result<TokenAmount> {
        let data = abi::encode_call(selectors::BALANCE_OF, &[Token::Address(owner)])?;
        let token = self.contracts().token.clone();
        let raw = self.read_call("balanceOf", &token, data).await?;
        abi::decode_amount(&raw, "balance")
    }

    async fn get_allowance(&self, owner: &Address, spender: &Address) -> Result<AllowanceState> {
        let data = abi::encode_call(
            selectors::ALLOWANCE,
            &[Token::Address(owner), Token::Address(spender)],
        )?;
        let token = self.contracts().token.clone();
        let raw = self.read_call("allowance", &token, data).await?;
        let word = abi::word_at(&raw, 0)?;

        Ok(AllowanceState {
            owner: owner.clone(),
            spender: spender.clone(),
            amount: TokenAmount::new(abi::word_to_u128_saturating(&word)),
        })
    }

    async fn get_active_deposits(&self, owner: &Address) -> Result<Vec<Deposit>> {
        let data = abi::encode_call(
            selectors::GET_USER_ACTIVE_DEPOSITS,
            &[Token::Address(owner)],
        )?;
        let vault = self.contracts().vault.clone();
        let raw = self.read_call("getUserActiveDeposits", &vault, data).await?;
        abi::decode_active_deposits(&raw)
    }

    async fn get_nonce_bitmap(&self, owner: &Address, word_position: u64) -> Result<NonceBitmap> {
        let data = abi::encode_call(
            selectors::GET_NONCE_BITMAP,
            &[Token::Address(owner), Token::Uint(word_position as u128)],
        )?;
        let vault = self.contracts().vault.clone();
        let raw = self.read_call("getNonceBitmap", &vault, data).await?;
        abi::decode_bitmap(&raw)
    }
}

#[async_trait]
impl TransactionStatusSource for RpcClient {
    async fn transaction_status(&self, tx_id: &TxId) -> Result<ChainTxStatus> {
        let params = serde_json::json!([tx_id.as_str()]);

        let receipt = self
            .request("eth_getTransactionReceipt", params.clone())
            .await?;
        if let Some(status) = parse_receipt(&receipt)? {
            return Ok(status);
        }

        let tx = self.request("eth_getTransactionByHash", params).await?;
        Ok(if tx.is_null() {
            ChainTxStatus::Unknown
        } else {
            ChainTxStatus::Seen
        })
    }
}

/// Receipt JSON -> status; `None` when no receipt exists yet
fn parse_receipt(receipt: &serde_json::Value) -> Result<Option<ChainTxStatus>> {
    if receipt.is_null() {
        return Ok(None);
    }
    // Some nodes return a receipt stub for pending transactions
    if receipt["blockNumber"].is_null() {
        return Ok(Some(ChainTxStatus::Seen));
    }

    let block = parse_quantity(&receipt["blockNumber"], "blockNumber")?;
    let success = parse_quantity(&receipt["status"], "status")? == 1;
    Ok(Some(ChainTxStatus::Mined { success, block }))
}
