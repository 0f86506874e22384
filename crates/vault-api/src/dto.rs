//! Data Transfer Objects for API requests and responses

use serde::{Deserialize, Serialize};
use vault_core::{amount, ContractConfig, Deposit, DepositId, TokenAmount, TxId};
use vault_engine::{DepositReceipt, PositionTotals, VaultPosition, WithdrawReceipt};

/// Fractional digits shown in formatted amounts
pub const DISPLAY_DECIMALS: usize = 4;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions: usize,
}

impl HealthResponse {
    pub fn new(sessions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sessions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub wallet: String,
    pub display_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectResponse {
    pub disconnected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Decimal token amount, e.g. "0.5"
    pub amount: String,
}

/// One deposit with display fields
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositView {
    pub id: DepositId,
    pub deposited_amount: TokenAmount,
    pub deposited_formatted: String,
    pub withdrawable_amount: TokenAmount,
    pub withdrawable_formatted: String,
    pub profit_formatted: String,
    pub profit_percentage: f64,
    pub timestamp: u64,
    pub withdrawable: bool,
}

impl DepositView {
    fn new(deposit: &Deposit, decimals: u32) -> Self {
        Self {
            id: deposit.id,
            deposited_amount: deposit.deposited_amount,
            deposited_formatted: format(deposit.deposited_amount, decimals),
            withdrawable_amount: deposit.withdrawable_amount,
            withdrawable_formatted: format(deposit.withdrawable_amount, decimals),
            profit_formatted: format_signed(deposit.profit(), decimals),
            profit_percentage: deposit.profit_percentage(),
            timestamp: deposit.timestamp,
            withdrawable: deposit.is_withdrawable(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub wallet: String,
    pub display_address: String,
    pub symbol: String,
    pub balance: TokenAmount,
    pub balance_formatted: String,
    /// Largest input the deposit form accepts ("MAX")
    pub max_deposit_input: String,
    pub permit2_allowance: TokenAmount,
    pub deposits: Vec<DepositView>,
    pub totals: PositionTotals,
    pub total_deposited_formatted: String,
    pub total_withdrawable_formatted: String,
    pub total_profit_formatted: String,
    pub fetched_at: u64,
}

impl PositionResponse {
    pub fn new(position: &VaultPosition, contracts: &ContractConfig) -> Self {
        let decimals = contracts.token_decimals;
        let snapshot = &position.snapshot;
        Self {
            wallet: position.wallet.to_string(),
            display_address: position.wallet.truncated(),
            symbol: contracts.token_symbol.clone(),
            balance: snapshot.balance,
            balance_formatted: format(snapshot.balance, decimals),
            max_deposit_input: amount::max_deposit_input(snapshot.balance, decimals),
            permit2_allowance: snapshot.permit2_allowance.amount,
            deposits: snapshot
                .deposits
                .iter()
                .map(|d| DepositView::new(d, decimals))
                .collect(),
            totals: position.totals.clone(),
            total_deposited_formatted: format(position.totals.total_deposited, decimals),
            total_withdrawable_formatted: format(position.totals.total_withdrawable, decimals),
            total_profit_formatted: format_signed(position.totals.total_profit, decimals),
            fetched_at: snapshot.fetched_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub tx_id: TxId,
    pub amount: TokenAmount,
    pub amount_formatted: String,
    /// Decimal string
    pub nonce: String,
    pub deadline: u64,
    pub block: u64,
}

impl DepositResponse {
    pub fn new(receipt: &DepositReceipt, decimals: u32) -> Self {
        Self {
            tx_id: receipt.tx_id.clone(),
            amount: receipt.amount,
            amount_formatted: format(receipt.amount, decimals),
            nonce: receipt.nonce.value().to_string(),
            deadline: receipt.deadline,
            block: receipt.block,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawResponse {
    pub deposit_id: DepositId,
    pub tx_id: TxId,
    pub amount: TokenAmount,
    pub amount_formatted: String,
    pub block: u64,
}

impl WithdrawResponse {
    pub fn new(receipt: &WithdrawReceipt, decimals: u32) -> Self {
        Self {
            deposit_id: receipt.deposit_id,
            tx_id: receipt.tx_id.clone(),
            amount: receipt.amount,
            amount_formatted: format(receipt.amount, decimals),
            block: receipt.block,
        }
    }
}

/// Generic API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    /// Safe to retry as-is
    #[serde(default)]
    pub retryable: bool,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }
}

fn format(value: TokenAmount, decimals: u32) -> String {
    amount::format_units(value, decimals, DISPLAY_DECIMALS)
}

fn format_signed(value: i128, decimals: u32) -> String {
    let magnitude = format(TokenAmount::new(value.unsigned_abs()), decimals);
    if value < 0 {
        format!("-{}", magnitude)
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_signed() {
        let one = 1_000_000_000_000_000_000i128;
        assert_eq!(format_signed(one / 2, 18), "0.5");
        assert_eq!(format_signed(-one / 20, 18), "-0.05");
        assert_eq!(format_signed(0, 18), "0");
    }

    #[test]
    fn test_deposit_view() {
        let deposit = Deposit {
            id: DepositId(7),
            deposited_amount: TokenAmount::new(100_000_000_000_000_000_000),
            withdrawable_amount: TokenAmount::new(110_123_456_000_000_000_000),
            timestamp: 1_700_000_000,
        };
        let view = DepositView::new(&deposit, 18);
        assert_eq!(view.deposited_formatted, "100");
        assert_eq!(view.withdrawable_formatted, "110.1234");
        assert_eq!(view.profit_formatted, "10.1234");
        assert!(view.withdrawable);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["depositedAmount"], "100000000000000000000");
        assert_eq!(json["id"], 7);
    }
}
