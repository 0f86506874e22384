//! Vault write calls, packaged for the wallet's signing bridge
//!
//! The wallet signs the Permit2 transfer and substitutes the signature for
//! [`PERMIT2_SIGNATURE_PLACEHOLDER`] before broadcasting; nothing here sees
//! or checks the signature itself.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use vault_core::{Address, DepositId, TokenAmount};

use crate::permit::PermitTransfer;

/// Replaced by the wallet with the signature of the first `permit2` entry
pub const PERMIT2_SIGNATURE_PLACEHOLDER: &str = "PERMIT2_SIGNATURE_PLACEHOLDER_0";

pub const DEPOSIT_WITH_PERMIT2_SIGNATURE: &str =
    "depositWithPermit2(uint256,((address,uint256),uint256,uint256),bytes)";
pub const WITHDRAW_SIGNATURE: &str = "withdraw(uint256)";

/// One contract invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    pub address: Address,
    pub function_name: String,
    /// Full Solidity signature, for wallets that encode calldata themselves
    pub function_signature: String,
    /// Arguments with uint256 values as decimal strings
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPermissions {
    pub token: Address,
    pub amount: TokenAmount,
}

/// Permit2 `PermitTransferFrom` payload the wallet signs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit2Payload {
    pub permitted: TokenPermissions,
    pub spender: Address,
    /// Decimal string
    pub nonce: String,
    /// Decimal string, unix seconds
    pub deadline: String,
}

impl From<&PermitTransfer> for Permit2Payload {
    fn from(permit: &PermitTransfer) -> Self {
        Self {
            permitted: TokenPermissions {
                token: permit.token.clone(),
                amount: permit.amount,
            },
            spender: permit.spender.clone(),
            nonce: permit.nonce.value().to_string(),
            deadline: permit.deadline.to_string(),
        }
    }
}

/// What the vault call is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

/// Everything the signing bridge needs to sign and broadcast one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSpec {
    pub kind: TransactionKind,
    /// Wallet expected to sign
    pub from: Address,
    pub transaction: Vec<ContractCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permit2: Vec<Permit2Payload>,
}

impl TransactionSpec {
    /// `depositWithPermit2(amount, ((token, amount), nonce, deadline), signature)`
    pub fn deposit(from: Address, vault: Address, permit: &PermitTransfer) -> Self {
        let amount = permit.amount.to_string();
        let args = vec![
            json!(amount),
            json!([
                [permit.token.as_str(), amount],
                permit.nonce.value().to_string(),
                permit.deadline.to_string(),
            ]),
            json!(PERMIT2_SIGNATURE_PLACEHOLDER),
        ];

        Self {
            kind: TransactionKind::Deposit,
            from,
            transaction: vec![ContractCall {
                address: vault,
                function_name: "depositWithPermit2".to_string(),
                function_signature: DEPOSIT_WITH_PERMIT2_SIGNATURE.to_string(),
                args,
            }],
            permit2: vec![Permit2Payload::from(permit)],
        }
    }

    /// `withdraw(depositId)`
    pub fn withdraw(from: Address, vault: Address, deposit_id: DepositId) -> Self {
        Self {
            kind: TransactionKind::Withdraw,
            from,
            transaction: vec![ContractCall {
                address: vault,
                function_name: "withdraw".to_string(),
                function_signature: WITHDRAW_SIGNATURE.to_string(),
                args: vec![json!(deposit_id.0.to_string())],
            }],
            permit2: Vec::new(),
        }
    }

    /// Short human-readable summary for the wallet prompt
    pub fn describe(&self) -> String {
        match self.kind {
            TransactionKind::Deposit => match self.permit2.first() {
                Some(p) => format!("Deposit {} base units into vault", p.permitted.amount),
                None => "Deposit into vault".to_string(),
            },
            TransactionKind::Withdraw => {
                let id = self
                    .transaction
                    .first()
                    .and_then(|c| c.args.first())
                    .and_then(Value::as_str)
                    .unwrap_or("?");
                format!("Withdraw vault deposit #{}", id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::Nonce;

    fn permit() -> PermitTransfer {
        PermitTransfer {
            token: Address::new("0x2cFc85d8E48F8EAB294be644d9E25C3030863003"),
            amount: TokenAmount::new(500_000_000_000_000_000),
            nonce: Nonce {
                word_position: 0,
                bit: 4,
            },
            deadline: 1_700_001_800,
            spender: Address::new("0xeA2c7377FD34366878516bD68CCB469016b529d9"),
        }
    }

    fn wallet() -> Address {
        Address::new("0x1111111111111111111111111111111111111111")
    }

    #[test]
    fn test_deposit_spec_shape() {
        let permit = permit();
        let spec = TransactionSpec::deposit(wallet(), permit.spender.clone(), &permit);
        let json = serde_json::to_value(&spec).unwrap();

        let call = &json["transaction"][0];
        assert_eq!(call["functionName"], "depositWithPermit2");
        assert_eq!(call["args"][0], "500000000000000000");
        assert_eq!(
            call["args"][1][0][0],
            "0x2cfc85d8e48f8eab294be644d9e25c3030863003"
        );
        assert_eq!(call["args"][1][1], "4");
        assert_eq!(call["args"][1][2], "1700001800");
        assert_eq!(call["args"][2], PERMIT2_SIGNATURE_PLACEHOLDER);

        let p2 = &json["permit2"][0];
        assert_eq!(p2["permitted"]["amount"], "500000000000000000");
        assert_eq!(p2["spender"], "0xea2c7377fd34366878516bd68ccb469016b529d9");
        assert_eq!(p2["nonce"], "4");
        assert_eq!(json["kind"], "deposit");
    }

    #[test]
    fn test_withdraw_spec_has_no_permit() {
        let spec = TransactionSpec::withdraw(
            wallet(),
            Address::new("0xeA2c7377FD34366878516bD68CCB469016b529d9"),
            DepositId(12),
        );
        let json = serde_json::to_value(&spec).unwrap();
        assert!(json.get("permit2").is_none());
        assert_eq!(json["transaction"][0]["args"][0], "12");
        assert_eq!(spec.describe(), "Withdraw vault deposit #12");
    }

    #[test]
    fn test_spec_round_trips_through_json() {
        let permit = permit();
        let spec = TransactionSpec::deposit(wallet(), permit.spender.clone(), &permit);
        let text = serde_json::to_string(&spec).unwrap();
        let parsed: TransactionSpec = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, spec);
    }
}
