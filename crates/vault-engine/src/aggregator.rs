//! Position totals over the active deposit set

use serde::{Serialize, Serializer};
use vault_core::amount;
use vault_core::{ChainError, Deposit, TokenAmount};

/// Totals across all active deposits. Recomputed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionTotals {
    pub deposit_count: usize,
    pub total_deposited: TokenAmount,
    pub total_withdrawable: TokenAmount,
    /// May be negative
    #[serde(serialize_with = "signed_as_string")]
    pub total_profit: i128,
    pub total_profit_basis_points: i128,
    pub total_profit_percentage: f64,
}

/// Sum deposits into totals. Integer sums throughout; the percentage is the
/// only float and is derived from integer basis points.
///
/// Fails if a total does not fit in 128 bits.
pub fn aggregate(deposits: &[Deposit]) -> Result<PositionTotals, ChainError> {
    let mut total_deposited = TokenAmount::ZERO;
    let mut total_withdrawable = TokenAmount::ZERO;
    for d in deposits {
        total_deposited = total_deposited
            .checked_add(d.deposited_amount)
            .ok_or(ChainError::ValueOverflow {
                field: "total_deposited",
            })?;
        total_withdrawable = total_withdrawable
            .checked_add(d.withdrawable_amount)
            .ok_or(ChainError::ValueOverflow {
                field: "total_withdrawable",
            })?;
    }

    Ok(PositionTotals {
        deposit_count: deposits.len(),
        total_deposited,
        total_withdrawable,
        total_profit: amount::profit(total_deposited, total_withdrawable),
        total_profit_basis_points: amount::roi_basis_points(total_deposited, total_withdrawable),
        total_profit_percentage: amount::roi_percent(total_deposited, total_withdrawable),
    })
}

fn signed_as_string<S: Serializer>(value: &i128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vault_core::DepositId;

    fn deposit(id: u64, deposited: u128, withdrawable: u128) -> Deposit {
        Deposit {
            id: DepositId(id),
            deposited_amount: TokenAmount::new(deposited),
            withdrawable_amount: TokenAmount::new(withdrawable),
            timestamp: 1_700_000_000 + id,
        }
    }

    #[test]
    fn test_two_deposit_example() {
        let totals = aggregate(&[deposit(1, 100, 110), deposit(2, 50, 45)]).unwrap();
        assert_eq!(totals.total_deposited, TokenAmount::new(150));
        assert_eq!(totals.total_withdrawable, TokenAmount::new(155));
        assert_eq!(totals.total_profit, 5);
        assert_eq!(totals.total_profit_percentage, 3.33);
        assert_eq!(totals.deposit_count, 2);
    }

    #[test]
    fn test_empty_set() {
        let totals = aggregate(&[]).unwrap();
        assert_eq!(totals.total_deposited, TokenAmount::ZERO);
        assert_eq!(totals.total_profit, 0);
        assert_eq!(totals.total_profit_percentage, 0.0);
    }

    fn deposit_list() -> impl Strategy<Value = Vec<Deposit>> {
        // Bounded so a dozen entries cannot overflow the sums
        let amount = 0u128..1_000_000_000_000_000_000_000_000_000_000u128;
        prop::collection::vec((amount.clone(), amount), 0..12).prop_map(|pairs| {
            pairs
                .into_iter()
                .enumerate()
                .map(|(i, (deposited, withdrawable))| deposit(i as u64, deposited, withdrawable))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn test_totals_ignore_deposit_order(
            (original, shuffled) in deposit_list()
                .prop_flat_map(|list| (Just(list.clone()), Just(list).prop_shuffle()))
        ) {
            prop_assert_eq!(aggregate(&original).unwrap(), aggregate(&shuffled).unwrap());
        }

        #[test]
        fn test_totals_are_plain_sums(list in deposit_list()) {
            let totals = aggregate(&list).unwrap();
            let deposited: u128 = list.iter().map(|d| d.deposited_amount.base_units()).sum();
            let withdrawable: u128 = list.iter().map(|d| d.withdrawable_amount.base_units()).sum();
            prop_assert_eq!(totals.total_deposited, TokenAmount::new(deposited));
            prop_assert_eq!(totals.total_withdrawable, TokenAmount::new(withdrawable));
            prop_assert_eq!(totals.deposit_count, list.len());
        }
    }

    #[test]
    fn test_overflowing_totals_are_an_error() {
        let err = aggregate(&[deposit(1, u128::MAX, 0), deposit(2, 1, 0)]).unwrap_err();
        assert!(matches!(
            err,
            ChainError::ValueOverflow {
                field: "total_deposited"
            }
        ));
    }

    #[test]
    fn test_matches_per_deposit_arithmetic() {
        // Single deposit totals agree with the per-record helpers
        let d = deposit(9, 3, 2);
        let totals = aggregate(std::slice::from_ref(&d)).unwrap();
        assert_eq!(totals.total_profit, d.profit());
        assert_eq!(totals.total_profit_percentage, d.profit_percentage());
    }

    #[test]
    fn test_profit_serializes_as_string() {
        let totals = aggregate(&[deposit(1, 50, 45)]).unwrap();
        let json = serde_json::to_value(&totals).unwrap();
        assert_eq!(json["totalProfit"], "-5");
        assert_eq!(json["totalDeposited"], "50");
    }
}
