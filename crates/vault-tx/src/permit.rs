//! Permit2 signature-transfer authorizations

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use vault_core::constants::PERMIT_VALIDITY_SECS;
use vault_core::{Address, TokenAmount, VaultError};

use crate::nonce::Nonce;

/// A time-bounded authorization for `spender` to pull exactly `amount` of `token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitTransfer {
    pub token: Address,
    pub amount: TokenAmount,
    pub nonce: Nonce,
    /// Unix seconds after which the permit is void
    pub deadline: u64,
    pub spender: Address,
}

impl PermitTransfer {
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        now_secs >= self.deadline
    }
}

/// Builds permits for one token/spender pair
#[derive(Debug, Clone)]
pub struct PermitBuilder {
    token: Address,
    spender: Address,
    validity_secs: u64,
}

impl PermitBuilder {
    pub fn new(token: Address, spender: Address) -> Self {
        Self {
            token,
            spender,
            validity_secs: PERMIT_VALIDITY_SECS,
        }
    }

    /// Build against the wall clock
    pub fn build(&self, amount: TokenAmount, nonce: Nonce) -> Result<PermitTransfer, VaultError> {
        self.build_at(amount, nonce, unix_now_secs())
    }

    /// Build with an explicit `now` (whole unix seconds)
    pub fn build_at(
        &self,
        amount: TokenAmount,
        nonce: Nonce,
        now_secs: u64,
    ) -> Result<PermitTransfer, VaultError> {
        if amount.is_zero() {
            return Err(VaultError::Validation {
                message: "Permit amount must be greater than zero".to_string(),
            });
        }

        Ok(PermitTransfer {
            token: self.token.clone(),
            amount,
            nonce,
            deadline: now_secs.saturating_add(self.validity_secs),
            spender: self.spender.clone(),
        })
    }
}

/// Current unix time truncated to whole seconds
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
