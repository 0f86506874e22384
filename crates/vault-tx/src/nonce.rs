//! Permit2 unordered-nonce allocation

use serde::{Deserialize, Serialize};
use std::fmt;
use vault_core::{NonceBitmap, VaultError};

/// A Permit2 nonce split into its bitmap coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nonce {
    pub word_position: u64,
    pub bit: u8,
}

impl Nonce {
    /// On-chain nonce value: `word_position * 256 + bit`
    pub fn value(&self) -> u128 {
        (self.word_position as u128) * 256 + self.bit as u128
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Pick the lowest unused nonce in `bitmap`.
///
/// `bitmap` must be a fresh read of word `word_position`; results are never
/// cached because confirmed transfers consume bits behind our back.
pub fn allocate_nonce(bitmap: &NonceBitmap, word_position: u64) -> Result<Nonce, VaultError> {
    bitmap
        .first_unset()
        .map(|bit| Nonce { word_position, bit })
        .ok_or(VaultError::NonceExhausted { word_position })
}
