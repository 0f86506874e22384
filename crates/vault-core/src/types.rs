//! Core type definitions for the vault client

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::amount;

/// Errors produced when parsing an EVM address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Address must start with 0x")]
    MissingPrefix,

    #[error("Address must be 40 hex characters after 0x (got {0})")]
    InvalidLength(usize),

    #[error("Invalid hex in address: {0}")]
    InvalidHex(String),
}

/// EVM account or contract address (20 bytes, `0x`-prefixed hex).
///
/// Stored lowercased so that checksummed and plain spellings compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create an address without validation (constants, config defaults)
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into().to_ascii_lowercase())
    }

    /// Parse and validate a user-supplied address
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;

        if body.len() != 40 {
            return Err(AddressError::InvalidLength(body.len()));
        }
        hex::decode(body).map_err(|e| AddressError::InvalidHex(e.to_string()))?;

        Ok(Self::new(format!("0x{}", body)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw 20 address bytes
    pub fn to_bytes(&self) -> Result<[u8; 20], AddressError> {
        let body = self.0.trim_start_matches("0x");
        let bytes = hex::decode(body).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        bytes
            .try_into()
            .map_err(|b: Vec<u8>| AddressError::InvalidLength(b.len() * 2))
    }

    /// Shortened form for display, e.g. `0x2cfc...3003`
    pub fn truncated(&self) -> String {
        truncate_middle(&self.0, 6, 4)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Address::new)
    }
}

/// The wallet a session is bound to
pub type WalletAddress = Address;

/// Identifier returned by the signing bridge for a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vault-assigned deposit identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepositId(pub u64);

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token amount in base units (10^-decimals of one token).
///
/// Serialized as a decimal string so JSON consumers never see a lossy float.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenAmount(pub u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub fn new(base_units: u128) -> Self {
        Self(base_units)
    }

    pub fn base_units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(other.0).map(TokenAmount)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s
                .parse::<u128>()
                .map(TokenAmount)
                .map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(TokenAmount(n as u128)),
        }
    }
}

/// Snapshot of an ERC-20 allowance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceState {
    pub owner: Address,
    pub spender: Address,
    pub amount: TokenAmount,
}

/// One active vault position as reported by `getUserActiveDeposits`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: DepositId,
    pub deposited_amount: TokenAmount,
    pub withdrawable_amount: TokenAmount,
    /// Unix seconds at which the deposit was made
    pub timestamp: u64,
}

impl Deposit {
    /// Withdrawable minus deposited, in base units (may be negative)
    pub fn profit(&self) -> i128 {
        amount::profit(self.deposited_amount, self.withdrawable_amount)
    }

    /// ROI in percent with two decimal places of integer precision
    pub fn profit_percentage(&self) -> f64 {
        amount::roi_percent(self.deposited_amount, self.withdrawable_amount)
    }

    pub fn is_withdrawable(&self) -> bool {
        !self.withdrawable_amount.is_zero()
    }
}

/// A 256-bit Permit2 nonce bitmap word.
///
/// Bit `i` set means nonce `word_position * 256 + i` has been consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NonceBitmap {
    /// Little-endian limbs: `limbs[0]` holds bits 0..64
    limbs: [u64; 4],
}

impl NonceBitmap {
    pub const EMPTY: NonceBitmap = NonceBitmap { limbs: [0; 4] };
    pub const FULL: NonceBitmap = NonceBitmap {
        limbs: [u64::MAX; 4],
    };

    /// Decode a big-endian 32-byte ABI word
    pub fn from_be_bytes(word: [u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let start = 32 - (i + 1) * 8;
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&word[start..start + 8]);
            *limb = u64::from_be_bytes(chunk);
        }
        Self { limbs }
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        for (i, limb) in self.limbs.iter().enumerate() {
            let start = 32 - (i + 1) * 8;
            word[start..start + 8].copy_from_slice(&limb.to_be_bytes());
        }
        word
    }

    pub fn is_set(&self, bit: u8) -> bool {
        let (limb, offset) = (bit as usize / 64, bit as u32 % 64);
        self.limbs[limb] & (1u64 << offset) != 0
    }

    pub fn set(&mut self, bit: u8) {
        let (limb, offset) = (bit as usize / 64, bit as u32 % 64);
        self.limbs[limb] |= 1u64 << offset;
    }

    /// Lowest unset bit, scanning from bit 0 upward
    pub fn first_unset(&self) -> Option<u8> {
        self.limbs.iter().enumerate().find_map(|(i, limb)| {
            (*limb != u64::MAX).then(|| (i as u32 * 64 + limb.trailing_ones()) as u8)
        })
    }

    pub fn count_set(&self) -> u32 {
        self.limbs.iter().map(|l| l.count_ones()).sum()
    }
}

impl fmt::Display for NonceBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_be_bytes()))
    }
}

/// Shorten a long identifier for display, keeping `start` leading and `end` trailing chars
pub fn truncate_middle(value: &str, start: usize, end: usize) -> String {
    if value.len() <= start + end {
        return value.to_string();
    }
    format!("{}...{}", &value[..start], &value[value.len() - end..])
}

/// Constants
pub mod constants {
    /// Seconds a permit stays valid after it is built
    pub const PERMIT_VALIDITY_SECS: u64 = 30 * 60;

    /// The only nonce bitmap word the allocator scans
    pub const NONCE_WORD_POSITION: u64 = 0;

    /// Fractional digits accepted in user-entered amounts
    pub const MAX_INPUT_FRACTION_DIGITS: usize = 6;

    /// WLD uses 18 decimals
    pub const DEFAULT_TOKEN_DECIMALS: u32 = 18;
}
