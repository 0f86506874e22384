//! Minimal Solidity ABI codec for the vault's view functions
//!
//! Only static `address`/`uint256` arguments and `uint256` / `uint256[]`
//! return values are supported.

use vault_core::{Address, ChainError, Deposit, DepositId, NonceBitmap, TokenAmount};

use crate::Result;

const WORD: usize = 32;

/// Function selectors (first 4 bytes of keccak256 of the signature)
pub mod selectors {
    /// `balanceOf(address)`
    pub const BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
    /// `allowance(address,address)`
    pub const ALLOWANCE: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];
    /// `getUserActiveDeposits(address)`
    pub const GET_USER_ACTIVE_DEPOSITS: [u8; 4] = [0xc2, 0x85, 0xc8, 0xc9];
    /// `getNonceBitmap(address,uint256)`
    pub const GET_NONCE_BITMAP: [u8; 4] = [0xc9, 0x05, 0x3b, 0x74];
}

/// Argument of a static call
#[derive(Debug, Clone)]
pub enum Token<'a> {
    Address(&'a Address),
    Uint(u128),
}

/// Encode `selector ++ args` as `0x`-prefixed calldata
pub fn encode_call(selector: [u8; 4], args: &[Token<'_>]) -> Result<String> {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector);

    for arg in args {
        let mut word = [0u8; WORD];
        match arg {
            Token::Address(addr) => {
                let bytes = addr
                    .to_bytes()
                    .map_err(|e| ChainError::ParseError(format!("Bad address {}: {}", addr, e)))?;
                word[12..].copy_from_slice(&bytes);
            }
            Token::Uint(value) => {
                word[16..].copy_from_slice(&value.to_be_bytes());
            }
        }
        data.extend_from_slice(&word);
    }

    Ok(format!("0x{}", hex::encode(data)))
}

/// Decode `0x`-prefixed hex returned by `eth_call`
pub fn decode_hex(data: &str) -> Result<Vec<u8>> {
    let body = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(body).map_err(|e| ChainError::ParseError(format!("Invalid hex in result: {}", e)))
}

/// 32-byte word at `offset`
pub fn word_at(data: &[u8], offset: usize) -> Result<[u8; WORD]> {
    let end = offset
        .checked_add(WORD)
        .ok_or_else(|| ChainError::ParseError("Word offset overflow".to_string()))?;
    let slice = data.get(offset..end).ok_or_else(|| {
        ChainError::ParseError(format!(
            "Result too short: need {} bytes, have {}",
            end,
            data.len()
        ))
    })?;
    let mut word = [0u8; WORD];
    word.copy_from_slice(slice);
    Ok(word)
}

/// Interpret a word as an amount; fails if the value exceeds 128 bits
pub fn word_to_u128(word: &[u8; WORD], field: &'static str) -> Result<u128> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(ChainError::ValueOverflow { field });
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

/// Like [`word_to_u128`] but clamps oversized values (unlimited approvals)
pub fn word_to_u128_saturating(word: &[u8; WORD]) -> u128 {
    if word[..16].iter().any(|b| *b != 0) {
        return u128::MAX;
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    u128::from_be_bytes(low)
}

pub fn word_to_u64(word: &[u8; WORD], field: &'static str) -> Result<u64> {
    let value = word_to_u128(word, field)?;
    u64::try_from(value).map_err(|_| ChainError::ValueOverflow { field })
}

fn word_to_usize(word: &[u8; WORD], field: &'static str) -> Result<usize> {
    let value = word_to_u64(word, field)?;
    usize::try_from(value).map_err(|_| ChainError::ValueOverflow { field })
}

/// Decode a single `uint256` return value as a token amount
pub fn decode_amount(data: &[u8], field: &'static str) -> Result<TokenAmount> {
    let word = word_at(data, 0)?;
    word_to_u128(&word, field).map(TokenAmount::new)
}

/// Decode a single `uint256` return value as a nonce bitmap
pub fn decode_bitmap(data: &[u8]) -> Result<NonceBitmap> {
    word_at(data, 0).map(NonceBitmap::from_be_bytes)
}

/// Decode the `uint256[]` whose head slot is at `head_index`
fn decode_uint_array(data: &[u8], head_index: usize) -> Result<Vec<[u8; WORD]>> {
    let offset = word_to_usize(&word_at(data, head_index * WORD)?, "array offset")?;
    let len = word_to_usize(&word_at(data, offset)?, "array length")?;

    (0..len)
        .map(|i| word_at(data, offset + WORD + i * WORD))
        .collect()
}

/// Decode `getUserActiveDeposits` output: four parallel arrays zipped by index
pub fn decode_active_deposits(data: &[u8]) -> Result<Vec<Deposit>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let ids = decode_uint_array(data, 0)?;
    let deposited = decode_uint_array(data, 1)?;
    let withdrawable = decode_uint_array(data, 2)?;
    let timestamps = decode_uint_array(data, 3)?;

    let len = ids.len();
    if deposited.len() != len || withdrawable.len() != len || timestamps.len() != len {
        return Err(ChainError::ParseError(format!(
            "Active deposit arrays differ in length: ids={}, deposited={}, withdrawable={}, timestamps={}",
            len,
            deposited.len(),
            withdrawable.len(),
            timestamps.len()
        )));
    }

    (0..len)
        .map(|i| {
            Ok(Deposit {
                id: DepositId(word_to_u64(&ids[i], "deposit id")?),
                deposited_amount: TokenAmount::new(word_to_u128(
                    &deposited[i],
                    "deposited amount",
                )?),
                withdrawable_amount: TokenAmount::new(word_to_u128(
                    &withdrawable[i],
                    "withdrawable amount",
                )?),
                timestamp: word_to_u64(&timestamps[i], "deposit timestamp")?,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn uint_word(value: u128) -> [u8; WORD] {
        let mut word = [0u8; WORD];
        word[16..].copy_from_slice(&value.to_be_bytes());
        word
    }

    /// ABI-encode four `uint256[]` values the way the vault returns them
    pub(crate) fn encode_four_arrays(arrays: [&[u128]; 4]) -> Vec<u8> {
        let mut head = Vec::new();
        let mut tail = Vec::new();
        for array in arrays {
            head.extend_from_slice(&uint_word((4 * WORD + tail.len()) as u128));
            tail.extend_from_slice(&uint_word(array.len() as u128));
            for v in array {
                tail.extend_from_slice(&uint_word(*v));
            }
        }
        head.extend_from_slice(&tail);
        head
    }

    #[test]
    fn test_encode_balance_of() {
        let owner = Address::new("0x2cFc85d8E48F8EAB294be644d9E25C3030863003");
        let data = encode_call(selectors::BALANCE_OF, &[Token::Address(&owner)]).unwrap();
        assert_eq!(
            data,
            "0x70a08231\
             0000000000000000000000002cfc85d8e48f8eab294be644d9e25c3030863003"
        );
    }

    #[test]
    fn test_encode_nonce_bitmap_call() {
        let owner = Address::new("0x000000000022D473030F116dDEE9F6B43aC78BA3");
        let data = encode_call(
            selectors::GET_NONCE_BITMAP,
            &[Token::Address(&owner), Token::Uint(0)],
        )
        .unwrap();
        assert!(data.starts_with("0xc9053b74"));
        // selector + two words
        assert_eq!(data.len(), 2 + 8 + 128);
        assert!(data.ends_with(&"0".repeat(64)));
    }

    #[test]
    fn test_decode_amount() {
        let data = uint_word(1_000_000_000_000_000_000);
        assert_eq!(
            decode_amount(&data, "balance").unwrap(),
            TokenAmount::new(1_000_000_000_000_000_000)
        );
    }

    #[test]
    fn test_decode_amount_overflow() {
        let data = [0xffu8; 32];
        assert!(matches!(
            decode_amount(&data, "balance"),
            Err(ChainError::ValueOverflow { field: "balance" })
        ));
        assert_eq!(word_to_u128_saturating(&data), u128::MAX);
    }

    #[test]
    fn test_decode_short_result() {
        assert!(matches!(
            decode_amount(&[0u8; 10], "balance"),
            Err(ChainError::ParseError(_))
        ));
    }

    #[test]
    fn test_decode_active_deposits() {
        let data = encode_four_arrays([
            &[1, 7],
            &[100, 50],
            &[110, 45],
            &[1_700_000_000, 1_700_000_600],
        ]);
        let deposits = decode_active_deposits(&data).unwrap();
        assert_eq!(deposits.len(), 2);
        assert_eq!(deposits[0].id, DepositId(1));
        assert_eq!(deposits[0].deposited_amount, TokenAmount::new(100));
        assert_eq!(deposits[0].withdrawable_amount, TokenAmount::new(110));
        assert_eq!(deposits[1].id, DepositId(7));
        assert_eq!(deposits[1].timestamp, 1_700_000_600);
    }

    #[test]
    fn test_decode_no_deposits() {
        let data = encode_four_arrays([&[], &[], &[], &[]]);
        assert!(decode_active_deposits(&data).unwrap().is_empty());
        assert!(decode_active_deposits(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_decode_mismatched_arrays() {
        let data = encode_four_arrays([&[1, 2], &[100], &[110, 45], &[1, 2]]);
        assert!(matches!(
            decode_active_deposits(&data),
            Err(ChainError::ParseError(_))
        ));
    }
}
