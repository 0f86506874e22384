//! Fixed-point amount arithmetic
//!
//! All decimal-string <-> base-unit conversion and every profit/ROI figure is
//! computed here. Amounts stay integers end to end; the only float produced is
//! the final percentage, derived from an integer basis-point value.

use thiserror::Error;

use crate::constants::MAX_INPUT_FRACTION_DIGITS;
use crate::TokenAmount;

/// Errors from parsing a user-entered decimal amount
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Amount is empty")]
    Empty,

    #[error("Invalid character '{0}' in amount")]
    InvalidCharacter(char),

    #[error("Amount has more than one decimal point")]
    MultipleDecimalPoints,

    #[error("Amount has {found} fractional digits, at most {max} allowed")]
    TooManyFractionDigits { max: usize, found: usize },

    #[error("Amount must be greater than zero")]
    NotPositive,

    #[error("Amount is too large")]
    Overflow,
}

/// Parse a decimal string into base units, rejecting more than 6 fractional digits.
///
/// If the token has fewer decimals than the input's fractional digits, the
/// excess is floored away.
pub fn parse_units(input: &str, decimals: u32) -> Result<TokenAmount, AmountError> {
    let (whole, fraction) = split_decimal(input)?;
    if fraction.len() > MAX_INPUT_FRACTION_DIGITS {
        return Err(AmountError::TooManyFractionDigits {
            max: MAX_INPUT_FRACTION_DIGITS,
            found: fraction.len(),
        });
    }
    scale(whole, fraction, decimals)
}

/// Parse a decimal string, truncating (never rounding) fractional digits beyond 6
pub fn parse_units_truncating(input: &str, decimals: u32) -> Result<TokenAmount, AmountError> {
    let (whole, fraction) = split_decimal(input)?;
    let kept = &fraction[..fraction.len().min(MAX_INPUT_FRACTION_DIGITS)];
    scale(whole, kept, decimals)
}

/// [`parse_units`] plus a strictly-positive check
pub fn parse_positive_units(input: &str, decimals: u32) -> Result<TokenAmount, AmountError> {
    let amount = parse_units(input, decimals)?;
    if amount.is_zero() {
        return Err(AmountError::NotPositive);
    }
    Ok(amount)
}

/// Format base units as a decimal string, keeping at most `display_decimals`
/// fractional digits (truncated) and trimming trailing zeros.
pub fn format_units(value: TokenAmount, decimals: u32, display_decimals: usize) -> String {
    let raw = value.base_units();
    if raw == 0 {
        return "0".to_string();
    }

    let divisor = pow10(decimals).unwrap_or(u128::MAX);
    let quotient = raw / divisor;
    let remainder = raw % divisor;
    if remainder == 0 {
        return quotient.to_string();
    }

    let padded = format!("{:0>width$}", remainder, width = decimals as usize);
    let shown = &padded[..padded.len().min(display_decimals)];
    let trimmed = shown.trim_end_matches('0');

    if trimmed.is_empty() {
        quotient.to_string()
    } else {
        format!("{}.{}", quotient, trimmed)
    }
}

/// Largest input string (at most 6 fractional digits) not exceeding `balance`
pub fn max_deposit_input(balance: TokenAmount, decimals: u32) -> String {
    format_units(balance, decimals, MAX_INPUT_FRACTION_DIGITS)
}

/// `withdrawable - deposited` as a signed base-unit value
pub fn profit(deposited: TokenAmount, withdrawable: TokenAmount) -> i128 {
    to_signed(withdrawable.base_units()).saturating_sub(to_signed(deposited.base_units()))
}

/// ROI in basis points: `profit * 10000 / deposited`, truncated toward zero.
/// Zero when nothing was deposited.
pub fn roi_basis_points(deposited: TokenAmount, withdrawable: TokenAmount) -> i128 {
    if deposited.is_zero() {
        return 0;
    }
    let profit = profit(deposited, withdrawable);
    let denom = to_signed(deposited.base_units());

    // q*10000 + r*10000/d == p*10000/d under truncation, without the wide product
    let quotient = profit / denom;
    let remainder = profit % denom;
    quotient
        .saturating_mul(10_000)
        .saturating_add(remainder.saturating_mul(10_000) / denom)
}

/// ROI as a percentage with two decimals of integer precision (e.g. `3.33`)
pub fn roi_percent(deposited: TokenAmount, withdrawable: TokenAmount) -> f64 {
    roi_basis_points(deposited, withdrawable) as f64 / 100.0
}

fn split_decimal(input: &str) -> Result<(&str, &str), AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    if let Some(c) = trimmed.chars().find(|c| !c.is_ascii_digit() && *c != '.') {
        return Err(AmountError::InvalidCharacter(c));
    }

    let mut parts = trimmed.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();
    if fraction.contains('.') {
        return Err(AmountError::MultipleDecimalPoints);
    }
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::Empty);
    }
    Ok((whole, fraction))
}

fn scale(whole: &str, fraction: &str, decimals: u32) -> Result<TokenAmount, AmountError> {
    let unit = pow10(decimals).ok_or(AmountError::Overflow)?;

    let whole_value = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| AmountError::Overflow)?
    };

    // Floor: only the first `decimals` fractional digits can be represented
    let kept = &fraction[..fraction.len().min(decimals as usize)];
    let fraction_value = if kept.is_empty() {
        0
    } else {
        let digits = kept.parse::<u128>().map_err(|_| AmountError::Overflow)?;
        let pad = pow10(decimals - kept.len() as u32).ok_or(AmountError::Overflow)?;
        digits.checked_mul(pad).ok_or(AmountError::Overflow)?
    };

    whole_value
        .checked_mul(unit)
        .and_then(|w| w.checked_add(fraction_value))
        .map(TokenAmount::new)
        .ok_or(AmountError::Overflow)
}

fn pow10(exp: u32) -> Option<u128> {
    10u128.checked_pow(exp)
}

fn to_signed(value: u128) -> i128 {
    i128::try_from(value).unwrap_or(i128::MAX)
}
