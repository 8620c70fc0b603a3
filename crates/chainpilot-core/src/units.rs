use crate::error::{PilotError, Result};
use alloy_primitives::U256;

/// Convert a human decimal amount into base units. Extra fractional digits
/// beyond `decimals` are truncated.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    let invalid = || PilotError::Handler(format!("Invalid amount: {amount}"));
    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let decimals = decimals as usize;
    let mut frac = frac.chars().take(decimals).collect::<String>();
    while frac.len() < decimals {
        frac.push('0');
    }
    let digits = format!("{}{}", whole, frac);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| invalid())
}

/// [`parse_units`] for an amount to move: rejects amounts that come to
/// zero base units once truncated to `decimals`.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256> {
    let value = parse_units(amount, decimals)?;
    if value.is_zero() {
        return Err(PilotError::Handler(format!(
            "Amount {} is below the smallest unit of a {decimals}-decimal token",
            amount.trim()
        )));
    }
    Ok(value)
}

/// Render base units as a decimal string without trailing zeros.
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}
