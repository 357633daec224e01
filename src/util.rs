//! Display helpers for balances, addresses and explorer links.

use crate::config::ChainEndpoints;
use crate::error::ParseError;
use alloy::primitives::U256;

const DISPLAY_FRACTION_DIGITS: usize = 6;

/// Renders a raw integer amount with `decimals` implied decimal places.
/// The fractional part is truncated, not rounded, to six digits.
///
/// ```
/// use wallet_tracker::util::format_balance;
/// assert_eq!(format_balance("1500000000000000000", 18).unwrap(), "1.500000");
/// ```
pub fn format_balance(raw: &str, decimals: u8) -> Result<String, ParseError> {
    let value = U256::from_str_radix(raw.trim(), 10)
        .map_err(|_| ParseError::InvalidNumber { field: "balance", value: raw.to_owned() })?;

    let decimals = decimals as usize;
    if decimals == 0 {
        return Ok(value.to_string());
    }

    let digits = format!("{:0>width$}", value.to_string(), width = decimals + 1);
    let (integer, fraction) = digits.split_at(digits.len() - decimals);
    let fraction = &fraction[..fraction.len().min(DISPLAY_FRACTION_DIGITS)];

    Ok(format!("{}.{}", integer, fraction))
}

/// `0x1234567890abcdef` with 4 chars becomes `0x1234...cdef`. Addresses too
/// short to shorten come back unchanged.
pub fn shorten_address(address: &str, chars: usize) -> String {
    let symbols: Vec<char> = address.chars().collect();
    let head = chars + 2;

    if symbols.len() <= head + chars {
        return address.to_owned();
    }

    let start: String = symbols[..head].iter().collect();
    let end: String = symbols[symbols.len() - chars..].iter().collect();
    format!("{}...{}", start, end)
}

/// Explorer page for a transaction using the built-in endpoint table.
pub fn explorer_tx_url(chain: &str, hash: &str) -> Option<String> {
    ChainEndpoints::default().tx_url(chain, hash)
}
