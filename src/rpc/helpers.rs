//! Helpers for the hex "quantity" encoding Ethereum JSON-RPC uses for block
//! numbers.

use anyhow::{bail, Context, Result};

/// Parses a `0x`-prefixed hex quantity such as `"0x1b4"` into a `u64`.
pub fn parse_quantity(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    let Some(digits) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    else {
        bail!("quantity {trimmed:?} is missing the 0x prefix");
    };
    if digits.is_empty() {
        bail!("quantity {trimmed:?} has no digits");
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid hex quantity {trimmed:?}"))
}

/// Formats a block number as a JSON-RPC quantity (no leading zeroes).
pub fn format_quantity(value: u64) -> String {
    format!("{value:#x}")
}
