//! Parsing of hexadecimal command line values.

use std::str::FromStr;

use rvmmu::PhysicalAddress;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseHexError {
    #[error("expected a hexadecimal value, got nothing")]
    Empty,
    #[error("invalid hexadecimal value: {0:?}")]
    Invalid(String),
}

/// Parses a hexadecimal number with an optional `0x` prefix and `_` separators.
///
/// Values are always hexadecimal, with or without the prefix: `1000` is 4096.
pub fn parse_hex(text: &str) -> Result<u64, ParseHexError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let digits: String = digits.chars().filter(|&c| c != '_').collect();
    if digits.is_empty() {
        return Err(ParseHexError::Empty);
    }

    u64::from_str_radix(&digits, 16).map_err(|_| ParseHexError::Invalid(text.to_string()))
}

/// The root table argument of `dump-pgtbl` and `translate-vaddr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootArg {
    /// `-`: take the root from `satp`.
    FromSatp,
    Address(PhysicalAddress),
}

impl FromStr for RootArg {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "-" {
            return Ok(Self::FromSatp);
        }
        parse_hex(s).map(|bits| Self::Address(PhysicalAddress::new(bits)))
    }
}
