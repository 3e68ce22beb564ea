//! Human-readable formatting for addresses and sizes.

use core::fmt;

use crate::{PhysicalAddress, VirtualAddress};

/// Wraps an address and formats it as an uppercase hexadecimal value with `0x` prefix
/// and `_` digit separators every 4 digits.
///
/// # Examples
///
/// ```
/// use rvmmu::HumanAddress;
///
/// assert_eq!(format!("{}", HumanAddress(0x0)), "0x0");
/// assert_eq!(format!("{}", HumanAddress(0x1000)), "0x1000");
/// assert_eq!(format!("{}", HumanAddress(0x8020_0000)), "0x8020_0000");
/// assert_eq!(format!("{}", HumanAddress(0xFFFF_FFC0_0000_0000)), "0xFFFF_FFC0_0000_0000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct HumanAddress(pub u64);

impl From<u64> for HumanAddress {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<PhysicalAddress> for HumanAddress {
    #[inline]
    fn from(value: PhysicalAddress) -> Self {
        Self(value.as_u64())
    }
}

impl From<VirtualAddress> for HumanAddress {
    #[inline]
    fn from(value: VirtualAddress) -> Self {
        Self(value.as_u64())
    }
}

impl fmt::Display for HumanAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;
        let bits = u64::BITS - value.leading_zeros();
        let num_digits = bits.div_ceil(4).max(1);

        f.write_str("0x")?;
        for i in (0..num_digits).rev() {
            let digit = ((value >> (i * 4)) & 0xF) as u32;
            let c = char::from_digit(digit, 16).unwrap_or('?').to_ascii_uppercase();
            fmt::Write::write_char(f, c)?;
            if i != 0 && i % 4 == 0 {
                f.write_str("_")?;
            }
        }

        Ok(())
    }
}

/// Wraps a size in bytes and formats it with the largest binary unit that divides it
/// evenly, e.g. `4KiB`, `2MiB` or `1GiB`.
///
/// Page sizes are always exact powers of two, so no fractional output is needed;
/// sizes that are not a whole number of KiB are printed in bytes.
///
/// # Examples
///
/// ```
/// use rvmmu::HumanSize;
///
/// assert_eq!(format!("{}", HumanSize(0)), "0B");
/// assert_eq!(format!("{}", HumanSize(4096)), "4KiB");
/// assert_eq!(format!("{}", HumanSize(0x20_0000)), "2MiB");
/// assert_eq!(format!("{}", HumanSize(0x4000_0000)), "1GiB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct HumanSize(pub u64);

impl fmt::Display for HumanSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

        let mut size = self.0;
        let mut unit_index = 0;

        while size != 0 && size % 1024 == 0 && unit_index < UNITS.len() - 1 {
            size /= 1024;
            unit_index += 1;
        }

        write!(f, "{}{}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero() {
        assert_eq!(format!("{}", HumanAddress(0x0)), "0x0");
    }

    #[test]
    fn formats_small_values() {
        assert_eq!(format!("{}", HumanAddress(0x1)), "0x1");
        assert_eq!(format!("{}", HumanAddress(0xF)), "0xF");
        assert_eq!(format!("{}", HumanAddress(0xFFF)), "0xFFF");
        assert_eq!(format!("{}", HumanAddress(0xABCD)), "0xABCD");
    }

    #[test]
    fn formats_with_separators() {
        assert_eq!(format!("{}", HumanAddress(0x1_0000)), "0x1_0000");
        assert_eq!(format!("{}", HumanAddress(0x55000)), "0x5_5000");
        assert_eq!(format!("{}", HumanAddress(0xDEAD_BEEF)), "0xDEAD_BEEF");
        assert_eq!(
            format!("{}", HumanAddress(0xFFFF_FFFF_FFFF_FFFF)),
            "0xFFFF_FFFF_FFFF_FFFF"
        );
    }

    #[test]
    fn converts_from_addresses() {
        let addr = crate::PhysicalAddress::new(0x8000_0000);
        assert_eq!(format!("{}", HumanAddress::from(addr)), "0x8000_0000");
    }

    #[test]
    fn formats_page_sizes() {
        assert_eq!(format!("{}", HumanSize(1023)), "1023B");
        assert_eq!(format!("{}", HumanSize(crate::page_size_for_level(0))), "4KiB");
        assert_eq!(format!("{}", HumanSize(crate::page_size_for_level(1))), "2MiB");
        assert_eq!(format!("{}", HumanSize(crate::page_size_for_level(2))), "1GiB");
    }

    #[test]
    fn keeps_uneven_sizes_in_smaller_unit() {
        assert_eq!(format!("{}", HumanSize(1536)), "1536B");
        assert_eq!(format!("{}", HumanSize(3 * 1024 * 1024 + 1024)), "3073KiB");
    }
}
