//! Supervisor Address Translation and Protection register.

use alloc::string::ToString;
use core::fmt;

use crate::error::{Error, Result};
use crate::PhysicalAddress;

/// Architecture names this crate can walk tables for.
///
/// The first is the name debuggers report for a 64-bit RISC-V target.
const SUPPORTED_ARCHITECTURES: &[&str] = &["riscv:rv64", "riscv64"];

/// Fails with [`Error::UnsupportedArchitecture`] unless `name` describes a 64-bit RISC-V target.
pub fn ensure_supported_architecture(name: &str) -> Result<()> {
    if SUPPORTED_ARCHITECTURES.contains(&name) {
        Ok(())
    } else {
        Err(Error::UnsupportedArchitecture(name.to_string()))
    }
}

/// Translation mode selected by `satp.MODE`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SatpMode {
    /// No translation.
    Bare,
    Sv39,
    Sv48,
    Sv57,
    /// A mode value the privileged architecture reserves.
    Reserved(u8),
}

impl SatpMode {
    /// Decodes the 4-bit MODE field.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0xf {
            0 => Self::Bare,
            8 => Self::Sv39,
            9 => Self::Sv48,
            10 => Self::Sv57,
            other => Self::Reserved(other),
        }
    }
}

impl fmt::Display for SatpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bare => f.write_str("Bare"),
            Self::Sv39 => f.write_str("Sv39"),
            Self::Sv48 => f.write_str("Sv48"),
            Self::Sv57 => f.write_str("Sv57"),
            Self::Reserved(bits) => write!(f, "reserved({bits})"),
        }
    }
}

/// satp register
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Satp {
    bits: u64,
}

impl Satp {
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    #[inline]
    pub const fn bits(&self) -> u64 {
        self.bits
    }

    /// Physical page number of the root table (bits 0-43).
    #[inline]
    #[must_use]
    pub const fn root_ppn(&self) -> u64 {
        self.bits & 0xfff_ffff_ffff
    }

    /// Address space identifier (bits 44-51).
    #[inline]
    #[must_use]
    pub const fn asid(&self) -> u64 {
        (self.bits >> 44) & 0xff
    }

    /// Translation mode (bits 60-63).
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> SatpMode {
        SatpMode::from_bits((self.bits >> 60) as u8)
    }

    /// Returns the physical address of the root page table.
    ///
    /// Bare mode is reported as [`Error::TranslationDisabled`] since addresses are
    /// already physical there; every other mode but Sv39 is [`Error::UnsupportedMode`].
    pub fn root_table(&self) -> Result<PhysicalAddress> {
        match self.mode() {
            SatpMode::Sv39 => Ok(PhysicalAddress::from_ppn(self.root_ppn())),
            SatpMode::Bare => Err(Error::TranslationDisabled),
            mode => Err(Error::UnsupportedMode(mode)),
        }
    }
}

impl fmt::Debug for Satp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Satp")
            .field("root_ppn", &format_args!("{:#x}", self.root_ppn()))
            .field("asid", &format_args!("{:#x}", self.asid()))
            .field("mode", &self.mode())
            .finish()
    }
}

impl fmt::Display for Satp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "satp={:#x}: ppn={:#x} asid={:#x} mode={}",
            self.bits,
            self.root_ppn(),
            self.asid(),
            self.mode()
        )
    }
}
