use alloc::string::String;
use core::fmt;

use crate::{PageTableEntry, PhysicalAddress, ReadError, SatpMode, VirtualAddress};

pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can end a dump, a translation or a register decode.
///
/// None of these are retried: they describe either a configuration this crate
/// does not handle or page table state the hardware would fault on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The target is not a 64-bit RISC-V machine.
    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),
    /// `satp.MODE` selects a paging scheme other than Sv39.
    #[error("unsupported satp.MODE: {0}")]
    UnsupportedMode(SatpMode),
    /// `satp.MODE` is Bare: virtual addresses are physical addresses.
    #[error("satp.MODE is Bare, address translation is disabled")]
    TranslationDisabled,
    /// Bits 39-63 of the virtual address are not copies of bit 38.
    #[error("{0} is not a canonical Sv39 address")]
    NonCanonicalAddress(VirtualAddress),
    /// The entry on the walk has its valid bit clear.
    #[error("unmapped: {0}")]
    Unmapped(PteFault),
    /// One of the two reserved bits of the entry is set.
    #[error("reserved field in use: {0}")]
    ReservedFieldInUse(PteFault),
    /// The entry is writable but not readable.
    #[error("invalid permission combination (write without read): {0}")]
    InvalidPermissionCombination(PteFault),
    /// A pointer entry has the accessed, dirty or user bit set.
    #[error("accessed, dirty or user bit set on a non-leaf entry: {0}")]
    ReservedFlagOnNonLeaf(PteFault),
    /// A level 0 entry points at yet another table.
    #[error("table depth exceeded: {0}")]
    RecursionLimitExceeded(PteFault),
    /// A cause register holds a code outside the fixed set of known causes.
    #[error("unknown cause code in {register}: {value:#x}")]
    UnknownCauseCode { register: &'static str, value: u64 },
    /// The register source could not provide a register.
    #[error("register {name} is unavailable: {reason}")]
    RegisterUnavailable { name: String, reason: String },
    /// The memory reader failed.
    #[error("failed to read memory at {address}: {source}")]
    MemoryReadFailure {
        address: PhysicalAddress,
        #[source]
        source: ReadError,
    },
}

impl Error {
    /// Returns the faulting entry for errors raised while validating a walk.
    pub fn fault(&self) -> Option<&PteFault> {
        match self {
            Error::Unmapped(fault)
            | Error::ReservedFieldInUse(fault)
            | Error::InvalidPermissionCombination(fault)
            | Error::ReservedFlagOnNonLeaf(fault)
            | Error::RecursionLimitExceeded(fault) => Some(fault),
            _ => None,
        }
    }
}

/// Where in a walk a page table entry was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PteFault {
    /// The address being translated, if the walk was a translation.
    pub vaddr: Option<VirtualAddress>,
    /// Level of the table holding the entry (2 is the root).
    pub level: usize,
    /// Physical address of the table holding the entry.
    pub table: PhysicalAddress,
    /// Physical address of the entry itself.
    pub entry_addr: PhysicalAddress,
    /// The entry as read from memory.
    pub pte: PageTableEntry,
}

impl fmt::Display for PteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(vaddr) = self.vaddr {
            write!(f, "translating {vaddr}, ")?;
        }
        write!(
            f,
            "level {} entry at {} (table {}) is {}",
            self.level, self.entry_addr, self.table, self.pte
        )
    }
}

/// Returns early with the given error unless the condition holds.
macro_rules! ensure {
    ($cond:expr, $error:expr) => {
        if !$cond {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
