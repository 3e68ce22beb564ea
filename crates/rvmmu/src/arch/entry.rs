//! Page table entry for Sv39.

use core::fmt;

use crate::{PAGE_SHIFT, PhysicalAddress};

use super::flags::PteFlags;

/// A single Sv39 page table entry.
///
/// The entry format:
/// - Bits 0-7: Flags (V, R, W, X, U, G, A, D)
/// - Bits 8-9: Reserved
/// - Bits 10-53: Physical page number (44 bits)
/// - Bits 54-63: Not decoded
///
/// Any bit pattern decodes. Whether an entry is acceptable to the hardware is
/// judged by the translator, not here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// First bit of the physical page number.
    const PPN_SHIFT: u32 = 10;

    /// Physical page number mask, applied after shifting.
    const PPN_MASK: u64 = (1 << 44) - 1;

    /// Flag bits mask (bits 0-9).
    const FLAGS_MASK: u64 = (1 << Self::PPN_SHIFT) - 1;

    /// Creates an entry from the raw value read out of a table.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Creates a valid leaf entry mapping `address` with the given flags.
    ///
    /// # Panics
    ///
    /// Panics if `address` is not page-aligned.
    pub fn leaf(address: PhysicalAddress, flags: PteFlags) -> Self {
        assert!(
            address.is_aligned(crate::PAGE_SIZE),
            "physical address must be page-aligned"
        );
        Self::from_parts(address.ppn(), flags | PteFlags::VALID)
    }

    /// Creates a valid pointer entry referencing the next-level table at `table`.
    ///
    /// # Panics
    ///
    /// Panics if `table` is not page-aligned.
    pub fn pointer(table: PhysicalAddress) -> Self {
        assert!(
            table.is_aligned(crate::PAGE_SIZE),
            "page table address must be page-aligned"
        );
        Self::from_parts(table.ppn(), PteFlags::VALID)
    }

    /// Assembles an entry from a physical page number and flags without further checks.
    #[inline]
    pub const fn from_parts(ppn: u64, flags: PteFlags) -> Self {
        Self(((ppn & Self::PPN_MASK) << Self::PPN_SHIFT) | (flags.bits() & Self::FLAGS_MASK))
    }

    /// Returns the raw u64 value of this entry.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the flags for this entry.
    #[inline]
    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Returns the physical page number stored in this entry.
    #[inline]
    pub const fn ppn(self) -> u64 {
        (self.0 >> Self::PPN_SHIFT) & Self::PPN_MASK
    }

    /// Returns the physical address of the table or page this entry references.
    #[inline]
    pub const fn address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.ppn() << PAGE_SHIFT)
    }

    /// Returns whether the valid bit is set.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.flags().contains(PteFlags::VALID)
    }

    /// Returns whether this entry maps memory rather than pointing at another table.
    ///
    /// An entry is a leaf as soon as any of R, W or X is set, at every level.
    #[inline]
    pub const fn is_leaf(self) -> bool {
        self.flags().intersects(PteFlags::RWX)
    }

    /// Returns the permission bits (R, W, X) of this entry.
    #[inline]
    pub const fn permissions(self) -> PteFlags {
        self.flags().permissions()
    }

    /// Returns whether either of the two reserved bits is set.
    #[inline]
    pub const fn has_reserved_bits(self) -> bool {
        self.flags().intersects(PteFlags::RESERVED)
    }
}

impl From<u64> for PageTableEntry {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rsw = (self.0 >> 8) & 0b11;
        let upper = self.0 >> 54;

        f.debug_struct("PageTableEntry")
            .field("raw", &format_args!("{:#018x}", self.0))
            .field("upper", &format_args!("{upper:010b}"))
            .field("ppn", &format_args!("{:#x}", self.ppn()))
            .field("rsw", &format_args!("{rsw:02b}"))
            .field("flags", &self.flags())
            .finish()
    }
}

/// Formats the entry as `<raw> [<flags>]`, e.g. `0x000000000001540b [rx]`.
impl fmt::Display for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x} [{}]", self.0, self.flags())?;
        if !self.is_valid() {
            f.write_str(" invalid")?;
        }
        if self.has_reserved_bits() {
            write!(f, " rsw={:02b}", (self.0 >> 8) & 0b11)?;
        }
        Ok(())
    }
}
