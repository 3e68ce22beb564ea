//! Address types for the physical and virtual side of a translation.
//!
//! Both are plain 64-bit newtypes. Neither validates on construction: the
//! addresses handled here come out of registers and page tables of a target
//! that may well be broken, and the walkers report such problems as errors
//! instead of refusing to represent them.

use core::fmt;
use core::ops::{Add, Sub};

use crate::arch::{self, PAGE_ENTRY_SHIFT, PAGE_SHIFT, PAGE_TABLE_LEVELS, VIRT_ADDR_BITS};

/// Macro to define common address type functionality.
///
/// This macro generates the basic structure and methods common to both physical
/// and virtual address types.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new address.
            #[inline]
            pub const fn new(addr: u64) -> Self {
                Self(addr)
            }

            /// Returns the raw address value.
            #[inline]
            pub const fn as_u64(self) -> u64 {
                self.0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: u64) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Aligns the address down to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_down(self, align: u64) -> Self {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                Self(self.0 & !(align - 1))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(addr: u64) -> Self {
                Self(addr)
            }
        }

        impl From<$name> for u64 {
            #[inline]
            fn from(addr: $name) -> Self {
                addr.0
            }
        }

        impl Add<u64> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: u64) -> Self::Output {
                Self(self.0.wrapping_add(rhs))
            }
        }

        impl Sub<u64> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: u64) -> Self::Output {
                Self(self.0.wrapping_sub(rhs))
            }
        }

        impl Sub<$name> for $name {
            type Output = u64;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0.wrapping_sub(rhs.0)
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     Page tables and the pages they map are located by physical address."
);

impl PhysicalAddress {
    /// Creates the address of the first byte of physical page `ppn`.
    #[inline]
    pub const fn from_ppn(ppn: u64) -> Self {
        Self(ppn << PAGE_SHIFT)
    }

    /// Returns the physical page number this address falls into.
    #[inline]
    pub const fn ppn(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address.\n\n\
     Provides the Sv39 split into per-level page table indices and page offset."
);

impl VirtualAddress {
    /// Returns the page table index (VPN segment) used at `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level >= PAGE_TABLE_LEVELS`.
    #[inline]
    pub const fn vpn(self, level: usize) -> usize {
        arch::page_index(self.0, level)
    }

    /// Returns the offset within a 4 KiB page.
    #[inline]
    pub const fn page_offset(self) -> u64 {
        self.0 & (arch::PAGE_SIZE - 1)
    }

    /// Returns the offset within a page mapped by a leaf at `level`.
    ///
    /// For a superpage this includes the VPN segments below the leaf's level.
    #[inline]
    pub const fn offset_in_level(self, level: usize) -> u64 {
        self.0 & (arch::page_size_for_level(level) - 1)
    }

    /// Returns whether bits 39 to 63 are copies of bit 38.
    #[inline]
    pub const fn is_canonical(self) -> bool {
        self.0 == Self::sign_extend(self.0).0
    }

    /// Assembles the base address of a mapping from the table indices used to reach it.
    ///
    /// `indices[0]` is the root (level 2) index and each further element belongs to
    /// the next lower level. A path shorter than three elements describes a superpage
    /// leaf: the missing low segments are zero. The result is sign-extended from
    /// bit 38, so it is always canonical.
    ///
    /// # Panics
    ///
    /// Panics if more than three indices are given or an index does not fit in 9 bits.
    pub fn from_indices(indices: &[usize]) -> Self {
        assert!(
            indices.len() <= PAGE_TABLE_LEVELS,
            "an Sv39 path has at most three indices"
        );

        let mut addr = 0u64;
        for (depth, &index) in indices.iter().enumerate() {
            assert!(index < arch::PAGE_TABLE_ENTRIES, "page table index out of range");
            let level = PAGE_TABLE_LEVELS - 1 - depth;
            addr |= (index as u64) << (PAGE_SHIFT + level as u32 * PAGE_ENTRY_SHIFT);
        }

        Self::sign_extend(addr)
    }

    const fn sign_extend(addr: u64) -> Self {
        let shift = u64::BITS - VIRT_ADDR_BITS;
        Self((((addr << shift) as i64) >> shift) as u64)
    }
}
