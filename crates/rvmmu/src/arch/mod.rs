//! Sv39 paging constants and index arithmetic.
//!
//! Sv39 translates 39-bit virtual addresses through three levels of page tables:
//! - 12-bit page offset (4 KiB pages)
//! - 9-bit index at each level (512 entries per table, 8 bytes per entry)
//! - Level 2 is the root, level 0 maps 4 KiB pages
//!
//! Address layout:
//! - Bits 0-11: Page offset
//! - Bits 12-20: Level 0 index (VPN[0])
//! - Bits 21-29: Level 1 index (VPN[1])
//! - Bits 30-38: Level 2 index (VPN[2])
//! - Bits 39-63: Copies of bit 38

mod entry;
mod flags;

use static_assertions::const_assert_eq;

pub use entry::PageTableEntry;
pub use flags::PteFlags;

/// Number of bits we need to shift an address by to reach the next page.
pub const PAGE_SHIFT: u32 = 12;

/// Page size in bytes (4 KiB).
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Number of page table levels (level 2, 1, 0).
pub const PAGE_TABLE_LEVELS: usize = 3;

/// Number of index bits consumed by each level.
pub const PAGE_ENTRY_SHIFT: u32 = 9;

/// Number of entries in every page table.
pub const PAGE_TABLE_ENTRIES: usize = 512;

/// Size of a single page table entry in bytes.
pub const PTE_SIZE: u64 = 8;

/// Number of significant bits in a virtual address.
pub const VIRT_ADDR_BITS: u32 = 39;

const_assert_eq!(PAGE_TABLE_ENTRIES, 1 << PAGE_ENTRY_SHIFT);
const_assert_eq!(PAGE_TABLE_ENTRIES as u64 * PTE_SIZE, PAGE_SIZE);
const_assert_eq!(
    PAGE_SHIFT + PAGE_TABLE_LEVELS as u32 * PAGE_ENTRY_SHIFT,
    VIRT_ADDR_BITS
);

/// Returns the page table index for a given virtual address at the specified level.
///
/// # Panics
///
/// Panics if `level >= PAGE_TABLE_LEVELS`.
#[inline]
pub const fn page_index(address: u64, level: usize) -> usize {
    assert!(level < PAGE_TABLE_LEVELS, "level out of range for Sv39 (0-2)");
    let shift = PAGE_SHIFT + level as u32 * PAGE_ENTRY_SHIFT;
    ((address >> shift) & (PAGE_TABLE_ENTRIES as u64 - 1)) as usize
}

/// Returns the number of bytes mapped by a leaf entry at the given level.
///
/// That is 4 KiB at level 0, 2 MiB at level 1 and 1 GiB at level 2.
///
/// # Panics
///
/// Panics if `level >= PAGE_TABLE_LEVELS`.
#[inline]
pub const fn page_size_for_level(level: usize) -> u64 {
    assert!(level < PAGE_TABLE_LEVELS, "level out of range for Sv39 (0-2)");
    1 << (PAGE_SHIFT + level as u32 * PAGE_ENTRY_SHIFT)
}
