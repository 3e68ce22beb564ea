//! Strict single-path translation of a virtual address.
//!
//! This is the walk the MMU performs on a TLB miss: one entry per level,
//! starting at the root, until a leaf is found. Every entry the hardware
//! would raise a page fault for is rejected with the matching [`Error`].
//! Permissions are taken from the leaf alone; nothing is inherited from the
//! pointer entries above it.

use alloc::vec::Vec;

use crate::error::{Error, PteFault, Result, ensure};
use crate::{
    MemoryReader, PAGE_TABLE_LEVELS, PTE_SIZE, PageTableEntry, PhysicalAddress, PteFlags,
    TraceStep, VirtualAddress, page_size_for_level,
};

/// The result of a successful translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// The address that was translated.
    pub vaddr: VirtualAddress,
    /// The physical address it translates to.
    pub paddr: PhysicalAddress,
    /// Level of the leaf that ended the walk; above 0 for superpages.
    pub level: usize,
    /// The leaf entry.
    pub pte: PageTableEntry,
    /// Every entry read, root first. The last step is the leaf.
    pub trace: Vec<TraceStep>,
}

impl Translation {
    /// Returns the size of the page the leaf maps.
    pub const fn page_size(&self) -> u64 {
        page_size_for_level(self.level)
    }

    /// Returns the effective R/W/X permissions.
    pub const fn permissions(&self) -> PteFlags {
        self.pte.permissions()
    }
}

/// Performs hardware-faithful Sv39 translations against a [`MemoryReader`].
pub struct AddressTranslator<'a, R: ?Sized> {
    memory: &'a R,
}

impl<'a, R: MemoryReader + ?Sized> AddressTranslator<'a, R> {
    pub fn new(memory: &'a R) -> Self {
        Self { memory }
    }

    /// Translates `vaddr` through the table tree rooted at `root`.
    ///
    /// The checks on every entry are, in order: valid bit, reserved bits,
    /// write-without-read, then leaf detection. Pointer entries must not carry
    /// the A, D or U bits. A pointer in a level 0 table ends the walk with
    /// [`Error::RecursionLimitExceeded`], so cyclic tables terminate after at
    /// most three reads.
    pub fn translate(&self, root: PhysicalAddress, vaddr: VirtualAddress) -> Result<Translation> {
        ensure!(vaddr.is_canonical(), Error::NonCanonicalAddress(vaddr));

        let mut trace = Vec::with_capacity(PAGE_TABLE_LEVELS);
        let mut table = root;
        let mut level = PAGE_TABLE_LEVELS - 1;

        loop {
            let index = vaddr.vpn(level);
            let entry_addr = table + index as u64 * PTE_SIZE;
            let pte = self.read_entry(entry_addr)?;

            log::trace!("translate {vaddr}: L{level} {table}[{index:#05x}] = {pte}");

            trace.push(TraceStep {
                level,
                table,
                index,
                entry_addr,
                pte,
            });

            let fault = PteFault {
                vaddr: Some(vaddr),
                level,
                table,
                entry_addr,
                pte,
            };
            let flags = pte.flags();

            ensure!(pte.is_valid(), Error::Unmapped(fault));
            ensure!(!pte.has_reserved_bits(), Error::ReservedFieldInUse(fault));
            ensure!(
                !(flags.contains(PteFlags::WRITE) && !flags.contains(PteFlags::READ)),
                Error::InvalidPermissionCombination(fault)
            );

            if pte.is_leaf() {
                let paddr = pte.address() + vaddr.offset_in_level(level);
                return Ok(Translation {
                    vaddr,
                    paddr,
                    level,
                    pte,
                    trace,
                });
            }

            ensure!(
                !flags.intersects(PteFlags::LEAF_ONLY),
                Error::ReservedFlagOnNonLeaf(fault)
            );
            ensure!(level > 0, Error::RecursionLimitExceeded(fault));

            table = pte.address();
            level -= 1;
        }
    }

    fn read_entry(&self, address: PhysicalAddress) -> Result<PageTableEntry> {
        self.memory
            .read_u64(address)
            .map(PageTableEntry::new)
            .map_err(|source| Error::MemoryReadFailure { address, source })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{MemoryImage, ReadError, TableBuilder};

    const RX: PteFlags = PteFlags::READ.union(PteFlags::EXECUTE);
    const RW: PteFlags = PteFlags::READ.union(PteFlags::WRITE);

    fn leaf(ppn: u64, flags: PteFlags) -> u64 {
        PageTableEntry::from_parts(ppn, flags | PteFlags::VALID).raw()
    }

    fn pointer(table: u64) -> u64 {
        PageTableEntry::pointer(PhysicalAddress::new(table)).raw()
    }

    /// Root at 0x1000 -> 0x2000 -> 0x3000, slot 0 everywhere.
    fn three_level_chain(last: u64) -> MemoryImage {
        let mut memory = MemoryImage::new(PhysicalAddress::new(0), 0x4000);
        memory.write_u64(PhysicalAddress::new(0x1000), pointer(0x2000)).unwrap();
        memory.write_u64(PhysicalAddress::new(0x2000), pointer(0x3000)).unwrap();
        memory.write_u64(PhysicalAddress::new(0x3000), last).unwrap();
        memory
    }

    fn translate(memory: &MemoryImage, root: u64, vaddr: u64) -> Result<Translation> {
        AddressTranslator::new(memory).translate(PhysicalAddress::new(root), VirtualAddress::new(vaddr))
    }

    #[test]
    fn translates_three_level_chain() {
        let memory = three_level_chain(leaf(0x55, RX));
        let translation = translate(&memory, 0x1000, 0).unwrap();

        assert_eq!(translation.paddr, PhysicalAddress::new(0x55000));
        assert_eq!(translation.permissions(), RX);
        assert_eq!(translation.level, 0);
        assert_eq!(translation.page_size(), 0x1000);

        let entries: Vec<_> = translation.trace.iter().map(|step| step.entry_addr.as_u64()).collect();
        assert_eq!(entries, [0x1000, 0x2000, 0x3000]);
    }

    #[test]
    fn keeps_page_offset() {
        let memory = three_level_chain(leaf(0x55, RX));
        let translation = translate(&memory, 0x1000, 0xABC).unwrap();
        assert_eq!(translation.paddr, PhysicalAddress::new(0x55ABC));
    }

    #[test]
    fn invalid_entry_is_unmapped() {
        let memory = three_level_chain(leaf(0x55, RX) & !PteFlags::VALID.bits());
        let err = translate(&memory, 0x1000, 0).unwrap_err();

        let Error::Unmapped(fault) = err else {
            panic!("expected Unmapped, got {err:?}");
        };
        assert_eq!(fault.level, 0);
        assert_eq!(fault.entry_addr, PhysicalAddress::new(0x3000));
    }

    #[test]
    fn empty_root_slot_is_unmapped_at_level_two() {
        let memory = three_level_chain(leaf(0x55, RX));
        let err = translate(&memory, 0x1000, 1 << 30).unwrap_err();

        assert_eq!(err.fault().map(|fault| fault.level), Some(2));
        assert_eq!(
            err.fault().map(|fault| fault.entry_addr),
            Some(PhysicalAddress::new(0x1008))
        );
        assert!(matches!(err, Error::Unmapped(_)));
    }

    #[test]
    fn reserved_bits_fault_even_on_valid_leaves() {
        for bit in [8, 9] {
            let memory = three_level_chain(leaf(0x55, RX) | (1 << bit));
            assert!(matches!(
                translate(&memory, 0x1000, 0),
                Err(Error::ReservedFieldInUse(_))
            ));
        }
    }

    #[test]
    fn reserved_bits_fault_on_pointers() {
        let mut memory = three_level_chain(leaf(0x55, RX));
        memory
            .write_u64(PhysicalAddress::new(0x1000), pointer(0x2000) | (1 << 9))
            .unwrap();

        let err = translate(&memory, 0x1000, 0).unwrap_err();
        assert!(matches!(err, Error::ReservedFieldInUse(PteFault { level: 2, .. })));
    }

    #[test]
    fn write_without_read_is_rejected() {
        let memory = three_level_chain(leaf(0x55, PteFlags::WRITE | PteFlags::EXECUTE));
        assert!(matches!(
            translate(&memory, 0x1000, 0),
            Err(Error::InvalidPermissionCombination(_))
        ));
    }

    #[test]
    fn leaf_only_bits_on_pointers_are_rejected() {
        for flag in [PteFlags::ACCESSED, PteFlags::DIRTY, PteFlags::USER] {
            let mut memory = three_level_chain(leaf(0x55, RX));
            memory
                .write_u64(PhysicalAddress::new(0x2000), pointer(0x3000) | flag.bits())
                .unwrap();

            let err = translate(&memory, 0x1000, 0).unwrap_err();
            assert!(matches!(err, Error::ReservedFlagOnNonLeaf(PteFault { level: 1, .. })));
        }
    }

    #[test]
    fn global_bit_on_pointers_is_fine() {
        let mut memory = three_level_chain(leaf(0x55, RX));
        memory
            .write_u64(
                PhysicalAddress::new(0x2000),
                pointer(0x3000) | PteFlags::GLOBAL.bits(),
            )
            .unwrap();

        assert!(translate(&memory, 0x1000, 0).is_ok());
    }

    #[test]
    fn pointer_at_level_zero_exceeds_depth() {
        let memory = three_level_chain(pointer(0x1000));
        let err = translate(&memory, 0x1000, 0).unwrap_err();
        assert!(matches!(err, Error::RecursionLimitExceeded(PteFault { level: 0, .. })));
    }

    #[test]
    fn pointer_cycle_terminates() {
        // A -> B -> A -> B ...
        let mut memory = MemoryImage::new(PhysicalAddress::new(0), 0x3000);
        memory.write_u64(PhysicalAddress::new(0x1000), pointer(0x2000)).unwrap();
        memory.write_u64(PhysicalAddress::new(0x2000), pointer(0x1000)).unwrap();

        let err = translate(&memory, 0x1000, 0).unwrap_err();
        let Error::RecursionLimitExceeded(fault) = err else {
            panic!("expected RecursionLimitExceeded, got {err:?}");
        };
        assert_eq!(fault.table, PhysicalAddress::new(0x1000));
        assert_eq!(fault.level, 0);
    }

    #[test]
    fn superpage_at_level_one() {
        let mut memory = MemoryImage::new(PhysicalAddress::new(0), 0x3000);
        memory.write_u64(PhysicalAddress::new(0x1000), pointer(0x2000)).unwrap();
        // 2 MiB page at 0x8020_0000 in slot 3 of the level 1 table
        memory
            .write_u64(PhysicalAddress::new(0x2000 + 3 * 8), leaf(0x80200, RW))
            .unwrap();

        let vaddr = (3 << 21) | (0x1AB << 12) | 0x123;
        let translation = translate(&memory, 0x1000, vaddr).unwrap();

        assert_eq!(translation.level, 1);
        assert_eq!(translation.page_size(), 0x20_0000);
        assert_eq!(translation.paddr, PhysicalAddress::new(0x8020_0000 + (0x1AB << 12) + 0x123));
        assert_eq!(translation.trace.len(), 2);
    }

    #[test]
    fn superpage_at_level_two() {
        let mut memory = MemoryImage::new(PhysicalAddress::new(0), 0x2000);
        memory
            .write_u64(PhysicalAddress::new(0x1000 + 2 * 8), leaf(0x80000, RX))
            .unwrap();

        let vaddr = (2 << 30) | (0x17 << 21) | (0x1FF << 12) | 0xFFF;
        let translation = translate(&memory, 0x1000, vaddr).unwrap();

        assert_eq!(translation.level, 2);
        assert_eq!(
            translation.paddr,
            PhysicalAddress::new(0x8000_0000 + (0x17 << 21) + (0x1FF << 12) + 0xFFF)
        );
    }

    #[test]
    fn non_canonical_addresses_are_rejected_before_reading() {
        let memory = MemoryImage::new(PhysicalAddress::new(0), 0);
        assert_eq!(
            translate(&memory, 0x1000, 0x40_0000_0000),
            Err(Error::NonCanonicalAddress(VirtualAddress::new(0x40_0000_0000)))
        );
    }

    #[test]
    fn read_errors_pass_through() {
        let memory = MemoryImage::new(PhysicalAddress::new(0x8000_0000), 0x1000);
        assert_eq!(
            translate(&memory, 0x1000, 0),
            Err(Error::MemoryReadFailure {
                address: PhysicalAddress::new(0x1000),
                source: ReadError::OutOfBounds {
                    address: PhysicalAddress::new(0x1000),
                    len: 8
                },
            })
        );
    }

    #[test]
    fn upper_half_addresses_use_root_index_256_and_up() {
        let mut memory = MemoryImage::new(PhysicalAddress::new(0x8000_0000), 0x10_0000);
        let mut builder = TableBuilder::new(&mut memory);
        builder.map(
            VirtualAddress::new(0xFFFF_FFC0_0020_0000),
            PhysicalAddress::new(0x8020_0000),
            0,
            RX,
        );
        let root = builder.root();

        let translation = AddressTranslator::new(&memory)
            .translate(root, VirtualAddress::new(0xFFFF_FFC0_0020_0010))
            .unwrap();
        assert_eq!(translation.trace[0].index, 256);
        assert_eq!(translation.paddr, PhysicalAddress::new(0x8020_0010));
    }

    fn writable_without_readable() -> impl Strategy<Value = u64> {
        any::<u64>().prop_map(|bits| (bits | PteFlags::WRITE.bits() | PteFlags::VALID.bits()) & !PteFlags::READ.bits())
    }

    proptest! {
        #[test]
        fn level_zero_leaf_keeps_offset(
            vpn2 in 0usize..512,
            vpn1 in 0usize..512,
            vpn0 in 0usize..512,
            offset in 0u64..0x1000,
            ppn in 0u64..(1 << 44),
        ) {
            let mut memory = MemoryImage::new(PhysicalAddress::new(0x8000_0000), 0x10_0000);
            let base = VirtualAddress::from_indices(&[vpn2, vpn1, vpn0]);
            let mut builder = TableBuilder::new(&mut memory);
            builder.map(base, PhysicalAddress::from_ppn(ppn), 0, RX);
            let root = builder.root();

            let translation = AddressTranslator::new(&memory).translate(root, base + offset).unwrap();
            prop_assert_eq!(translation.paddr, PhysicalAddress::from_ppn(ppn) + offset);
            prop_assert_eq!(translation.permissions(), RX);
            prop_assert_eq!(translation.level, 0);
        }

        #[test]
        fn superpages_keep_the_full_low_offset(
            level in 1usize..3,
            vpn2 in 0usize..512,
            vpn1 in 0usize..512,
            low in any::<u64>(),
            ppn in 0u64..(1 << 26),
        ) {
            let mut memory = MemoryImage::new(PhysicalAddress::new(0x8000_0000), 0x10_0000);
            let indices = [vpn2, vpn1];
            let base = VirtualAddress::from_indices(&indices[..3 - level]);
            let page_size = page_size_for_level(level);
            // Superpages are naturally aligned
            let ppn = ppn << ((level as u32) * 9);
            let offset = low & (page_size - 1);

            let mut builder = TableBuilder::new(&mut memory);
            builder.map(base, PhysicalAddress::from_ppn(ppn), level, RW);
            let root = builder.root();

            let translation = AddressTranslator::new(&memory).translate(root, base + offset).unwrap();
            prop_assert_eq!(translation.level, level);
            prop_assert_eq!(translation.paddr, PhysicalAddress::from_ppn(ppn) + offset);
        }

        #[test]
        fn write_without_read_always_fails(raw in writable_without_readable()) {
            let memory = three_level_chain(raw);
            let result = translate(&memory, 0x1000, 0);
            // Reserved bits are checked first; everything else is the permission fault.
            if PageTableEntry::new(raw).has_reserved_bits() {
                prop_assert!(matches!(result, Err(Error::ReservedFieldInUse(_))));
            } else {
                prop_assert!(matches!(result, Err(Error::InvalidPermissionCombination(_))));
            }
        }

        #[test]
        fn reserved_bits_always_fail(raw in any::<u64>(), reserved in 1u64..4) {
            let raw = (raw | PteFlags::VALID.bits()) & !(0b11 << 8) | (reserved << 8);
            let memory = three_level_chain(raw);
            prop_assert!(matches!(
                translate(&memory, 0x1000, 0),
                Err(Error::ReservedFieldInUse(_))
            ));
        }
    }
}
