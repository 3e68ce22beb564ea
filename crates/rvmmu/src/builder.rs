//! Construction of page table fixtures inside a [`MemoryImage`].
//!
//! Walking real tables needs real tables. `TableBuilder` lays them out the way
//! a kernel would: it owns a root table and allocates intermediate tables from
//! the image as mappings are added.

use crate::{
    MemoryImage, MemoryReader, PAGE_SIZE, PAGE_TABLE_LEVELS, PTE_SIZE, PageTableEntry,
    PhysicalAddress, PteFlags, VirtualAddress, page_size_for_level,
};

/// Builds Sv39 page tables in emulated physical memory.
pub struct TableBuilder<'a> {
    memory: &'a mut MemoryImage,
    /// The root page table.
    root: PhysicalAddress,
}

impl<'a> TableBuilder<'a> {
    /// Creates a builder with a fresh, empty root table allocated from `memory`.
    ///
    /// # Panics
    ///
    /// Panics if `memory` has no room left for a table.
    pub fn new(memory: &'a mut MemoryImage) -> Self {
        let root = alloc_page_table(memory);
        Self { memory, root }
    }

    /// Creates a builder that adds to the existing tables rooted at `root`.
    pub fn with_root(memory: &'a mut MemoryImage, root: PhysicalAddress) -> Self {
        Self { memory, root }
    }

    /// Returns the physical address of the root table.
    pub fn root(&self) -> PhysicalAddress {
        self.root
    }

    /// Maps the page at `virt` to `phys` with a leaf at `level` (0 for 4 KiB pages,
    /// 1 for 2 MiB and 2 for 1 GiB superpages).
    ///
    /// This function walks the page table hierarchy, allocating intermediate tables
    /// as needed, and writes the leaf entry. `flags` should contain at least one
    /// permission bit, otherwise the entry reads back as a pointer.
    ///
    /// # Panics
    ///
    /// Panics if either address is not aligned to the page size of `level`, or if a
    /// leaf is already in the way of an intermediate table.
    pub fn map(&mut self, virt: VirtualAddress, phys: PhysicalAddress, level: usize, flags: PteFlags) {
        let page_size = page_size_for_level(level);
        assert!(
            virt.is_aligned(page_size),
            "virtual address must be aligned to the page size"
        );
        assert!(
            phys.is_aligned(page_size),
            "physical address must be aligned to the page size"
        );

        let table = self.walk_or_create(virt, level);
        self.set_entry(table, virt.vpn(level), PageTableEntry::leaf(phys, flags));
    }

    /// Writes an arbitrary entry into slot `index` of `table`.
    ///
    /// Used to plant entries no well-behaved kernel would write.
    pub fn set_entry(&mut self, table: PhysicalAddress, index: usize, pte: PageTableEntry) {
        self.memory
            .write_u64(table + index as u64 * PTE_SIZE, pte.raw())
            .expect("page table entry outside of emulated memory");
    }

    /// Allocates a new, zeroed table that is not linked into the tree yet.
    pub fn allocate_table(&mut self) -> PhysicalAddress {
        alloc_page_table(self.memory)
    }

    /// Walks the page table hierarchy down to `level`, creating intermediate tables
    /// as needed.
    ///
    /// Returns the physical address of the table at `level` for the given address.
    fn walk_or_create(&mut self, virt: VirtualAddress, level: usize) -> PhysicalAddress {
        let mut table = self.root;

        for current in (level + 1..PAGE_TABLE_LEVELS).rev() {
            let index = virt.vpn(current);
            let entry_addr = table + index as u64 * PTE_SIZE;
            let entry = PageTableEntry::new(
                self.memory
                    .read_u64(entry_addr)
                    .expect("page table entry outside of emulated memory"),
            );

            if !entry.is_valid() {
                let new_table = alloc_page_table(self.memory);
                self.set_entry(table, index, PageTableEntry::pointer(new_table));
                table = new_table;
                continue;
            }

            assert!(
                !entry.is_leaf(),
                "{virt} is already covered by a level {current} leaf"
            );
            table = entry.address();
        }

        table
    }
}

/// Allocates a zeroed, page-aligned page table from the image.
fn alloc_page_table(memory: &mut MemoryImage) -> PhysicalAddress {
    // Tables are never freed, so the allocation is still zeroed.
    memory
        .allocate(PAGE_SIZE as usize, PAGE_SIZE)
        .expect("out of emulated memory")
}
