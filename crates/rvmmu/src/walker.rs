//! Enumeration of every mapping in a page table tree.
//!
//! The walk is a depth-first traversal in table order, kept on an explicit
//! stack that never grows beyond the three Sv39 levels. Table contents are
//! not validated the way [`AddressTranslator`](crate::AddressTranslator) does;
//! a dump shows what is there, including entries the hardware would reject.
//! The only hard error besides failing reads is a pointer in a level 0 table,
//! which would need a fourth level.

use alloc::vec::Vec;
use core::ops::ControlFlow;

use crate::error::{Error, PteFault, Result};
use crate::{
    MemoryReader, PAGE_TABLE_ENTRIES, PAGE_TABLE_LEVELS, PTE_SIZE, PageTableEntry,
    PhysicalAddress, PteFlags, TraceStep, VirtualAddress, page_size_for_level,
};

/// A leaf entry and the region of memory it maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Level of the table holding the leaf.
    pub level: usize,
    /// Index of the leaf in its table.
    pub index: usize,
    /// Physical address of the leaf entry.
    pub entry_addr: PhysicalAddress,
    /// The leaf entry.
    pub pte: PageTableEntry,
    /// First virtual address covered by the leaf.
    pub vaddr: VirtualAddress,
    /// First physical address covered by the leaf.
    pub paddr: PhysicalAddress,
}

impl Mapping {
    /// Returns the number of bytes the leaf maps.
    pub const fn page_size(&self) -> u64 {
        page_size_for_level(self.level)
    }

    /// Returns the R/W/X permissions of the leaf.
    pub const fn permissions(&self) -> PteFlags {
        self.pte.permissions()
    }

    /// Returns whether `vaddr` falls inside the mapped region.
    pub fn contains(&self, vaddr: VirtualAddress) -> bool {
        vaddr >= self.vaddr && vaddr - self.vaddr < self.page_size()
    }
}

/// One line of a dump, in walk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpRecord {
    /// The walk entered a table. Followed by the table's valid entries.
    Table {
        level: usize,
        address: PhysicalAddress,
    },
    /// A valid entry pointing at the next table. The next table's records follow.
    Pointer {
        level: usize,
        index: usize,
        entry_addr: PhysicalAddress,
        pte: PageTableEntry,
    },
    /// A valid leaf entry.
    Leaf(Mapping),
}

/// Everything found below a root table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTableDump {
    pub root: PhysicalAddress,
    pub records: Vec<DumpRecord>,
}

/// Counts of what a dump contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub tables: usize,
    pub pointers: usize,
    /// Leaves by level: 4 KiB, 2 MiB and 1 GiB pages.
    pub leaves: [usize; PAGE_TABLE_LEVELS],
}

impl DumpSummary {
    pub fn total_leaves(&self) -> usize {
        self.leaves.iter().sum()
    }
}

impl PageTableDump {
    /// Returns all leaves, in walk order.
    pub fn mappings(&self) -> impl Iterator<Item = &Mapping> {
        self.records.iter().filter_map(|record| match record {
            DumpRecord::Leaf(mapping) => Some(mapping),
            _ => None,
        })
    }

    pub fn summary(&self) -> DumpSummary {
        let mut summary = DumpSummary::default();
        for record in &self.records {
            match record {
                DumpRecord::Table { .. } => summary.tables += 1,
                DumpRecord::Pointer { .. } => summary.pointers += 1,
                DumpRecord::Leaf(mapping) => summary.leaves[mapping.level] += 1,
            }
        }
        summary
    }
}

/// The result of a filtered walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundMapping {
    /// The leaf covering the searched address.
    pub mapping: Mapping,
    /// The searched address translated through the leaf.
    pub paddr: PhysicalAddress,
    /// The entries on the path from the root to the leaf, the leaf last.
    pub trace: Vec<TraceStep>,
}

/// What the walk reports to its visitor.
enum Visit<'t> {
    Table(usize, PhysicalAddress),
    Pointer(TraceStep),
    Leaf {
        mapping: Mapping,
        /// Pointer entries leading to the leaf's table.
        path: &'t [TraceStep],
    },
}

/// A table the walk is currently iterating over.
struct Cursor {
    table: PhysicalAddress,
    level: usize,
    next_index: usize,
}

/// Enumerates page table trees read through a [`MemoryReader`].
pub struct PageTableWalker<'a, R: ?Sized> {
    memory: &'a R,
}

impl<'a, R: MemoryReader + ?Sized> PageTableWalker<'a, R> {
    pub fn new(memory: &'a R) -> Self {
        Self { memory }
    }

    /// Lists every valid entry reachable from `root`.
    pub fn dump(&self, root: PhysicalAddress) -> Result<PageTableDump> {
        let mut records = Vec::new();

        self.walk(root, |visit| {
            records.push(match visit {
                Visit::Table(level, address) => DumpRecord::Table { level, address },
                Visit::Pointer(step) => DumpRecord::Pointer {
                    level: step.level,
                    index: step.index,
                    entry_addr: step.entry_addr,
                    pte: step.pte,
                },
                Visit::Leaf { mapping, .. } => DumpRecord::Leaf(mapping),
            });
            ControlFlow::Continue(())
        })?;

        Ok(PageTableDump { root, records })
    }

    /// Searches the tree below `root` for the leaf that maps `vaddr`.
    ///
    /// The search visits the tree in the same order as [`dump`](Self::dump) and
    /// stops at the first leaf whose region contains `vaddr`. It does not jump
    /// straight to the indices `vaddr` selects, so a stray superpage higher up
    /// in the tree is found as well. Returns `None` if no leaf covers `vaddr`.
    pub fn find(&self, root: PhysicalAddress, vaddr: VirtualAddress) -> Result<Option<FoundMapping>> {
        let mut found = None;

        self.walk(root, |visit| match visit {
            Visit::Leaf { mapping, path } if mapping.contains(vaddr) => {
                let mut trace = path.to_vec();
                trace.push(TraceStep {
                    level: mapping.level,
                    table: mapping.entry_addr - mapping.index as u64 * PTE_SIZE,
                    index: mapping.index,
                    entry_addr: mapping.entry_addr,
                    pte: mapping.pte,
                });
                found = Some(FoundMapping {
                    mapping,
                    paddr: mapping.paddr + (vaddr - mapping.vaddr),
                    trace,
                });
                ControlFlow::Break(())
            }
            Visit::Leaf { mapping, .. } => {
                log::trace!("find {vaddr}: skipping {} ({})", mapping.vaddr, mapping.entry_addr);
                ControlFlow::Continue(())
            }
            _ => ControlFlow::Continue(()),
        })?;

        Ok(found)
    }

    fn walk<F>(&self, root: PhysicalAddress, mut visit: F) -> Result<()>
    where
        F: FnMut(Visit<'_>) -> ControlFlow<()>,
    {
        let mut stack: Vec<Cursor> = Vec::with_capacity(PAGE_TABLE_LEVELS);
        let mut path: Vec<TraceStep> = Vec::with_capacity(PAGE_TABLE_LEVELS);
        let mut indices: Vec<usize> = Vec::with_capacity(PAGE_TABLE_LEVELS);

        stack.push(Cursor {
            table: root,
            level: PAGE_TABLE_LEVELS - 1,
            next_index: 0,
        });
        log::trace!("walking table {root} (L{})", PAGE_TABLE_LEVELS - 1);
        if visit(Visit::Table(PAGE_TABLE_LEVELS - 1, root)).is_break() {
            return Ok(());
        }

        while let Some(cursor) = stack.last_mut() {
            if cursor.next_index == PAGE_TABLE_ENTRIES {
                stack.pop();
                path.pop();
                continue;
            }

            let index = cursor.next_index;
            cursor.next_index += 1;
            let (table, level) = (cursor.table, cursor.level);

            let entry_addr = table + index as u64 * PTE_SIZE;
            let pte = self
                .memory
                .read_u64(entry_addr)
                .map(PageTableEntry::new)
                .map_err(|source| Error::MemoryReadFailure {
                    address: entry_addr,
                    source,
                })?;

            if !pte.is_valid() {
                continue;
            }

            let step = TraceStep {
                level,
                table,
                index,
                entry_addr,
                pte,
            };

            if pte.is_leaf() {
                indices.clear();
                indices.extend(path.iter().map(|step| step.index));
                indices.push(index);

                let mapping = Mapping {
                    level,
                    index,
                    entry_addr,
                    pte,
                    vaddr: VirtualAddress::from_indices(&indices),
                    paddr: pte.address(),
                };

                if visit(Visit::Leaf { mapping, path: &path }).is_break() {
                    return Ok(());
                }
                continue;
            }

            if level == 0 {
                return Err(Error::RecursionLimitExceeded(PteFault {
                    vaddr: None,
                    level,
                    table,
                    entry_addr,
                    pte,
                }));
            }

            if visit(Visit::Pointer(step)).is_break() {
                return Ok(());
            }

            let next = pte.address();
            log::trace!("walking table {next} (L{}) from {entry_addr}", level - 1);

            path.push(step);
            stack.push(Cursor {
                table: next,
                level: level - 1,
                next_index: 0,
            });

            if visit(Visit::Table(level - 1, next)).is_break() {
                return Ok(());
            }
        }

        Ok(())
    }
}
