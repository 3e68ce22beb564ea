use core::fmt;

use crate::{PageTableEntry, PhysicalAddress};

/// One entry read on the way from the root table to a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceStep {
    /// Level of the table (2 is the root).
    pub level: usize,
    /// Physical address of the table.
    pub table: PhysicalAddress,
    /// Index of the entry within the table.
    pub index: usize,
    /// Physical address of the entry.
    pub entry_addr: PhysicalAddress,
    /// The entry as it was read.
    pub pte: PageTableEntry,
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L{} {}[{:#05x}] @ {}: {}",
            self.level, self.table, self.index, self.entry_addr, self.pte
        )
    }
}
