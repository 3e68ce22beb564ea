//! Page table entry flags for Sv39.

use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// The low ten bits of an Sv39 page table entry.
    ///
    /// `RESERVED0` and `RESERVED1` are the two bits between `DIRTY` and the
    /// physical page number. They must be zero in every entry the translator
    /// accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PteFlags: u64 {
        const VALID     = 1 << 0;
        const READ      = 1 << 1;
        const WRITE     = 1 << 2;
        const EXECUTE   = 1 << 3;
        const USER      = 1 << 4;
        const GLOBAL    = 1 << 5;
        const ACCESSED  = 1 << 6;
        const DIRTY     = 1 << 7;
        const RESERVED0 = 1 << 8;
        const RESERVED1 = 1 << 9;
    }
}

impl PteFlags {
    /// The permission bits; an entry with any of them set is a leaf.
    pub const RWX: Self = Self::READ.union(Self::WRITE).union(Self::EXECUTE);

    /// Both reserved bits.
    pub const RESERVED: Self = Self::RESERVED0.union(Self::RESERVED1);

    /// Bits that only carry meaning on leaf entries.
    pub const LEAF_ONLY: Self = Self::ACCESSED.union(Self::DIRTY).union(Self::USER);

    /// Returns only the permission bits of these flags.
    #[inline]
    pub const fn permissions(self) -> Self {
        self.intersection(Self::RWX)
    }
}

/// Formats the flags as permission letters in the order `rwxugad`, leaving out
/// the ones that are not set. Valid and reserved bits are not shown.
impl fmt::Display for PteFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LETTERS: [(PteFlags, char); 7] = [
            (PteFlags::READ, 'r'),
            (PteFlags::WRITE, 'w'),
            (PteFlags::EXECUTE, 'x'),
            (PteFlags::USER, 'u'),
            (PteFlags::GLOBAL, 'g'),
            (PteFlags::ACCESSED, 'a'),
            (PteFlags::DIRTY, 'd'),
        ];

        let mut any = false;
        for (flag, letter) in LETTERS {
            if self.contains(flag) {
                fmt::Write::write_char(f, letter)?;
                any = true;
            }
        }

        if !any {
            f.write_str("-")?;
        }

        Ok(())
    }
}
