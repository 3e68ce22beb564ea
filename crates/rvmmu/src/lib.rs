#![cfg_attr(not(test), no_std)]

//! # rvmmu
//!
//! Inspection of RISC-V Sv39 page tables living in somebody else's memory.
//! It provides:
//!
//! - Decoding of page table entries, the `satp` register and the trap cause
//!   and status registers.
//! - A dump walker that enumerates every mapping reachable from a root table.
//! - A strict translator that performs the same walk the hardware would and
//!   rejects every entry the hardware would fault on.
//! - A [`MemoryReader`] abstraction so the tables can be read from a memory
//!   image, a simulator monitor or anything else that can produce 8 bytes of
//!   physical memory.
//!
//! Nothing in this crate caches memory contents: every entry is read exactly
//! when the walk reaches it.

extern crate alloc;

mod address;
mod arch;
#[cfg(any(test, feature = "software-emulation"))]
mod builder;
pub mod cause;
mod error;
mod human;
mod memory;
mod satp;
mod trace;
mod translate;
mod trap;
mod walker;

pub use address::{PhysicalAddress, VirtualAddress};
pub use arch::{
    PAGE_SHIFT, PAGE_SIZE, PAGE_TABLE_ENTRIES, PAGE_TABLE_LEVELS, PTE_SIZE, PageTableEntry,
    PteFlags, VIRT_ADDR_BITS, page_index, page_size_for_level,
};
#[cfg(any(test, feature = "software-emulation"))]
pub use builder::TableBuilder;
pub use error::{Error, PteFault, Result};
pub use human::{HumanAddress, HumanSize};
pub use memory::{MemoryImage, MemoryReader, ReadError};
pub use satp::{Satp, SatpMode, ensure_supported_architecture};
pub use trace::TraceStep;
pub use translate::{AddressTranslator, Translation};
pub use trap::{RegisterSource, TrapKind, TrapReport, decode_mcause, decode_scause};
pub use walker::{DumpRecord, DumpSummary, FoundMapping, Mapping, PageTableDump, PageTableWalker};
