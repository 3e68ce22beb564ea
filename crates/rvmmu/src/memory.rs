//! Access to the physical memory the page tables live in.

use alloc::string::String;
use alloc::vec::Vec;

use crate::PhysicalAddress;

/// Errors a [`MemoryReader`] backend can report.
///
/// The walkers never interpret these; they are handed back to the caller
/// wrapped in [`Error::MemoryReadFailure`](crate::Error::MemoryReadFailure).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// The address is not backed by this reader.
    #[error("{address} (+{len} bytes) is outside of the backing memory")]
    OutOfBounds { address: PhysicalAddress, len: u64 },
    /// The backend itself failed, e.g. a monitor connection dropped or answered
    /// with something that is not a memory dump.
    #[error("{0}")]
    Backend(String),
}

/// Something that can produce 8 bytes of physical memory.
///
/// Every call is assumed to be slow and to reflect the current state of the
/// target: callers neither cache nor batch reads.
pub trait MemoryReader {
    /// Reads the little-endian 64-bit value at `address`.
    fn read_u64(&self, address: PhysicalAddress) -> Result<u64, ReadError>;
}

impl<R: MemoryReader + ?Sized> MemoryReader for &R {
    fn read_u64(&self, address: PhysicalAddress) -> Result<u64, ReadError> {
        (**self).read_u64(address)
    }
}

/// A flat image of physical memory starting at a base address.
///
/// Backs the `--image` option of the command line tool and every test fixture.
/// Fixtures carve page tables out of it with [`MemoryImage::allocate`], a simple
/// bump allocator.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    /// Physical address of `bytes[0]`.
    base: PhysicalAddress,
    /// The underlying memory buffer.
    bytes: Vec<u8>,
    /// Next allocation offset.
    next_alloc: usize,
}

impl MemoryImage {
    /// Creates a zero-filled image of `size` bytes at `base`.
    pub fn new(base: PhysicalAddress, size: usize) -> Self {
        Self::from_bytes(base, alloc::vec![0u8; size])
    }

    /// Wraps existing memory contents, e.g. a dump file, located at `base`.
    pub fn from_bytes(base: PhysicalAddress, bytes: Vec<u8>) -> Self {
        Self {
            base,
            bytes,
            next_alloc: 0,
        }
    }

    /// Returns the physical address of the first byte of the image.
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// Returns the size of the image in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns whether the image holds no memory at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Allocates a block of memory from the image.
    ///
    /// Returns the physical address of the allocated block, or None if there's
    /// not enough space left. Alignment is relative to physical addresses, not
    /// to the start of the image.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    pub fn allocate(&mut self, size: usize, align: u64) -> Option<PhysicalAddress> {
        let start = self.base + self.next_alloc as u64;
        let aligned = PhysicalAddress::new(start.as_u64().checked_add(align - 1)?).align_down(align);
        let offset = usize::try_from(aligned - self.base).ok()?;
        let end = offset.checked_add(size)?;

        if end > self.bytes.len() {
            return None;
        }

        self.next_alloc = end;
        Some(aligned)
    }

    /// Writes a little-endian 64-bit value at `address`.
    pub fn write_u64(&mut self, address: PhysicalAddress, value: u64) -> Result<(), ReadError> {
        let range = self.range(address, 8)?;
        self.bytes[range].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn range(&self, address: PhysicalAddress, len: u64) -> Result<core::ops::Range<usize>, ReadError> {
        let out_of_bounds = ReadError::OutOfBounds { address, len };

        if address < self.base {
            return Err(out_of_bounds);
        }

        let start = usize::try_from(address - self.base).map_err(|_| out_of_bounds.clone())?;
        let end = start
            .checked_add(len as usize)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(out_of_bounds)?;

        Ok(start..end)
    }
}

impl MemoryReader for MemoryImage {
    fn read_u64(&self, address: PhysicalAddress) -> Result<u64, ReadError> {
        let range = self.range(address, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[range]);
        Ok(u64::from_le_bytes(buf))
    }
}
