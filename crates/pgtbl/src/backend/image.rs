use std::fs;
use std::io;
use std::path::Path;

use rvmmu::{HumanAddress, HumanSize, MemoryImage, PhysicalAddress};

/// Loads a raw dump of physical memory whose first byte lives at `base`.
pub fn open_image(path: &Path, base: PhysicalAddress) -> io::Result<MemoryImage> {
    let bytes = fs::read(path)?;
    log::debug!(
        "loaded {} ({}) at {}",
        path.display(),
        HumanSize(bytes.len() as u64),
        HumanAddress::from(base)
    );
    Ok(MemoryImage::from_bytes(base, bytes))
}
