//! Sources of target memory and registers.

mod image;
mod qemu;

pub use image::open_image;
pub use qemu::{MonitorError, QemuMonitor, parse_xp_response};
