//! # pgtbl
//!
//! The command line front end for [`rvmmu`]: memory and register backends,
//! argument parsing helpers, the stderr logger and the text renderers. The
//! binary in `main.rs` only wires these together.

pub mod backend;
pub mod console;
pub mod hex;
pub mod registers;
pub mod render;
