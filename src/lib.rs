//! Memory layout facts from GNU ld linker scripts and map files.

#![warn(missing_docs)]

pub mod addr;
pub mod parse;
pub mod usage;
