//! Pipetag Tagging
//!
//! Builds the address range to tag set maps consumed by the policy validator and moves them
//! in and out of the binary tag file format

use std::num::ParseIntError;

/// Per address argument lists
pub mod args;
/// Compiler emitted `.dover_metadata` decoding
pub mod dover;
/// Range building drivers
pub mod driver;
/// Instruction streams and decoding
pub mod instruction;
/// The address range to tag set map
pub mod memory_map;
/// Text range files
pub mod range_file;
/// Binary tag files
pub mod tag_file;

pub use memory_map::{Address, MemoryMapError, TagMemoryMap};

/// Parse a hexadecimal address, the `0x` prefix is optional
pub fn parse_address(token: &str) -> Result<Address, ParseIntError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);

    Address::from_str_radix(digits, 16)
}
