//! Reader for the `.dover_metadata` section emitted by the policy aware compiler
//!
//! The section is a byte stream of op codes each followed by fixed width little endian operands.
//! Addresses are offsets from the most recent base address.

use std::{io, ops::Range};

use pipetag_range::ContiguousRange;
use rangemap::RangeSet;
use strum::{Display, EnumString, FromRepr};
use thiserror::Error;

use crate::{Address, range_file::RangeFileWriter};

/// Width of a target pointer in the metadata stream
const POINTER_SIZE: u64 = 4;

/// Name of the section the compiler places the metadata in
pub const DOVER_METADATA_SECTION_NAME: &str = ".dover_metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum MetadataOp {
    SetBaseAddress = 0x01,
    TagAddress = 0x02,
    TagAddressRange = 0x03,
    TagPolicySymbol = 0x04,
    TagPolicyRange = 0x05,
    TagPolicySymbolRanked = 0x06,
    TagPolicyRangeRanked = 0x07,
    EndBlock = 0x08,
    EndBlockWeakDeclHack = 0x09,
    FunctionRange = 0x0a,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum TagSpecifier {
    Cfi3lValidTarget = 0x01,
    StackPrologueAuthority = 0x02,
    StackEpilogueAuthority = 0x03,
    FunctionPointerStoreAuthority = 0x04,
    BranchValidTarget = 0x05,
    ReturnValidTarget = 0x06,
    ReturnInstruction = 0x07,
    CallInstruction = 0x08,
    BranchInstruction = 0x09,
    FunctionPointerCreateAuthority = 0x0a,
}

/// Policies the compiler knows how to emit metadata for
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum DoverPolicy {
    #[strum(serialize = "threeClass")]
    ThreeClass,
    #[strum(serialize = "cpi")]
    Cpi,
    #[strum(serialize = "cfi")]
    Cfi,
    #[strum(serialize = "stack")]
    Stack,
}

impl DoverPolicy {
    /// Policy tag a specifier turns into, [None] when this policy ignores it
    pub fn tag_name(self, specifier: TagSpecifier) -> Option<&'static str> {
        use TagSpecifier::*;

        Some(match (self, specifier) {
            (Self::ThreeClass | Self::Cfi, Cfi3lValidTarget) => "llvm.CFI_Call-Tgt",
            (Self::ThreeClass | Self::Cfi, BranchValidTarget) => "llvm.CFI_Branch-Tgt",
            (Self::ThreeClass | Self::Cfi, ReturnValidTarget) => "llvm.CFI_Return-Tgt",
            (Self::ThreeClass, CallInstruction) => "llvm.CFI_Call-Instr",
            (Self::ThreeClass, BranchInstruction) => "llvm.CFI_Branch-Instr",
            (Self::ThreeClass | Self::Cpi, ReturnInstruction) => "llvm.CFI_Return-Instr",
            (Self::Cpi, FunctionPointerCreateAuthority) => "llvm.CPI.FPtrCreate",
            (Self::Cpi, FunctionPointerStoreAuthority) => "llvm.CPI.FPtrStore",
            (Self::Stack, StackPrologueAuthority) => "dover.Tools.GCC.Prologue",
            (Self::Stack, StackEpilogueAuthority) => "dover.Tools.GCC.Epilogue",
            _ => return None,
        })
    }

    /// Whether block and function extents are worth collecting
    pub fn tracks_compiler_generated(self) -> bool {
        matches!(self, Self::ThreeClass | Self::Cfi)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DoverError {
    #[error("Metadata section is empty")]
    Empty,
    #[error("Metadata must start with a base address, found op {found:#04x}")]
    MissingBaseAddress { found: u8 },
    #[error("Unknown op {op:#04x} at offset {offset:#x}")]
    UnknownOp { offset: usize, op: u8 },
    #[error("Op {op} at offset {offset:#x} is not supported")]
    UnsupportedOp { offset: usize, op: MetadataOp },
    #[error("Metadata ends inside the operands of {op} at offset {offset:#x}")]
    Truncated { offset: usize, op: MetadataOp },
    #[error("Range {start:#x}..{end:#x} from offset {offset:#x} does not fit the address space")]
    AddressOverflow { offset: usize, start: u64, end: u64 },
}

/// A range and the policy tag it should carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRange {
    pub range: Range<Address>,
    pub tag_name: &'static str,
}

/// Everything pulled out of one metadata section
#[derive(Debug, Default)]
pub struct DoverRanges {
    /// In section order
    pub tagged: Vec<TaggedRange>,
    /// Extents of code the compiler emitted, only collected for control flow policies
    pub compiler_generated: RangeSet<Address>,
}

impl DoverRanges {
    /// Emit the tagged ranges, and the compiler generated ones under `compiler_generated_tag`
    pub fn write<W: io::Write>(
        &self,
        writer: &mut RangeFileWriter<W>,
        compiler_generated_tag: Option<&str>,
    ) -> io::Result<()> {
        for tagged in &self.tagged {
            writer.write_range(tagged.range.start, tagged.range.end, tagged.tag_name)?;
        }

        if let Some(tag_name) = compiler_generated_tag {
            for range in self.compiler_generated.iter() {
                writer.write_range(range.start, range.end, tag_name)?;
            }
        }

        Ok(())
    }
}

struct OperandReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl OperandReader<'_> {
    fn read(&mut self, size: usize, offset: usize, op: MetadataOp) -> Result<u64, DoverError> {
        let bytes = self
            .data
            .get(self.position..self.position + size)
            .ok_or(DoverError::Truncated { offset, op })?;
        self.position += size;

        let mut buffer = [0; 8];
        buffer[..size].copy_from_slice(bytes);

        Ok(u64::from_le_bytes(buffer))
    }

    fn pointer(&mut self, offset: usize, op: MetadataOp) -> Result<u64, DoverError> {
        self.read(POINTER_SIZE as usize, offset, op)
    }

    fn specifier(&mut self, offset: usize, op: MetadataOp) -> Result<u8, DoverError> {
        Ok(self.read(1, offset, op)? as u8)
    }
}

fn address_range(range: Range<u64>, offset: usize) -> Result<Range<Address>, DoverError> {
    let overflow = || DoverError::AddressOverflow {
        offset,
        start: range.start,
        end: range.end,
    };

    let start = Address::try_from(range.start).map_err(|_| overflow())?;
    let end = Address::try_from(range.end).map_err(|_| overflow())?;

    Ok(start..end)
}

/// Decode a raw metadata section for `policy`
pub fn parse_dover_metadata(data: &[u8], policy: DoverPolicy) -> Result<DoverRanges, DoverError> {
    match data.first() {
        None => return Err(DoverError::Empty),
        Some(&op) if op != MetadataOp::SetBaseAddress as u8 => {
            return Err(DoverError::MissingBaseAddress { found: op });
        }
        Some(_) => {}
    }

    let mut reader = OperandReader { data, position: 0 };
    let mut ranges = DoverRanges::default();
    let mut base_address = 0u64;

    let tag = |ranges: &mut DoverRanges, range: Range<Address>, specifier: u8| {
        match TagSpecifier::from_repr(specifier).and_then(|specifier| policy.tag_name(specifier)) {
            Some(tag_name) => ranges.tagged.push(TaggedRange { range, tag_name }),
            None => tracing::trace!("Specifier {:#04x} is not used by {}", specifier, policy),
        }
    };

    let compiler_generated = |ranges: &mut DoverRanges, range: Range<Address>| {
        if policy.tracks_compiler_generated() && !range.is_empty() {
            ranges.compiler_generated.insert(range);
        }
    };

    while let Some(&byte) = data.get(reader.position) {
        let offset = reader.position;
        reader.position += 1;

        let op = MetadataOp::from_repr(byte).ok_or(DoverError::UnknownOp { offset, op: byte })?;

        match op {
            MetadataOp::SetBaseAddress => {
                // The compiler always emits a 64 bit base, even for 32 bit targets
                base_address = reader.read(8, offset, op)?;
                tracing::debug!("New base address {:#x}", base_address);
            }
            MetadataOp::TagAddress => {
                let address = base_address.saturating_add(reader.pointer(offset, op)?);
                let specifier = reader.specifier(offset, op)?;

                if address.checked_add(POINTER_SIZE).is_none() {
                    return Err(DoverError::AddressOverflow {
                        offset,
                        start: address,
                        end: u64::MAX,
                    });
                }

                let range = address_range(
                    Range::from_start_and_length(address, POINTER_SIZE),
                    offset,
                )?;
                tag(&mut ranges, range, specifier);
            }
            MetadataOp::TagAddressRange => {
                let start = base_address.saturating_add(reader.pointer(offset, op)?);
                let end = base_address.saturating_add(reader.pointer(offset, op)?);
                let specifier = reader.specifier(offset, op)?;

                let range = address_range(start..end, offset)?;
                tag(&mut ranges, range, specifier);
            }
            MetadataOp::EndBlock => {
                let end = base_address.saturating_add(reader.pointer(offset, op)?);

                let range = address_range(base_address..end, offset)?;
                compiler_generated(&mut ranges, range);
            }
            MetadataOp::FunctionRange => {
                let start = base_address.saturating_add(reader.pointer(offset, op)?);
                // The end operand names the last instruction rather than one past it
                let end = base_address
                    .saturating_add(reader.pointer(offset, op)?)
                    .saturating_add(POINTER_SIZE);

                let range = address_range(start..end, offset)?;
                compiler_generated(&mut ranges, range);
            }
            MetadataOp::TagPolicySymbol
            | MetadataOp::TagPolicyRange
            | MetadataOp::TagPolicySymbolRanked
            | MetadataOp::TagPolicyRangeRanked
            | MetadataOp::EndBlockWeakDeclHack => {
                return Err(DoverError::UnsupportedOp { offset, op });
            }
        }
    }

    tracing::debug!(
        "Found {} tagged ranges and {} compiler generated ranges",
        ranges.tagged.len(),
        ranges.compiler_generated.iter().count()
    );

    Ok(ranges)
}
