use std::io::{self, BufRead};

use pipetag_metadata::MetadataFactory;
use thiserror::Error;

use crate::{
    Address, MemoryMapError, TagMemoryMap,
    instruction::{INSTRUCTION_SIZE, InstructionDecoder, InstructionStream, InstructionStreamError},
    range_file::{RangeFileError, RangeFileReader, RangeLineError},
};

/// Mnemonic reported for words the decoder does not recognize
pub const UNKNOWN_MNEMONIC: &str = "unknown";

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Stream(#[from] InstructionStreamError),
    #[error("Could not read input: {0}")]
    Io(#[from] io::Error),
    #[error("Instruction at {address:#010x} runs past the end of the address space")]
    AddressSpaceExhausted { address: Address },
    #[error(transparent)]
    Range(#[from] MemoryMapError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CodeTaggingSummary {
    pub instructions: usize,
    pub tagged: usize,
    /// Instructions left untagged because their group was not found
    pub missing_group: usize,
}

/// Tag every instruction in `stream` with the metadata of its operation group
///
/// The first word lives at `code_address`, each following one 4 bytes later. Instructions whose
/// group the factory does not know are logged and left untagged.
pub fn tag_code(
    map: &mut TagMemoryMap,
    stream: &mut impl InstructionStream,
    decoder: &impl InstructionDecoder,
    factory: &impl MetadataFactory,
    code_address: Address,
) -> Result<CodeTaggingSummary, DriverError> {
    let mut summary = CodeTaggingSummary::default();
    let mut address = code_address;

    while let Some(bits) = stream.read_next_instruction()? {
        let end = address
            .checked_add(INSTRUCTION_SIZE)
            .ok_or(DriverError::AddressSpaceExhausted { address })?;

        let mnemonic = decoder
            .decode(bits)
            .map_or(UNKNOWN_MNEMONIC, |instruction| instruction.mnemonic);

        match factory.lookup_group_metadata(mnemonic) {
            Some(tags) => {
                map.add_range(address, end, &tags)?;
                summary.tagged += 1;
            }
            None => {
                tracing::warn!(
                    "{:#010x}: {:#010x}  {} - no group found for instruction",
                    address,
                    bits,
                    mnemonic
                );
                summary.missing_group += 1;
            }
        }

        summary.instructions += 1;
        address = end;
    }

    tracing::info!(
        "Tagged {} of {} instructions starting at {:#010x}",
        summary.tagged,
        summary.instructions,
        code_address
    );

    Ok(summary)
}

/// Why a range file line was not applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeFailure {
    #[error(transparent)]
    Line(#[from] RangeLineError),
    #[error("Line {line}: could not find tag {tag_name}")]
    UnknownTag { line: usize, tag_name: String },
    #[error("Line {line}: {source}")]
    InvalidRange { line: usize, source: MemoryMapError },
}

#[derive(Debug, Default)]
pub struct RangeTaggingSummary {
    pub applied: usize,
    pub failures: Vec<RangeFailure>,
}

impl RangeTaggingSummary {
    /// Whether every directive made it into the map
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Apply every directive of a range file to `map`
///
/// Bad lines and unknown tag names are collected and logged while the remaining lines still get
/// applied. Only failing to read the input aborts.
pub fn tag_ranges(
    map: &mut TagMemoryMap,
    reader: impl BufRead,
    factory: &impl MetadataFactory,
) -> Result<RangeTaggingSummary, DriverError> {
    let mut summary = RangeTaggingSummary::default();

    for item in RangeFileReader::new(reader) {
        let directive = match item {
            Ok(directive) => directive,
            Err(RangeFileError::Line(error)) => {
                tracing::warn!("{}", error);
                summary.failures.push(error.into());
                continue;
            }
            Err(RangeFileError::Io(error)) => return Err(error.into()),
        };

        let Some(tags) = factory.lookup_metadata(&directive.tag_name) else {
            let failure = RangeFailure::UnknownTag {
                line: directive.line,
                tag_name: directive.tag_name,
            };

            tracing::warn!("{}", failure);
            summary.failures.push(failure);
            continue;
        };

        match map.add_range(directive.start, directive.end, &tags) {
            Ok(()) => summary.applied += 1,
            Err(source) => {
                let failure = RangeFailure::InvalidRange {
                    line: directive.line,
                    source,
                };

                tracing::warn!("{}", failure);
                summary.failures.push(failure);
            }
        }
    }

    tracing::info!(
        "Applied {} ranges, {} lines failed",
        summary.applied,
        summary.failures.len()
    );

    Ok(summary)
}
