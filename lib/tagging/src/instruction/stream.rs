use std::io::{self, Read};

use thiserror::Error;

use super::{INSTRUCTION_SIZE, InstructionBits};

#[derive(Error, Debug)]
pub enum InstructionStreamError {
    #[error("Instruction stream ended {read} bytes into the word at offset {offset:#x}")]
    Truncated { offset: u64, read: usize },
    #[error("Could not read instruction stream: {0}")]
    Io(#[from] io::Error),
}

/// Source of instruction words
pub trait InstructionStream {
    /// Next word, [None] once the stream is cleanly exhausted
    fn read_next_instruction(&mut self) -> Result<Option<InstructionBits>, InstructionStreamError>;
}

/// Little endian instruction words out of any [Read]
#[derive(Debug)]
pub struct ReaderInstructionStream<R: Read> {
    reader: R,
    offset: u64,
}

impl<R: Read> ReaderInstructionStream<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<R: Read> InstructionStream for ReaderInstructionStream<R> {
    fn read_next_instruction(&mut self) -> Result<Option<InstructionBits>, InstructionStreamError> {
        let mut buffer = [0; INSTRUCTION_SIZE as usize];
        let mut read = 0;

        // Pipes hand out short reads, keep going until the word is full
        while read < buffer.len() {
            match self.reader.read(&mut buffer[read..]) {
                Ok(0) => break,
                Ok(amount) => read += amount,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error.into()),
            }
        }

        match read {
            0 => Ok(None),
            read if read < buffer.len() => Err(InstructionStreamError::Truncated {
                offset: self.offset,
                read,
            }),
            _ => {
                self.offset += buffer.len() as u64;
                Ok(Some(InstructionBits::from_le_bytes(buffer)))
            }
        }
    }
}
