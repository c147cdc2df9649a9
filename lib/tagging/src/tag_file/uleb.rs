use std::io::{self, Read, Write};

use thiserror::Error;

/// Longest encoding a [u32] can have
pub const MAX_ULEB_LENGTH: usize = 5;

const PAYLOAD_MASK: u8 = 0x7f;
const CONTINUATION: u8 = 0x80;

#[derive(Error, Debug)]
pub enum UlebError {
    #[error("Stream ended inside an integer")]
    Truncated,
    #[error("Integer does not fit in 32 bits")]
    Overflow,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Encode `value` into `buffer`, returning how many bytes were used
pub fn encode_uleb(mut value: u32, buffer: &mut [u8; MAX_ULEB_LENGTH]) -> usize {
    let mut length = 0;

    loop {
        let byte = (value as u8) & PAYLOAD_MASK;
        value >>= 7;

        if value == 0 {
            buffer[length] = byte;
            return length + 1;
        }

        buffer[length] = byte | CONTINUATION;
        length += 1;
    }
}

pub fn write_uleb(writer: &mut impl Write, value: u32) -> io::Result<()> {
    let mut buffer = [0; MAX_ULEB_LENGTH];
    let length = encode_uleb(value, &mut buffer);

    writer.write_all(&buffer[..length])
}

pub fn read_uleb(reader: &mut impl Read) -> Result<u32, UlebError> {
    let mut value: u32 = 0;

    for index in 0..MAX_ULEB_LENGTH {
        let mut byte = [0];

        if let Err(error) = reader.read_exact(&mut byte) {
            return Err(match error.kind() {
                io::ErrorKind::UnexpectedEof => UlebError::Truncated,
                _ => UlebError::Io(error),
            });
        }

        let byte = byte[0];
        let shift = index * 7;
        let payload = u32::from(byte & PAYLOAD_MASK);

        // Only the low 4 bits of the fifth group still land inside 32 bits
        if payload.checked_shl(shift as u32).map(|shifted| shifted >> shift) != Some(payload) {
            return Err(UlebError::Overflow);
        }

        value |= payload << shift;

        if byte & CONTINUATION == 0 {
            return Ok(value);
        }
    }

    Err(UlebError::Overflow)
}
