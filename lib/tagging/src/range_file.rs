use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::{Address, parse_address};

/// One `<start> <end> <tag name>` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeDirective {
    pub line: usize,
    pub start: Address,
    pub end: Address,
    pub tag_name: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeLineError {
    #[error("Line {line}: bad format, expected 3 items but found {found}")]
    TokenCount { line: usize, found: usize },
    #[error("Line {line}: \"{token}\" is not a hexadecimal address")]
    BadAddress { line: usize, token: String },
    #[error("Line {line}: not valid UTF-8")]
    BadEncoding { line: usize },
}

#[derive(Error, Debug)]
pub enum RangeFileError {
    #[error("Could not access range file: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Line(#[from] RangeLineError),
}

/// Iterates the directives of a range file
///
/// Blank lines and lines starting with `#` are skipped. Each malformed line shows up as its own
/// [RangeFileError::Line] so the caller can decide whether to keep going.
pub struct RangeFileReader<R> {
    reader: R,
    buffer: Vec<u8>,
    line: usize,
}

impl<R: BufRead> RangeFileReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for RangeFileReader<R> {
    type Item = Result<RangeDirective, RangeFileError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();

            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(error) => return Some(Err(error.into())),
            }
            self.line += 1;

            let Ok(text) = std::str::from_utf8(&self.buffer) else {
                return Some(Err(RangeLineError::BadEncoding { line: self.line }.into()));
            };

            let tokens: Vec<&str> = text.split_whitespace().collect();

            if tokens.first().is_none_or(|token| token.starts_with('#')) {
                continue;
            }

            return Some(parse_directive(self.line, &tokens).map_err(RangeFileError::from));
        }
    }
}

fn parse_directive(line: usize, tokens: &[&str]) -> Result<RangeDirective, RangeLineError> {
    let [start, end, tag_name] = tokens else {
        return Err(RangeLineError::TokenCount {
            line,
            found: tokens.len(),
        });
    };

    let address = |token: &str| {
        parse_address(token).map_err(|_| RangeLineError::BadAddress {
            line,
            token: token.to_string(),
        })
    };

    Ok(RangeDirective {
        line,
        start: address(*start)?,
        end: address(*end)?,
        tag_name: tag_name.to_string(),
    })
}

/// Produces range files the range driver understands
pub struct RangeFileWriter<W: Write> {
    writer: W,
}

impl<W: Write> RangeFileWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_range(&mut self, start: Address, end: Address, tag_name: &str) -> io::Result<()> {
        writeln!(self.writer, "{start:#010x} {end:#010x} {tag_name}")
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.writer.flush()?;

        Ok(self.writer)
    }
}
