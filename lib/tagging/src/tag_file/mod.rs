//! The binary tag file
//!
//! A tag file is nothing but a sequence of records, one per range, until the end of the stream:
//!
//! ```text
//! start      uleb128
//! end        uleb128
//! tag count  uleb128
//! tag ids    uleb128 * tag count
//! ```
//!
//! Records come out in the order the map iterates, and since decoding goes back through
//! [TagMemoryMap::add_range] several tag files may simply be concatenated.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read, Write},
    ops::Range,
    path::Path,
};

use pipetag_metadata::{TagSet, TagSetError};
use strum::Display;
use thiserror::Error;

use crate::{Address, MemoryMapError, TagMemoryMap};

mod uleb;

pub use uleb::{MAX_ULEB_LENGTH, UlebError, encode_uleb, read_uleb, write_uleb};

/// Fields of a record, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RecordField {
    Start,
    End,
    TagCount,
    Tag,
}

#[derive(Error, Debug)]
pub enum TagFileError {
    #[error("Could not access tag file: {0}")]
    Io(#[from] io::Error),
    #[error("Tag file ends inside the {field} of the record at offset {record_offset:#x}")]
    Truncated {
        record_offset: u64,
        field: RecordField,
    },
    #[error("The {field} of the record at offset {record_offset:#x} does not fit in 32 bits")]
    Overflow {
        record_offset: u64,
        field: RecordField,
    },
    #[error("Record at offset {record_offset:#x} has an unusable range: {source}")]
    InvalidRange {
        record_offset: u64,
        source: MemoryMapError,
    },
    #[error("Record at offset {record_offset:#x} has an unusable tag: {source}")]
    InvalidTag {
        record_offset: u64,
        source: TagSetError,
    },
}

/// A single decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    /// Where in the stream this record started
    pub offset: u64,
    pub range: Range<Address>,
    pub tags: TagSet,
}

/// Keeps track of how far into the stream we are for diagnostics
struct PositionReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> Read for PositionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let amount = self.inner.read(buf)?;
        self.position += amount as u64;

        Ok(amount)
    }
}

impl<R: BufRead> BufRead for PositionReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amount: usize) {
        self.inner.consume(amount);
        self.position += amount as u64;
    }
}

impl<R: BufRead> PositionReader<R> {
    fn at_end(&mut self) -> io::Result<bool> {
        Ok(self.fill_buf()?.is_empty())
    }

    fn field(&mut self, record_offset: u64, field: RecordField) -> Result<u32, TagFileError> {
        read_uleb(self).map_err(|error| match error {
            UlebError::Truncated => TagFileError::Truncated {
                record_offset,
                field,
            },
            UlebError::Overflow => TagFileError::Overflow {
                record_offset,
                field,
            },
            UlebError::Io(error) => TagFileError::Io(error),
        })
    }
}

/// Decode every record of a tag stream
///
/// Fails as a whole if any record is damaged
pub fn read_records(reader: impl BufRead) -> Result<Vec<TagRecord>, TagFileError> {
    let mut reader = PositionReader {
        inner: reader,
        position: 0,
    };
    let mut records = Vec::new();

    while !reader.at_end()? {
        let offset = reader.position;

        let start = reader.field(offset, RecordField::Start)?;
        let end = reader.field(offset, RecordField::End)?;
        let tag_count = reader.field(offset, RecordField::TagCount)?;

        if end < start {
            return Err(TagFileError::InvalidRange {
                record_offset: offset,
                source: MemoryMapError::InvertedRange { start, end },
            });
        }

        let mut tags = TagSet::new();

        for _ in 0..tag_count {
            let tag = reader.field(offset, RecordField::Tag)?;

            tags.insert(tag)
                .map_err(|source| TagFileError::InvalidTag {
                    record_offset: offset,
                    source,
                })?;
        }

        records.push(TagRecord {
            offset,
            range: start..end,
            tags,
        });
    }

    Ok(records)
}

/// Decode a tag stream into `map`, returning the number of records
///
/// Nothing is added to `map` unless the entire stream decodes
pub fn read_tags(map: &mut TagMemoryMap, reader: impl BufRead) -> Result<usize, TagFileError> {
    let records = read_records(reader)?;

    for record in &records {
        map.add_range(record.range.start, record.range.end, &record.tags)
            .map_err(|source| TagFileError::InvalidRange {
                record_offset: record.offset,
                source,
            })?;
    }

    Ok(records.len())
}

pub fn load_tags(map: &mut TagMemoryMap, path: impl AsRef<Path>) -> Result<usize, TagFileError> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path)?);

    let count = read_tags(map, file)?;
    tracing::debug!("Read {} records from \"{}\"", count, path.display());

    Ok(count)
}

pub fn write_tags(map: &TagMemoryMap, mut writer: impl Write) -> Result<(), TagFileError> {
    for (range, tags) in map.iter() {
        write_uleb(&mut writer, range.start)?;
        write_uleb(&mut writer, range.end)?;
        write_uleb(&mut writer, tags.len() as u32)?;

        for tag in tags.tags() {
            write_uleb(&mut writer, tag)?;
        }
    }

    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pipetag_metadata::MetadataCache;

    use super::*;

    fn tags(ids: &[u32]) -> TagSet {
        TagSet::from_tags(ids.iter().copied()).unwrap()
    }

    fn empty_map() -> TagMemoryMap {
        TagMemoryMap::new(0, Arc::new(MetadataCache::new()))
    }

    fn encode(map: &TagMemoryMap) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_tags(map, &mut bytes).unwrap();
        bytes
    }

    fn contents(map: &TagMemoryMap) -> Vec<(Range<Address>, Vec<u32>)> {
        map.iter()
            .map(|(range, tags)| (range.clone(), tags.to_vec()))
            .collect()
    }

    #[test]
    fn exact_encoding() {
        let mut map = empty_map();
        map.add_range(0x100, 0x104, &tags(&[0])).unwrap();

        assert_eq!(encode(&map), [0x80, 0x02, 0x84, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn round_trip() {
        let mut map = empty_map();
        map.add_range(0, 8, &tags(&[1])).unwrap();
        map.add_range(4, 12, &tags(&[2, 100])).unwrap();
        map.add_range(0x8000_0000, 0x8000_1000, &tags(&[127])).unwrap();
        map.add_range(0x9000_0000, 0x9000_0004, &TagSet::new()).unwrap();

        let mut decoded = empty_map();
        let count = read_tags(&mut decoded, encode(&map).as_slice()).unwrap();

        assert_eq!(count, map.len());
        assert_eq!(contents(&decoded), contents(&map));
    }

    #[test]
    fn empty_stream() {
        let mut map = empty_map();

        assert_eq!(read_tags(&mut map, [0u8; 0].as_slice()).unwrap(), 0);
        assert!(map.is_empty());
        assert!(encode(&map).is_empty());
    }

    #[test]
    fn ecall_scenario() {
        let mut map = empty_map();
        map.add_range(0x100, 0x104, &tags(&[0])).unwrap();

        let mut decoded = empty_map();
        read_tags(&mut decoded, encode(&map).as_slice()).unwrap();

        assert_eq!(decoded.get(0x102).unwrap().to_vec(), vec![0]);
        assert!(decoded.get(0x200).is_none());
    }

    #[test]
    fn truncated_after_start_leaves_map_untouched() {
        let mut map = empty_map();
        map.add_range(0x10, 0x20, &tags(&[1])).unwrap();
        map.add_range(0x100, 0x104, &tags(&[2])).unwrap();

        let bytes = encode(&map);
        // First record is 4 bytes, then only the start of the second one
        let truncated = &bytes[..6];

        let mut decoded = empty_map();
        let error = read_tags(&mut decoded, truncated).unwrap_err();

        assert!(matches!(
            error,
            TagFileError::Truncated {
                record_offset: 4,
                field: RecordField::End
            }
        ));
        assert!(decoded.is_empty());
    }

    #[test]
    fn truncated_inside_tags() {
        let mut map = empty_map();
        map.add_range(0, 4, &tags(&[1, 2])).unwrap();

        let bytes = encode(&map);

        let mut decoded = empty_map();
        let error = read_tags(&mut decoded, &bytes[..bytes.len() - 1]).unwrap_err();

        assert!(matches!(
            error,
            TagFileError::Truncated {
                record_offset: 0,
                field: RecordField::Tag
            }
        ));
    }

    #[test]
    fn overflowing_field() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0x7f, 0x04, 0x00];

        let error = read_records(bytes.as_slice()).unwrap_err();

        assert!(matches!(
            error,
            TagFileError::Overflow {
                record_offset: 0,
                field: RecordField::Start
            }
        ));
    }

    #[test]
    fn inverted_record() {
        let bytes = [0x08, 0x04, 0x00];

        assert!(matches!(
            read_records(bytes.as_slice()),
            Err(TagFileError::InvalidRange {
                record_offset: 0,
                ..
            })
        ));
    }

    #[test]
    fn oversized_tag() {
        // One tag with id 0x4000
        let bytes = [0x00, 0x04, 0x01, 0x80, 0x80, 0x01];

        assert!(matches!(
            read_records(bytes.as_slice()),
            Err(TagFileError::InvalidTag { .. })
        ));
    }

    #[test]
    fn concatenated_files_merge() {
        let mut first = empty_map();
        first.add_range(0, 8, &tags(&[1])).unwrap();

        let mut second = empty_map();
        second.add_range(4, 12, &tags(&[2])).unwrap();

        let mut bytes = encode(&first);
        bytes.extend(encode(&second));

        let mut merged = empty_map();
        assert_eq!(read_tags(&mut merged, bytes.as_slice()).unwrap(), 2);

        let mut direct = empty_map();
        direct.add_range(0, 8, &tags(&[1])).unwrap();
        direct.add_range(4, 12, &tags(&[2])).unwrap();

        assert_eq!(contents(&merged), contents(&direct));
    }

    #[test]
    fn write_and_load() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("application.taginfo");

        let mut map = empty_map();
        map.add_range(0x8000_0000, 0x8000_0010, &tags(&[3, 4])).unwrap();
        write_tags(&map, File::create(&path).unwrap()).unwrap();

        let mut loaded = empty_map();
        assert_eq!(load_tags(&mut loaded, &path).unwrap(), 1);
        assert_eq!(contents(&loaded), contents(&map));

        assert!(matches!(
            load_tags(&mut loaded, directory.path().join("missing.taginfo")),
            Err(TagFileError::Io(_))
        ));
    }
}
