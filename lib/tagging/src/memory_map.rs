use std::{ops::Range, sync::Arc};

use pipetag_metadata::{MetadataCache, TagSet};
use pipetag_range::RangeIntersection;
use rangemap::RangeMap;
use thiserror::Error;

pub type Address = u32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryMapError {
    #[error("Range {start:#010x}..{end:#010x} ends before it starts")]
    InvertedRange { start: Address, end: Address },
}

/// Maps disjoint address ranges to the tags they carry
///
/// Ranges are kept sorted and neighbours holding equal tag sets are coalesced, so iteration
/// yields the smallest possible number of entries in ascending order.
#[derive(Debug)]
pub struct TagMemoryMap {
    base_address: Address,
    cache: Arc<MetadataCache>,
    ranges: RangeMap<Address, Arc<TagSet>>,
}

impl TagMemoryMap {
    pub fn new(base_address: Address, cache: Arc<MetadataCache>) -> Self {
        Self {
            base_address,
            cache,
            ranges: RangeMap::new(),
        }
    }

    pub fn base_address(&self) -> Address {
        self.base_address
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Add `tags` to every address in `start..end`
    ///
    /// Tags accumulate: addresses that already carry tags end up with the union of old and new.
    /// An empty range does nothing, an inverted one is refused.
    pub fn add_range(
        &mut self,
        start: Address,
        end: Address,
        tags: &TagSet,
    ) -> Result<(), MemoryMapError> {
        if end < start {
            return Err(MemoryMapError::InvertedRange { start, end });
        }

        if start == end {
            return Ok(());
        }

        let range = start..end;

        let mut updates: Vec<(Range<Address>, Arc<TagSet>)> = self
            .ranges
            .overlapping(&range)
            .map(|(existing_range, existing_tags)| {
                let overlap = existing_range.intersection(&range);
                let merged = self.cache.canonize(existing_tags.union(tags));

                (overlap, merged)
            })
            .collect();

        let fresh = self.cache.canonize(*tags);
        updates.extend(self.ranges.gaps(&range).map(|gap| (gap, fresh.clone())));

        for (range, tags) in updates {
            // The map splits whatever sticks out of the overlap and merges equal neighbours
            self.ranges.insert(range, tags);
        }

        Ok(())
    }

    /// Tags covering `address`, [None] when nothing was ever tagged there
    pub fn get(&self, address: Address) -> Option<&Arc<TagSet>> {
        self.ranges.get(&address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Range<Address>, &Arc<TagSet>)> {
        self.ranges.iter()
    }

    /// Number of distinct ranges
    pub fn len(&self) -> usize {
        self.ranges.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
