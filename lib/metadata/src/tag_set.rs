use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
};

use bitvec::{array::BitArray, order::Lsb0};
use nohash::IsEnabled;
use thiserror::Error;

/// Identifier of a single tag, as emitted by the policy tool
pub type TagId = u32;

/// Number of 32 bit words backing the default [TagSet]
pub const TAG_SET_WORDS: usize = 4;

const WORD_BITS: usize = u32::BITS as usize;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSetError {
    #[error("Tag {tag} does not fit in a tag set holding {capacity} tags")]
    OutOfRange { tag: TagId, capacity: usize },
}

/// Set of tags attached to an address or address range
///
/// One bit per possible tag. When the bitfield fits inside a [usize] it doubles as the hash,
/// otherwise the sum of the indexes of the set bits is maintained as the set grows and used
/// instead. Either way equal sets hash equally.
#[derive(Clone, Copy)]
pub struct TagSet<const WORDS: usize = TAG_SET_WORDS> {
    bits: BitArray<[u32; WORDS], Lsb0>,
    index_sum: usize,
}

impl<const WORDS: usize> TagSet<WORDS> {
    /// How many distinct tags this set can hold
    pub const CAPACITY: usize = WORDS * WORD_BITS;

    /// Whether the bitfield is small enough to serve as its own hash
    pub const DIRECT_HASH: bool = WORDS * size_of::<u32>() <= size_of::<usize>();

    pub fn new() -> Self {
        Self {
            bits: BitArray::new([0; WORDS]),
            index_sum: 0,
        }
    }

    pub fn from_tags(tags: impl IntoIterator<Item = TagId>) -> Result<Self, TagSetError> {
        let mut set = Self::new();

        for tag in tags {
            set.insert(tag)?;
        }

        Ok(set)
    }

    /// Add a single tag, inserting a tag twice is harmless
    pub fn insert(&mut self, tag: TagId) -> Result<(), TagSetError> {
        let index = tag as usize;

        if index >= Self::CAPACITY {
            return Err(TagSetError::OutOfRange {
                tag,
                capacity: Self::CAPACITY,
            });
        }

        if !self.bits[index] {
            self.bits.set(index, true);
            self.index_sum = self.index_sum.wrapping_add(index);
        }

        Ok(())
    }

    /// Merge every tag of `other` into this set
    pub fn insert_all(&mut self, other: &Self) {
        let words = self.bits.as_raw_mut_slice();

        for (word_index, (word, incoming)) in words
            .iter_mut()
            .zip(other.bits.as_raw_slice())
            .enumerate()
        {
            let mut added = incoming & !*word;
            *word |= incoming;

            while added != 0 {
                let bit = added.trailing_zeros() as usize;
                self.index_sum = self.index_sum.wrapping_add(word_index * WORD_BITS + bit);
                added &= added - 1;
            }
        }
    }

    pub fn union(mut self, other: &Self) -> Self {
        self.insert_all(other);
        self
    }

    pub fn contains(&self, tag: TagId) -> bool {
        self.bits.get(tag as usize).is_some_and(|bit| *bit)
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    /// Tags in ascending order
    pub fn tags(&self) -> impl Iterator<Item = TagId> + '_ {
        self.bits.iter_ones().map(|index| index as TagId)
    }

    pub fn to_vec(&self) -> Vec<TagId> {
        self.tags().collect()
    }

    pub fn hash_value(&self) -> usize {
        if Self::DIRECT_HASH {
            self.bits
                .as_raw_slice()
                .iter()
                .enumerate()
                .fold(0, |hash, (index, word)| {
                    hash | ((*word as usize) << (index * WORD_BITS))
                })
        } else {
            self.index_sum
        }
    }
}

impl<const WORDS: usize> Default for TagSet<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> PartialEq for TagSet<WORDS> {
    fn eq(&self, other: &Self) -> bool {
        self.bits.as_raw_slice() == other.bits.as_raw_slice()
    }
}

impl<const WORDS: usize> Eq for TagSet<WORDS> {}

impl<const WORDS: usize> Hash for TagSet<WORDS> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.hash_value());
    }
}

impl<const WORDS: usize> IsEnabled for TagSet<WORDS> {}

impl<const WORDS: usize> Debug for TagSet<WORDS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.tags()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::hash::BuildHasher;

    use nohash::BuildNoHashHasher;

    use super::*;

    fn hash_of<const WORDS: usize>(value: &TagSet<WORDS>) -> u64 {
        BuildNoHashHasher::<TagSet<WORDS>>::default().hash_one(value)
    }

    #[test]
    fn empty() {
        let set = TagSet::<4>::new();

        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert_eq!(set.hash_value(), 0);
        assert_eq!(set, TagSet::default());
    }

    #[test]
    fn insert_is_idempotent() {
        let mut set = TagSet::<4>::new();
        set.insert(7).unwrap();
        let once = set;
        set.insert(7).unwrap();

        assert_eq!(set, once);
        assert_eq!(set.hash_value(), once.hash_value());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn out_of_range_tag_is_rejected() {
        let mut set = TagSet::<1>::new();

        assert_eq!(
            set.insert(32),
            Err(TagSetError::OutOfRange {
                tag: 32,
                capacity: 32
            })
        );
        assert!(set.insert(31).is_ok());
        assert!(TagSet::<4>::from_tags([0, 127, 128]).is_err());
        assert!(!set.contains(1000));
    }

    #[test]
    fn tags_are_ascending() {
        let set = TagSet::<4>::from_tags([100, 3, 64, 31, 32]).unwrap();

        assert_eq!(set.to_vec(), vec![3, 31, 32, 64, 100]);
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn union_idempotent() {
        let a = TagSet::<4>::from_tags([1, 40, 90]).unwrap();

        assert_eq!(a.union(&a), a);
        assert_eq!(a.union(&a).hash_value(), a.hash_value());
    }

    #[test]
    fn union_commutative_and_associative() {
        let a = TagSet::<4>::from_tags([1, 2]).unwrap();
        let b = TagSet::<4>::from_tags([2, 70]).unwrap();
        let c = TagSet::<4>::from_tags([127]).unwrap();

        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.union(&b).union(&c), a.union(&b.union(&c)));
        assert_eq!(a.union(&b).to_vec(), vec![1, 2, 70]);
    }

    #[test]
    fn direct_hash_is_the_bitfield() {
        assert!(TagSet::<1>::DIRECT_HASH);

        let set = TagSet::<1>::from_tags([0, 3]).unwrap();
        assert_eq!(set.hash_value(), 0b1001);
    }

    #[test]
    fn compressed_hash_is_index_sum() {
        assert!(!TagSet::<4>::DIRECT_HASH);

        let set = TagSet::<4>::from_tags([1, 64, 100]).unwrap();
        assert_eq!(set.hash_value(), 165);
    }

    #[test]
    fn equal_sets_hash_equal_direct() {
        let mut built = TagSet::<1>::new();
        built.insert(5).unwrap();
        built.insert_all(&TagSet::from_tags([9, 5]).unwrap());

        let direct = TagSet::<1>::from_tags([9, 5]).unwrap();

        assert_eq!(built, direct);
        assert_eq!(built.hash_value(), direct.hash_value());
        assert_eq!(hash_of(&built), hash_of(&direct));
    }

    #[test]
    fn equal_sets_hash_equal_compressed() {
        let left = TagSet::<8>::from_tags([200, 4])
            .unwrap()
            .union(&TagSet::from_tags([4, 33]).unwrap());

        let mut right = TagSet::<8>::from_tags([33]).unwrap();
        right.insert_all(&TagSet::from_tags([4]).unwrap());
        right.insert(200).unwrap();
        right.insert(33).unwrap();

        assert_eq!(left, right);
        assert_eq!(left.hash_value(), right.hash_value());
        assert_eq!(hash_of(&left), hash_of(&right));
    }
}
