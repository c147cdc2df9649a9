//! Pipetag Range
//!
//! Small helper traits over half open address ranges

#![no_std]

mod range;

pub trait RangeBase<Idx> {
    /// True when the range covers no index at all, inverted ranges included
    fn is_empty(&self) -> bool;
}

/// Ranges that cover every index between their bounds
pub trait ContiguousRange<Idx>: RangeBase<Idx> {
    fn from_start_and_length(start: Idx, length: Idx) -> Self;

    /// Whether the two ranges touch without sharing an index
    fn is_adjacent(&self, other: &Self) -> bool;

    fn len(&self) -> usize;
}

pub trait RangeIntersection<Idx, Rhs: RangeBase<Idx> = Self>: RangeBase<Idx> {
    type Output: RangeBase<Idx>;

    fn intersects(&self, rhs: &Rhs) -> bool;

    /// The shared part, empty if there is none
    fn intersection(&self, rhs: &Rhs) -> Self::Output;

    fn disjoint(&self, rhs: &Rhs) -> bool {
        !self.intersects(rhs)
    }
}
