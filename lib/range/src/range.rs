use core::ops::Range;

use num::{Integer, ToPrimitive};

use crate::{ContiguousRange, RangeBase, RangeIntersection};

impl<Idx: Integer + Clone> RangeBase<Idx> for Range<Idx> {
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

impl<Idx: Integer + Clone + ToPrimitive> ContiguousRange<Idx> for Range<Idx> {
    #[inline]
    fn from_start_and_length(start: Idx, length: Idx) -> Self {
        start.clone()..(start + length)
    }

    #[inline]
    fn is_adjacent(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && (self.end == other.start || other.end == self.start)
    }

    #[inline]
    fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }

        let start = self.start.to_usize().unwrap();
        let end = self.end.to_usize().unwrap();

        end - start
    }
}

impl<Idx: Integer + Clone> RangeIntersection<Idx, Self> for Range<Idx> {
    type Output = Range<Idx>;

    /// Empty when the two ranges do not overlap
    #[inline]
    fn intersection(&self, rhs: &Self) -> Self::Output {
        let start = core::cmp::max(&self.start, &rhs.start).clone();
        let end = core::cmp::min(&self.end, &rhs.end).clone();

        start..end
    }

    #[inline]
    fn intersects(&self, rhs: &Self) -> bool {
        !self.intersection(rhs).is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::reversed_empty_ranges)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty() {
        let r = 1..5;
        assert!(!RangeBase::is_empty(&r));

        let empty = 5..5;
        assert!(RangeBase::is_empty(&empty));

        let inverted = 5..4;
        assert!(RangeBase::is_empty(&inverted));
    }

    #[test]
    fn from_start_and_length() {
        let r = Range::from_start_and_length(0x100u32, 4);
        assert_eq!(r, 0x100..0x104);

        let r = Range::from_start_and_length(10u32, 0);
        assert!(r.is_empty());
    }

    #[test]
    fn test_len() {
        assert_eq!(ContiguousRange::len(&(0x1000u32..0x1008)), 8);
        assert_eq!(ContiguousRange::len(&(8u32..8)), 0);
        assert_eq!(ContiguousRange::len(&(8u32..4)), 0);
    }

    #[test]
    fn test_adjacent() {
        assert!((0u32..4).is_adjacent(&(4..8)));
        assert!((4u32..8).is_adjacent(&(0..4)));
        assert!(!(0u32..4).is_adjacent(&(5..8)));
        assert!(!(0u32..4).is_adjacent(&(2..8)));
        assert!(!(4u32..4).is_adjacent(&(4..8)));
    }

    #[test]
    fn test_intersection_overlapping() {
        let a = 0u32..8;
        let b = 4..12;
        assert_eq!(a.intersection(&b), 4..8);
        assert!(a.intersects(&b));
    }

    #[test]
    fn test_intersection_touching() {
        let a = 0u32..4;
        let b = 4..8;
        assert!(a.intersection(&b).is_empty());
        assert!(a.disjoint(&b));
    }

    #[test]
    fn test_intersection_contained() {
        let a = 0u32..16;
        let b = 4..8;
        assert_eq!(a.intersection(&b), 4..8);
        assert_eq!(b.intersection(&a), 4..8);
    }

    #[test]
    fn test_intersection_far_apart() {
        let a = 0u32..4;
        let b = 0x100..0x104;
        assert!(a.intersection(&b).is_empty());
        assert!(!a.intersects(&b));
        assert!(b.disjoint(&a));
    }
}
