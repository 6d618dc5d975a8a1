/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! A dense, growable bit vector.
//!
//! Used both for the per-class register free lists and for the
//! per-block liveness sets, which are indexed by instruction number
//! and therefore always dense.

use alloc::vec;
use alloc::vec::Vec;

type Frame = u64;
const BITS_PER_FRAME: usize = core::mem::size_of::<Frame>() * 8;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct BitVec {
    bits: Vec<Frame>,
    len: usize,
}

impl BitVec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a vector of `len` bits, all set to `val`.
    pub fn with_len(len: usize, val: bool) -> Self {
        let mut bv = Self::new();
        bv.resize(len, val);
        bv
    }

    #[inline(always)]
    fn compute_index(el: usize) -> (usize, usize) {
        (el / BITS_PER_FRAME, el % BITS_PER_FRAME)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grow or shrink to `new_len` bits. Newly created bits take the
    /// value `val`.
    pub fn resize(&mut self, new_len: usize, val: bool) {
        let old_len = self.len;
        let frames = (new_len + BITS_PER_FRAME - 1) / BITS_PER_FRAME;
        self.bits.resize(frames, 0);
        self.len = new_len;
        if new_len > old_len && val {
            self.set_range(old_len, new_len);
        }
        self.clear_unused_bits();
    }

    /// Keep the bits past `len` in the last frame zeroed so that
    /// whole-frame operations never observe them.
    fn clear_unused_bits(&mut self) {
        let (frame, bit) = Self::compute_index(self.len);
        if bit != 0 {
            self.bits[frame] &= (1 << bit) - 1;
        }
    }

    #[inline(always)]
    pub fn set(&mut self, el: usize) {
        debug_assert!(el < self.len);
        let (frame, bit) = Self::compute_index(el);
        self.bits[frame] |= 1 << bit;
    }

    #[inline(always)]
    pub fn reset(&mut self, el: usize) {
        debug_assert!(el < self.len);
        let (frame, bit) = Self::compute_index(el);
        self.bits[frame] &= !(1 << bit);
    }

    #[inline(always)]
    pub fn test(&self, el: usize) -> bool {
        debug_assert!(el < self.len);
        let (frame, bit) = Self::compute_index(el);
        self.bits[frame] & (1 << bit) != 0
    }

    /// Set every bit in `[from, to)`.
    pub fn set_range(&mut self, from: usize, to: usize) {
        debug_assert!(from <= to && to <= self.len);
        for el in from..to {
            self.set(el);
        }
    }

    /// Clear every bit in `[from, to)`.
    pub fn reset_range(&mut self, from: usize, to: usize) {
        debug_assert!(from <= to && to <= self.len);
        for el in from..to {
            self.reset(el);
        }
    }

    /// Index of the lowest set bit, if any.
    pub fn find_first(&self) -> Option<usize> {
        self.iter().next()
    }

    /// Index of the highest clear bit, if any.
    pub fn find_last_unset(&self) -> Option<usize> {
        (0..self.len).rev().find(|&el| !self.test(el))
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|f| f.count_ones() as usize).sum()
    }

    /// Returns `true` if no bit is set.
    pub fn none(&self) -> bool {
        self.bits.iter().all(|&f| f == 0)
    }

    /// Returns `true` if `self` has a bit set that `other` does not.
    pub fn has_bits_not_in(&self, other: &BitVec) -> bool {
        debug_assert_eq!(self.len, other.len);
        self.bits
            .iter()
            .zip(other.bits.iter())
            .any(|(&a, &b)| a & !b != 0)
    }

    /// In-place union. Returns `true` if any bit changed.
    pub fn union_with(&mut self, other: &BitVec) -> bool {
        debug_assert_eq!(self.len, other.len);
        let mut changed = 0;
        for (a, &b) in self.bits.iter_mut().zip(other.bits.iter()) {
            changed |= b & !*a;
            *a |= b;
        }
        changed != 0
    }

    /// In-place difference: clear every bit that is set in `other`.
    pub fn subtract(&mut self, other: &BitVec) {
        debug_assert_eq!(self.len, other.len);
        for (a, &b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a &= !b;
        }
    }

    /// Append the bits of `other` after the current last bit.
    pub fn append(&mut self, other: &BitVec) {
        let base = self.len;
        self.resize(base + other.len, false);
        for el in other.iter() {
            self.set(base + el);
        }
    }

    /// Iterate over the indices of set bits, in ascending order.
    pub fn iter(&self) -> SetBitsIter<'_> {
        SetBitsIter {
            next_frame_idx: 0,
            curr_frame: 0,
            bits: &self.bits,
        }
    }
}

impl core::fmt::Debug for BitVec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for el in 0..self.len {
            write!(f, "{}", if self.test(el) { '1' } else { '0' })?;
        }
        Ok(())
    }
}

pub struct SetBitsIter<'a> {
    next_frame_idx: usize,
    curr_frame: Frame,
    bits: &'a [Frame],
}

impl<'a> Iterator for SetBitsIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.curr_frame == 0 {
            if self.next_frame_idx >= self.bits.len() {
                return None;
            }
            self.curr_frame = self.bits[self.next_frame_idx];
            self.next_frame_idx += 1;
        }
        let skip = self.curr_frame.trailing_zeros();
        self.curr_frame &= !(1 << skip);
        Some((self.next_frame_idx - 1) * BITS_PER_FRAME + skip as usize)
    }
}

/// Collects indices into a vector of the smallest length covering them.
impl FromIterator<usize> for BitVec {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let els: Vec<usize> = iter.into_iter().collect();
        let len = els.iter().max().map_or(0, |&m| m + 1);
        let mut bv = BitVec {
            bits: vec![0; (len + BITS_PER_FRAME - 1) / BITS_PER_FRAME],
            len,
        };
        for el in els {
            bv.set(el);
        }
        bv
    }
}

#[cfg(test)]
mod test {
    use super::BitVec;
    use alloc::vec::Vec;

    #[test]
    fn test_set_and_get() {
        let mut vec = BitVec::with_len(300, false);
        assert!(vec.none());
        vec.set(0);
        vec.set(63);
        vec.set(64);
        vec.set(299);
        assert!(vec.test(0));
        assert!(vec.test(63));
        assert!(vec.test(64));
        assert!(!vec.test(65));
        assert!(vec.test(299));
        assert_eq!(vec.count(), 4);
        assert_eq!(vec.iter().collect::<Vec<_>>(), [0, 63, 64, 299]);
        vec.reset(63);
        assert_eq!(vec.find_first(), Some(0));
        vec.reset(0);
        assert_eq!(vec.find_first(), Some(64));
    }

    #[test]
    fn test_resize_fills_new_bits() {
        let mut vec = BitVec::with_len(3, false);
        vec.resize(70, true);
        assert_eq!(vec.len(), 70);
        assert_eq!(vec.count(), 67);
        assert!(!vec.test(2));
        assert!(vec.test(3));
        assert!(vec.test(69));
        vec.resize(5, true);
        assert_eq!(vec.count(), 2);
        vec.resize(70, false);
        assert_eq!(vec.count(), 2);
    }

    #[test]
    fn test_ranges_and_search() {
        let mut vec = BitVec::with_len(10, true);
        vec.reset_range(2, 5);
        assert_eq!(vec.count(), 7);
        assert_eq!(vec.find_last_unset(), Some(4));
        vec.set_range(2, 10);
        assert_eq!(vec.find_last_unset(), None);
    }

    #[test]
    fn test_set_algebra() {
        let mut a: BitVec = [1, 3, 5].iter().cloned().collect();
        a.resize(8, false);
        let mut b = BitVec::with_len(8, false);
        b.set(3);
        b.set(6);
        assert!(a.has_bits_not_in(&b));
        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), [1, 3, 5, 6]);
        a.subtract(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), [1, 5]);
        let mut c = BitVec::with_len(2, true);
        c.append(&a);
        assert_eq!(c.len(), 10);
        assert_eq!(c.iter().collect::<Vec<_>>(), [0, 1, 3, 7]);
    }
}
