/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Live ranges over the flat instruction numbering.

use smallvec::SmallVec;

/// A half-open range `[start, end)` of instruction positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    #[inline(always)]
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(end >= start, "invalid segment range");
        Segment { start, end }
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[inline(always)]
    pub fn contains(&self, loc: usize) -> bool {
        loc >= self.start && loc < self.end
    }

    /// Returns `true` if the segments share a position. Empty segments
    /// share nothing.
    #[inline(always)]
    pub fn intersects(&self, other: Segment) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && !(other.start >= self.end || self.start >= other.end)
    }

    /// Returns `true` if the two segments share an endpoint.
    #[inline(always)]
    pub fn touches(&self, other: Segment) -> bool {
        other.start == self.end || self.start == other.end
    }

    /// Returns `true` if `self` and `other` can be merged without
    /// covering new positions.
    pub fn mergeable(&self, other: Segment) -> bool {
        let inside = |point: Segment, seg: Segment| {
            point.is_empty() && seg.start <= point.start && point.start <= seg.end
        };
        self.intersects(other)
            || self.touches(other)
            || inside(*self, other)
            || inside(other, *self)
    }

    /// Widen `self` to cover `other`. The two must overlap or touch.
    pub fn merge(&mut self, other: Segment) {
        debug_assert!(self.mergeable(other), "merging non overlapping segment");
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
    }
}

impl core::fmt::Display for Segment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            write!(f, "[empty]")
        } else {
            write!(f, "[{}...{}) ", self.start, self.end)
        }
    }
}

/// The union of a value's live segments.
///
/// Segments are kept pairwise disjoint and non-touching: inserting a
/// segment absorbs every segment it overlaps or touches. They are not
/// kept sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Interval {
    segments: SmallVec<[Segment; 2]>,
}

impl Interval {
    pub fn new() -> Self {
        Self::default()
    }

    /// An interval made of the single segment `[start, end)`.
    pub fn from_range(start: usize, end: usize) -> Self {
        let mut ivl = Self::new();
        ivl.add(Segment::new(start, end));
        ivl
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Join `seg` into the interval.
    pub fn add(&mut self, seg: Segment) {
        let mut merged = seg;
        self.segments.retain(|s| {
            if s.mergeable(merged) {
                merged.merge(*s);
                false
            } else {
                true
            }
        });
        // Widening may have made the result reach a segment that was
        // kept before the merge happened.
        if self.segments.iter().any(|s| s.mergeable(merged)) {
            let rest = core::mem::take(&mut self.segments);
            self.add(merged);
            for s in rest {
                self.add(s);
            }
            return;
        }
        self.segments.push(merged);
    }

    /// Join every segment of `other` into the interval.
    pub fn add_interval(&mut self, other: &Interval) {
        for &s in other.segments.iter() {
            self.add(s);
        }
    }

    /// A copy with the segments sorted by start.
    pub fn compress(&self) -> Interval {
        let mut segments = self.segments.clone();
        segments.sort_unstable_by_key(|s| s.start);
        Interval { segments }
    }

    /// `end() - start()`, or zero for an interval with no segments.
    pub fn size(&self) -> usize {
        if self.segments.is_empty() {
            0
        } else {
            self.end() - self.start()
        }
    }

    /// Lowest covered position. Not meaningful for an interval with no
    /// segments.
    pub fn start(&self) -> usize {
        debug_assert!(!self.segments.is_empty(), "No segments in interval!");
        self.segments.iter().map(|s| s.start).min().unwrap_or(0)
    }

    /// One past the highest covered position.
    pub fn end(&self) -> usize {
        debug_assert!(!self.segments.is_empty(), "No segments in interval!");
        self.segments.iter().map(|s| s.end).max().unwrap_or(0)
    }

    /// Exact membership: `loc` lies in one of the segments, not merely
    /// between `start()` and `end()`.
    pub fn contains(&self, loc: usize) -> bool {
        self.segments.iter().any(|s| s.contains(loc))
    }

    pub fn intersects_segment(&self, seg: Segment) -> bool {
        self.segments.iter().any(|s| s.intersects(seg))
    }

    /// Segment-wise intersection test.
    pub fn intersects(&self, other: &Interval) -> bool {
        other
            .segments
            .iter()
            .any(|&seg| self.intersects_segment(seg))
    }
}

impl core::fmt::Display for Interval {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for s in self.compress().segments.iter() {
            write!(f, "{}", s)?;
        }
        Ok(())
    }
}
