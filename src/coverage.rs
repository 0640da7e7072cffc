//! Coverage bookkeeping for partially materialized volumes.
//!
//! A [`CoverageTracker`] records which rectangular index windows of a
//! volume have been read from the backing store into memory. The covered
//! index space is kept as an exact union of disjoint boxes: a query is
//! reported as covered when and only when it is contained in that union,
//! so the cache never serves stale data and never re-reads data it
//! already holds.
//!
//! The one-dimensional primitive underneath is [`IntervalSet`], a sorted
//! sequence of disjoint, merged half-open intervals with insert and
//! subtract operations.
//!
//! [`CoverageTracker`]: ./struct.CoverageTracker.html
//! [`IntervalSet`]: ./struct.IntervalSet.html

use crate::error::{ImageError, Result};
use crate::volume::shape::{Dim, Idx};

/// A set of disjoint half-open `[lo, hi)` intervals over `u16` indices.
///
/// Intervals are kept sorted and are merged whenever they overlap or
/// become adjacent, so the stored form is canonical: two sets cover the
/// same indices exactly when their `spans` are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    spans: Vec<(u16, u16)>,
}

impl IntervalSet {
    /// Create an empty interval set.
    pub fn new() -> Self {
        IntervalSet { spans: Vec::new() }
    }

    /// Insert `[lo, hi)`, merging with any overlapping or adjacent span.
    pub fn insert(&mut self, lo: u16, hi: u16) {
        if lo >= hi {
            return;
        }
        let mut lo = lo;
        let mut hi = hi;
        let mut out = Vec::with_capacity(self.spans.len() + 1);
        let mut placed = false;
        for &(slo, shi) in &self.spans {
            if shi < lo || slo > hi {
                // no overlap and not adjacent
                if slo > hi && !placed {
                    out.push((lo, hi));
                    placed = true;
                }
                out.push((slo, shi));
            } else {
                lo = lo.min(slo);
                hi = hi.max(shi);
            }
        }
        if !placed {
            out.push((lo, hi));
        }
        self.spans = out;
    }

    /// Whether `[lo, hi)` is entirely inside one stored span.
    pub fn contains(&self, lo: u16, hi: u16) -> bool {
        if lo >= hi {
            return true;
        }
        self.spans.iter().any(|&(slo, shi)| slo <= lo && hi <= shi)
    }

    /// The sub-intervals of `[lo, hi)` not present in this set, in order.
    pub fn gaps(&self, lo: u16, hi: u16) -> Vec<(u16, u16)> {
        let mut out = Vec::new();
        if lo >= hi {
            return out;
        }
        let mut cursor = lo;
        for &(slo, shi) in &self.spans {
            if shi <= cursor {
                continue;
            }
            if slo >= hi {
                break;
            }
            if slo > cursor {
                out.push((cursor, slo.min(hi)));
            }
            cursor = cursor.max(shi);
            if cursor >= hi {
                break;
            }
        }
        if cursor < hi {
            out.push((cursor, hi));
        }
        out
    }

    /// Total number of indices covered by this set.
    pub fn covered_len(&self) -> usize {
        self.spans
            .iter()
            .map(|&(lo, hi)| usize::from(hi) - usize::from(lo))
            .sum()
    }

    /// The stored spans, sorted and disjoint.
    pub fn spans(&self) -> &[(u16, u16)] {
        &self.spans
    }
}

/// A rectangular index window of a volume: one half-open `[lo, hi)`
/// range per axis.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct Region {
    /// raw bounds, slot 0 is the rank
    lo: [u16; 8],
    hi: [u16; 8],
}

impl Region {
    /// Create a region from per-axis lower (inclusive) and upper
    /// (exclusive) bounds.
    ///
    /// # Errors
    ///
    /// - `ImageError::ShapeMismatch` if the two bound slices disagree
    ///   in length.
    /// - `ImageError::InconsistentDim` if the rank is 0 or above 7, or
    ///   any lower bound exceeds its upper bound.
    pub fn new(lo: &[u16], hi: &[u16]) -> Result<Self> {
        if lo.len() != hi.len() {
            return Err(ImageError::ShapeMismatch(lo.len(), hi.len()));
        }
        if lo.is_empty() || lo.len() > 7 {
            return Err(ImageError::InconsistentDim(0, lo.len() as u64));
        }
        let mut raw_lo = [0u16; 8];
        let mut raw_hi = [0u16; 8];
        raw_lo[0] = lo.len() as u16;
        raw_hi[0] = hi.len() as u16;
        for (d, (&l, &h)) in Iterator::zip(lo.iter(), hi.iter()).enumerate() {
            if l > h {
                return Err(ImageError::InconsistentDim(d as u8 + 1, u64::from(l)));
            }
            raw_lo[d + 1] = l;
            raw_hi[d + 1] = h;
        }
        Ok(Region { lo: raw_lo, hi: raw_hi })
    }

    /// The region spanning a whole volume of the given shape.
    pub fn full(dim: &Dim) -> Self {
        let mut raw_lo = [0u16; 8];
        let mut raw_hi = [0u16; 8];
        raw_lo[0] = dim.rank() as u16;
        raw_hi[0] = dim.rank() as u16;
        raw_hi[1..=dim.rank()].copy_from_slice(dim.as_ref());
        Region {
            lo: raw_lo,
            hi: raw_hi,
        }
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        usize::from(self.lo[0])
    }

    /// Lower bounds, one per axis.
    pub fn lo(&self) -> &[u16] {
        &self.lo[1..=self.rank()]
    }

    /// Upper bounds, one per axis.
    pub fn hi(&self) -> &[u16] {
        &self.hi[1..=self.rank()]
    }

    /// The `[lo, hi)` window on one axis.
    pub fn axis(&self, d: usize) -> (u16, u16) {
        debug_assert!(d < self.rank());
        (self.lo[d + 1], self.hi[d + 1])
    }

    /// A copy of this region with the window on axis `d` replaced.
    fn with_axis(&self, d: usize, lo: u16, hi: u16) -> Region {
        let mut out = *self;
        out.lo[d + 1] = lo;
        out.hi[d + 1] = hi;
        out
    }

    /// Whether the region spans no elements.
    pub fn is_empty(&self) -> bool {
        (0..self.rank()).any(|d| {
            let (lo, hi) = self.axis(d);
            lo == hi
        })
    }

    /// Number of elements spanned.
    pub fn count(&self) -> usize {
        (0..self.rank())
            .map(|d| {
                let (lo, hi) = self.axis(d);
                usize::from(hi) - usize::from(lo)
            })
            .product()
    }

    /// Whether `other` is entirely inside this region.
    pub fn contains(&self, other: &Region) -> bool {
        if self.rank() != other.rank() {
            return false;
        }
        other.is_empty()
            || (0..self.rank()).all(|d| {
                let (slo, shi) = self.axis(d);
                let (olo, ohi) = other.axis(d);
                slo <= olo && ohi <= shi
            })
    }

    /// The overlapping window of two regions, if any.
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        if self.rank() != other.rank() || self.is_empty() || other.is_empty() {
            return None;
        }
        let mut out = *self;
        for d in 0..self.rank() {
            let (slo, shi) = self.axis(d);
            let (olo, ohi) = other.axis(d);
            let lo = slo.max(olo);
            let hi = shi.min(ohi);
            if lo >= hi {
                return None;
            }
            out = out.with_axis(d, lo, hi);
        }
        Some(out)
    }

    /// Decompose `self` minus `other` into disjoint boxes.
    ///
    /// The pieces are carved off axis by axis: on each axis the part of
    /// the query below and above the overlap becomes its own box, and
    /// the remaining core is narrowed to the overlap before moving on.
    pub fn subtract(&self, other: &Region) -> Vec<Region> {
        let overlap = match self.intersect(other) {
            None => {
                return if self.is_empty() { Vec::new() } else { vec![*self] };
            }
            Some(overlap) => overlap,
        };
        let mut out = Vec::new();
        let mut core = *self;
        for d in 0..self.rank() {
            let (clo, chi) = core.axis(d);
            let (olo, ohi) = overlap.axis(d);
            let mut covered = IntervalSet::new();
            covered.insert(olo, ohi);
            for (glo, ghi) in covered.gaps(clo, chi) {
                out.push(core.with_axis(d, glo, ghi));
            }
            core = core.with_axis(d, olo, ohi);
        }
        out
    }

    /// Merge two regions into one box if they differ on at most one
    /// axis and touch or overlap on that axis.
    fn merge_into_box(&self, other: &Region) -> Option<Region> {
        if self.rank() != other.rank() {
            return None;
        }
        let mut differing = None;
        for d in 0..self.rank() {
            if self.axis(d) != other.axis(d) {
                if differing.is_some() {
                    return None;
                }
                differing = Some(d);
            }
        }
        let d = match differing {
            None => return Some(*self),
            Some(d) => d,
        };
        let (slo, shi) = self.axis(d);
        let (olo, ohi) = other.axis(d);
        if shi < olo || ohi < slo {
            return None;
        }
        Some(self.with_axis(d, slo.min(olo), shi.max(ohi)))
    }

    /// Iterate over the start index of every contiguous column-major run
    /// in this region. Each run spans the full axis-0 window.
    pub fn run_starts(&self) -> RegionRunIter {
        RegionRunIter::new(self)
    }

    /// Width of one contiguous column-major run, in elements.
    pub fn run_len(&self) -> usize {
        let (lo, hi) = self.axis(0);
        usize::from(hi) - usize::from(lo)
    }
}

/// Iterator over the contiguous column-major runs of a [`Region`].
///
/// [`Region`]: ./struct.Region.html
#[derive(Debug, Clone)]
pub struct RegionRunIter {
    region: Region,
    current: Option<Idx>,
}

impl RegionRunIter {
    fn new(region: &Region) -> Self {
        let current = if region.is_empty() {
            None
        } else {
            // all runs start at the axis-0 lower bound
            Some(Idx::from_slice(region.lo()).expect("region rank was validated"))
        };
        RegionRunIter {
            region: *region,
            current,
        }
    }
}

impl Iterator for RegionRunIter {
    type Item = Idx;

    fn next(&mut self) -> Option<Self::Item> {
        let out = self.current?;
        let mut next = out;
        let mut good = false;
        for d in 1..self.region.rank() {
            let (lo, hi) = self.region.axis(d);
            let c = &mut next.as_mut()[d];
            if *c + 1 < hi {
                *c += 1;
                good = true;
                break;
            }
            *c = lo;
        }
        self.current = if good { Some(next) } else { None };
        Some(out)
    }
}

/// Tracks which index windows of a volume are materialized in memory.
///
/// The covered space is an exact union of disjoint boxes. Boxes are
/// greedily merged along single axes after every insertion, preferring
/// fewer, larger boxes.
#[derive(Debug, Clone, Default)]
pub struct CoverageTracker {
    boxes: Vec<Region>,
}

impl CoverageTracker {
    /// Create a tracker with nothing covered.
    pub fn new() -> Self {
        CoverageTracker { boxes: Vec::new() }
    }

    /// Whether nothing has been covered yet.
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// The sub-regions of `region` not yet covered.
    ///
    /// Every returned region lies inside `region`, and together they
    /// span exactly the part of `region` missing from the union of all
    /// previously marked regions.
    pub fn uncovered(&self, region: &Region) -> Vec<Region> {
        if region.is_empty() {
            return Vec::new();
        }
        let mut remainder = vec![*region];
        for covered in &self.boxes {
            if remainder.is_empty() {
                break;
            }
            remainder = remainder
                .iter()
                .flat_map(|r| r.subtract(covered))
                .collect();
        }
        remainder
    }

    /// Whether `region` is entirely covered.
    pub fn is_covered(&self, region: &Region) -> bool {
        self.uncovered(region).is_empty()
    }

    /// Record `region` as covered, merging it into the stored boxes.
    pub fn mark_covered(&mut self, region: &Region) {
        if region.is_empty() {
            return;
        }
        let fresh = self.uncovered(region);
        if fresh.is_empty() {
            return;
        }
        self.boxes.extend(fresh);
        self.merge_pass();
        tracing::trace!(
            boxes = self.boxes.len(),
            "coverage extended by {:?}",
            region
        );
    }

    /// Total number of covered elements. The boxes are disjoint, so a
    /// plain sum is exact.
    pub fn covered_count(&self) -> usize {
        self.boxes.iter().map(Region::count).sum()
    }

    /// Drop all coverage.
    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    fn merge_pass(&mut self) {
        loop {
            let mut merged = None;
            'scan: for i in 0..self.boxes.len() {
                for j in (i + 1)..self.boxes.len() {
                    if let Some(m) = self.boxes[i].merge_into_box(&self.boxes[j]) {
                        merged = Some((i, j, m));
                        break 'scan;
                    }
                }
            }
            match merged {
                Some((i, j, m)) => {
                    let _ = self.boxes.swap_remove(j);
                    self.boxes[i] = m;
                }
                None => break,
            }
        }
    }
}
