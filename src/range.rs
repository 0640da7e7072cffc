//! Finite intensity range calculation and tracking.
//!
//! Display tooling needs the (min, max) of a volume's values with NaN
//! and infinity left out. For windowed volumes the range is accumulated
//! incrementally: every block read from disk is folded into a
//! [`RangeTracker`], whose bounds only ever widen.
//!
//! [`RangeTracker`]: ./struct.RangeTracker.html

use num_traits::AsPrimitive;

/// The minimum and maximum finite values in a block, or `None` if the
/// block holds no finite value at all (empty, or all NaN/infinite).
pub fn finite_range<T>(values: &[T]) -> Option<(f64, f64)>
where
    T: Copy + AsPrimitive<f64>,
{
    let mut out: Option<(f64, f64)> = None;
    for v in values {
        let v: f64 = v.as_();
        if !v.is_finite() {
            continue;
        }
        out = Some(match out {
            None => (v, v),
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
        });
    }
    out
}

/// Running finite (min, max) over every block ever folded in.
///
/// Bounds grow monotonically: once observed, a bound is never revised
/// except by [`reset`]. Before any finite value has been seen, both
/// bounds are `None`.
///
/// [`reset`]: ./struct.RangeTracker.html#method.reset
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeTracker {
    min: Option<f64>,
    max: Option<f64>,
}

impl RangeTracker {
    /// Create a tracker with no observed range.
    pub fn new() -> Self {
        RangeTracker::default()
    }

    /// Fold a block of values into the range and return the updated
    /// bounds. Blocks without any finite value leave the range as it
    /// was.
    pub fn update<T>(&mut self, values: &[T]) -> (Option<f64>, Option<f64>)
    where
        T: Copy + AsPrimitive<f64>,
    {
        if let Some((lo, hi)) = finite_range(values) {
            self.update_bounds(lo, hi);
        }
        self.range()
    }

    /// Widen the bounds with an already-computed finite (min, max).
    pub fn update_bounds(&mut self, lo: f64, hi: f64) {
        debug_assert!(lo.is_finite() && hi.is_finite());
        let old = (self.min, self.max);
        self.min = Some(self.min.map_or(lo, |m| m.min(lo)));
        self.max = Some(self.max.map_or(hi, |m| m.max(hi)));
        if (self.min, self.max) != old {
            tracing::debug!(
                "data range adjusted: {:?} - {:?}",
                self.min,
                self.max
            );
        }
    }

    /// Merge another tracker's bounds into this one.
    pub fn merge(&mut self, other: &RangeTracker) {
        if let (Some(lo), Some(hi)) = (other.min, other.max) {
            self.update_bounds(lo, hi);
        }
    }

    /// The current bounds.
    pub fn range(&self) -> (Option<f64>, Option<f64>) {
        (self.min, self.max)
    }

    /// Whether any finite value has been observed.
    pub fn is_known(&self) -> bool {
        self.min.is_some()
    }

    /// Forget everything; the next update starts a fresh range.
    pub fn reset(&mut self) {
        *self = RangeTracker::default();
    }
}
