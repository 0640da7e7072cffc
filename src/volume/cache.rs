//! The windowed volume cache.
//!
//! A [`VolumeCache`] owns a byte source over a volume's data block and
//! an in-memory element buffer which is filled on demand, one window at
//! a time. Coverage bookkeeping guarantees that every element is read
//! and decoded from disk exactly once, and a running finite intensity
//! range is folded from every block as it arrives.
//!
//! Reads of windows that are already covered are served from memory
//! with no I/O. A `read` call returns only once every part of the
//! requested window is materialized; no torn result is ever exposed.
//!
//! One mutex guards the source, the element buffer and the coverage
//! tracker together, so overlapping concurrent reads serialize instead
//! of duplicating disk work. The range tracker sits behind its own
//! lock: range updates only widen and commute.
//!
//! [`VolumeCache`]: ./struct.VolumeCache.html

use super::data::VolumeData;
use super::element::{decode_run, DataElement};
use super::shape::Dim;
use super::source::{ByteSource, MemSource};
use super::VoxelVolume;
use crate::coverage::{CoverageTracker, Region};
use crate::error::{ImageError, Result};
use crate::header::NiftiHeader;
use crate::range::RangeTracker;
use crate::typedef::NiftiType;
use byteordered::Endianness;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::io::Cursor;

/// How much of a volume the cache currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing has been read yet.
    Empty,
    /// Some windows are materialized.
    Partial,
    /// Every element is materialized; reads never touch the source.
    Full,
}

struct CacheInner<T, S> {
    source: S,
    buf: Vec<T>,
    coverage: CoverageTracker,
}

/// A lazily filled, range-tracked element buffer over a volume's data
/// block.
pub struct VolumeCache<T, S> {
    dim: Dim,
    datatype: NiftiType,
    endianness: Endianness,
    voxel_offset: u64,
    scl_slope: f32,
    scl_inter: f32,
    inner: Mutex<CacheInner<T, S>>,
    range: Mutex<RangeTracker>,
}

impl<T, S> fmt::Debug for VolumeCache<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeCache")
            .field("dim", &self.dim)
            .field("datatype", &self.datatype)
            .field("endianness", &self.endianness)
            .field("voxel_offset", &self.voxel_offset)
            .finish()
    }
}

impl<T, S> VolumeCache<T, S>
where
    T: DataElement,
    S: ByteSource,
{
    /// Create a cache over the voxel block behind `source`, interpreted
    /// according to `header`. Slope/intercept scaling from the header is
    /// applied to every decoded value.
    ///
    /// The source is expected to address the containing file, with the
    /// header's `vox_offset` locating the first voxel.
    pub fn new(source: S, header: &NiftiHeader) -> Result<Self> {
        Self::with_scaling(source, header, true)
    }

    /// Create a cache, choosing whether the header's slope/intercept
    /// scaling is applied on decode.
    pub fn with_scaling(source: S, header: &NiftiHeader, apply_scaling: bool) -> Result<Self> {
        let dim = Dim::new(header.dim)?;
        let datatype = header.data_type()?;
        if header.vox_offset < 0. {
            return Err(ImageError::InvalidFormat);
        }
        let (scl_slope, scl_inter) = if apply_scaling {
            (header.scl_slope, header.scl_inter)
        } else {
            (0., 0.)
        };
        Ok(VolumeCache {
            dim,
            datatype,
            endianness: header.endianness,
            voxel_offset: header.vox_offset as u64,
            scl_slope,
            scl_inter,
            inner: Mutex::new(CacheInner {
                source,
                buf: vec![T::zero(); dim.element_count()],
                coverage: CoverageTracker::new(),
            }),
            range: Mutex::new(RangeTracker::new()),
        })
    }

    /// The volume shape.
    pub fn dim(&self) -> &[u16] {
        self.dim.as_ref()
    }

    /// The on-disk data type.
    pub fn data_type(&self) -> NiftiType {
        self.datatype
    }

    /// The running finite (min, max) over everything read so far.
    pub fn data_range(&self) -> (Option<f64>, Option<f64>) {
        self.range.lock().range()
    }

    /// How much of the volume is materialized.
    pub fn state(&self) -> CacheState {
        let inner = self.inner.lock();
        if inner.coverage.is_empty() {
            CacheState::Empty
        } else if inner.coverage.covered_count() == self.dim.element_count() {
            CacheState::Full
        } else {
            CacheState::Partial
        }
    }

    /// Read a window of the volume, materializing whatever parts of it
    /// are not yet cached, and return a view over the cached elements.
    ///
    /// The view holds the cache lock; drop it before issuing another
    /// read from the same thread.
    ///
    /// # Errors
    ///
    /// - `ImageError::RegionOutOfBounds` if the window exceeds the
    ///   volume shape. Nothing is read and no state changes.
    /// - `ImageError::InconsistentDim` if the window is empty on some
    ///   axis.
    /// - `ImageError::Io` if the source fails or ends early. Windows
    ///   materialized before the failure stay cached; the failing
    ///   window is not marked covered and the range is not updated
    ///   with any of its values.
    pub fn read(&self, region: &Region) -> Result<CacheView<'_, T>> {
        let shape = self.window_shape(region)?;
        let mut inner = self.inner.lock();
        let gaps = inner.coverage.uncovered(region);
        if !gaps.is_empty() {
            tracing::debug!(
                "filling {} uncovered window(s) of {:?}",
                gaps.len(),
                region
            );
            for gap in &gaps {
                self.fill(&mut inner, gap)?;
            }
        }
        Ok(CacheView {
            buf: MutexGuard::map(inner, |inner| inner.buf.as_mut_slice()),
            parent_dim: self.dim,
            region: *region,
            shape,
        })
    }

    /// Read the whole volume. Equivalent to `read` over the full
    /// region.
    pub fn read_all(&self) -> Result<CacheView<'_, T>> {
        self.read(&Region::full(&self.dim))
    }

    /// Materialize the whole volume and unwrap it into owned data.
    pub fn into_data(self) -> Result<VolumeData<T>> {
        {
            let _view = self.read_all()?;
        }
        let inner = self.inner.into_inner();
        VolumeData::from_elements(self.dim, inner.buf)
    }

    fn window_shape(&self, region: &Region) -> Result<Dim> {
        if region.rank() != self.dim.rank() || !Region::full(&self.dim).contains(region) {
            return Err(ImageError::RegionOutOfBounds(
                *region,
                self.dim.as_ref().to_vec(),
            ));
        }
        let widths: Vec<u16> = Iterator::zip(region.lo().iter(), region.hi().iter())
            .map(|(lo, hi)| hi - lo)
            .collect();
        Dim::from_slice(&widths)
    }

    /// Read, decode and record one uncovered window. Coverage and range
    /// are only updated after the whole window decoded successfully.
    fn fill(&self, inner: &mut CacheInner<T, S>, gap: &Region) -> Result<()> {
        let esize = self.datatype.size_of();
        let run = gap.run_len();
        let mut scratch = vec![0u8; run * esize];
        let mut observed = RangeTracker::new();
        for start in gap.run_starts() {
            let lin = self
                .dim
                .linear_index(start.as_ref())
                .expect("gap lies inside the volume");
            let offset = self.voxel_offset + (lin * esize) as u64;
            inner.source.read_exact_at(offset, &mut scratch)?;
            let out = &mut inner.buf[lin..lin + run];
            decode_run(
                &scratch,
                self.datatype,
                self.endianness,
                self.scl_slope,
                self.scl_inter,
                out,
            )?;
            let _ = observed.update(out);
        }
        inner.coverage.mark_covered(gap);
        self.range.lock().merge(&observed);
        tracing::debug!("cached {} voxels at {:?}", gap.count(), gap.lo());
        Ok(())
    }
}

impl<T: DataElement> VolumeCache<T, MemSource> {
    /// Wrap an already materialized volume in a fully covered cache.
    /// Reads are served from memory and the range is known from the
    /// start.
    pub fn preloaded(data: VolumeData<T>) -> Self {
        let dim = *data.shape();
        let mut coverage = CoverageTracker::new();
        coverage.mark_covered(&Region::full(&dim));
        let mut range = RangeTracker::new();
        let _ = range.update(data.values());
        VolumeCache {
            dim,
            datatype: T::DATA_TYPE,
            endianness: Endianness::native(),
            voxel_offset: 0,
            scl_slope: 0.,
            scl_inter: 0.,
            inner: Mutex::new(CacheInner {
                source: Cursor::new(Vec::new()),
                buf: data.into_values(),
                coverage,
            }),
            range: Mutex::new(range),
        }
    }
}

/// A borrowed window over the cache's element buffer.
///
/// Holds the cache lock for its lifetime; elements are not copied
/// unless [`to_vec`] or [`to_data`] is called.
///
/// [`to_vec`]: ./struct.CacheView.html#method.to_vec
/// [`to_data`]: ./struct.CacheView.html#method.to_data
#[derive(Debug)]
pub struct CacheView<'a, T: DataElement> {
    buf: MappedMutexGuard<'a, [T]>,
    parent_dim: Dim,
    region: Region,
    shape: Dim,
}

impl<'a, T: DataElement> CacheView<'a, T> {
    /// The shape of the window.
    pub fn shape(&self) -> &Dim {
        &self.shape
    }

    /// The window bounds in the volume's index space.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Fetch a single element by window-relative coordinates.
    pub fn get(&self, coords: &[u16]) -> Result<T> {
        let _ = self.shape.linear_index(coords)?;
        let absolute: Vec<u16> = Iterator::zip(coords.iter(), self.region.lo().iter())
            .map(|(c, lo)| c + lo)
            .collect();
        Ok(self.buf[self.parent_dim.linear_index(&absolute)?])
    }

    /// Iterate the window's elements in column-major order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let buf: &[T] = &self.buf;
        let parent_dim = self.parent_dim;
        let region = self.region;
        let run = region.run_len();
        region.run_starts().flat_map(move |start| {
            let lin = parent_dim
                .linear_index(start.as_ref())
                .expect("run starts lie inside the volume");
            buf[lin..lin + run].iter().copied()
        })
    }

    /// Copy the window's elements out in column-major order.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Copy the window into an owned volume.
    pub fn to_data(&self) -> Result<VolumeData<T>> {
        VolumeData::from_elements(self.shape, self.to_vec())
    }
}

impl<'a, T: DataElement> VoxelVolume for CacheView<'a, T> {
    fn dim(&self) -> &[u16] {
        self.shape.as_ref()
    }

    fn get_f64(&self, coords: &[u16]) -> Result<f64> {
        self.get(coords).map(|v| v.as_())
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheState, VolumeCache};
    use crate::coverage::Region;
    use crate::error::ImageError;
    use crate::header::NiftiHeader;
    use crate::typedef::NiftiType;
    use crate::volume::data::VolumeData;
    use crate::volume::element::DataElement;
    use crate::volume::shape::Dim;
    use byteordered::Endianness;
    use std::io::{Cursor, Read, Seek, SeekFrom};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A seekable source that counts how many raw reads it serves.
    struct CountingSource {
        inner: Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
    }

    impl Read for CountingSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(buf)
        }
    }

    impl Seek for CountingSource {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    fn header(dim: [u16; 8], datatype: NiftiType) -> NiftiHeader {
        NiftiHeader {
            dim,
            datatype: datatype as i16,
            vox_offset: 0.,
            endianness: Endianness::Little,
            ..NiftiHeader::default()
        }
    }

    /// f32 bytes for v[i, j, k] = i + j + k over a cubic grid.
    fn sum_volume_bytes(side: u16) -> Vec<u8> {
        let mut bytes = Vec::new();
        for k in 0..side {
            for j in 0..side {
                for i in 0..side {
                    ((i + j + k) as f32)
                        .to_raw(&mut bytes, Endianness::Little)
                        .unwrap();
                }
            }
        }
        bytes
    }

    fn region(lo: &[u16], hi: &[u16]) -> Region {
        Region::new(lo, hi).unwrap()
    }

    #[test]
    fn windowed_read_scenario() {
        let hdr = header([3, 10, 10, 10, 0, 0, 0, 0], NiftiType::Float32);
        let cache: VolumeCache<f32, _> =
            VolumeCache::new(Cursor::new(sum_volume_bytes(10)), &hdr).unwrap();
        assert_eq!(cache.state(), CacheState::Empty);
        assert_eq!(cache.data_range(), (None, None));

        let first: Vec<f32> = {
            let view = cache.read(&region(&[0, 0, 0], &[5, 5, 5])).unwrap();
            assert_eq!(view.shape().as_ref(), &[5, 5, 5]);
            for i in 0..5u16 {
                for j in 0..5u16 {
                    for k in 0..5u16 {
                        assert_eq!(view.get(&[i, j, k]).unwrap(), (i + j + k) as f32);
                    }
                }
            }
            assert_eq!(view.to_vec().len(), 125);
            view.to_vec()
        };
        assert_eq!(cache.state(), CacheState::Partial);
        assert_eq!(cache.data_range(), (Some(0.), Some(12.)));

        let view = cache.read(&region(&[0, 0, 0], &[10, 10, 10])).unwrap();
        assert_eq!(view.to_vec().len(), 1000);
        for i in 0..10u16 {
            for j in 0..10u16 {
                for k in 0..10u16 {
                    assert_eq!(view.get(&[i, j, k]).unwrap(), (i + j + k) as f32);
                }
            }
        }
        // the first window is unchanged after the superset read
        let again: Vec<f32> = (0..5)
            .flat_map(|k| {
                (0..5).flat_map(move |j| (0..5).map(move |i| (i + j + k) as f32))
            })
            .collect();
        assert_eq!(first, again);
        drop(view);
        assert_eq!(cache.state(), CacheState::Full);
        assert_eq!(cache.data_range(), (Some(0.), Some(27.)));
    }

    #[test]
    fn covered_reads_do_no_io() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: Cursor::new(sum_volume_bytes(6)),
            reads: Arc::clone(&reads),
        };
        let hdr = header([3, 6, 6, 6, 0, 0, 0, 0], NiftiType::Float32);
        let cache: VolumeCache<f32, _> = VolumeCache::new(source, &hdr).unwrap();

        let window = region(&[1, 1, 1], &[5, 5, 5]);
        let first = cache.read(&window).unwrap().to_vec();
        let after_first = reads.load(Ordering::SeqCst);
        assert!(after_first > 0);

        let second = cache.read(&window).unwrap().to_vec();
        assert_eq!(reads.load(Ordering::SeqCst), after_first);
        assert_eq!(first, second);

        // a subset does not trigger I/O either
        let _ = cache.read(&region(&[2, 2, 2], &[4, 4, 4])).unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), after_first);
    }

    #[test]
    fn out_of_shape_read_leaves_state_untouched() {
        let hdr = header([3, 10, 10, 10, 0, 0, 0, 0], NiftiType::Float32);
        let cache: VolumeCache<f32, _> =
            VolumeCache::new(Cursor::new(sum_volume_bytes(10)), &hdr).unwrap();

        let err = cache
            .read(&region(&[0, 0, 0], &[11, 10, 10]))
            .err()
            .expect("read beyond the shape must fail");
        assert!(matches!(err, ImageError::RegionOutOfBounds(..)));
        let err = cache.read(&region(&[0, 0], &[5, 5])).err().unwrap();
        assert!(matches!(err, ImageError::RegionOutOfBounds(..)));
        assert_eq!(cache.state(), CacheState::Empty);
        assert_eq!(cache.data_range(), (None, None));

        // a subsequent valid read behaves like on a fresh instance
        let view = cache.read(&region(&[0, 0, 0], &[5, 5, 5])).unwrap();
        assert_eq!(view.get(&[4, 4, 4]).unwrap(), 12.);
        drop(view);
        assert_eq!(cache.data_range(), (Some(0.), Some(12.)));
    }

    #[test]
    fn truncated_source_fails_without_corrupting_coverage() {
        // only half of the declared 4x4x4 f32 volume is present
        let bytes = sum_volume_bytes(4);
        let truncated = bytes[..bytes.len() / 2].to_vec();
        let hdr = header([3, 4, 4, 4, 0, 0, 0, 0], NiftiType::Float32);
        let cache: VolumeCache<f32, _> = VolumeCache::new(Cursor::new(truncated), &hdr).unwrap();

        let err = cache.read(&region(&[0, 0, 2], &[4, 4, 4])).err().unwrap();
        assert!(matches!(err, ImageError::Io(_)));
        // the failed window is not covered, and its values never
        // entered the range
        assert_eq!(cache.state(), CacheState::Empty);
        assert_eq!(cache.data_range(), (None, None));

        // data that is present still reads fine afterwards
        let view = cache.read(&region(&[0, 0, 0], &[4, 4, 2])).unwrap();
        assert_eq!(view.get(&[3, 3, 1]).unwrap(), 7.);
    }

    #[test]
    fn nan_blocks_leave_range_unknown() {
        let mut bytes = Vec::new();
        for _ in 0..8 {
            f32::NAN.to_raw(&mut bytes, Endianness::Little).unwrap();
        }
        let hdr = header([3, 2, 2, 2, 0, 0, 0, 0], NiftiType::Float32);
        let cache: VolumeCache<f32, _> = VolumeCache::new(Cursor::new(bytes), &hdr).unwrap();
        let view = cache.read_all().unwrap();
        assert!(view.get(&[0, 0, 0]).unwrap().is_nan());
        drop(view);
        assert_eq!(cache.state(), CacheState::Full);
        assert_eq!(cache.data_range(), (None, None));
    }

    #[test]
    fn scaling_is_applied_on_decode() {
        let mut hdr = header([2, 2, 2, 0, 0, 0, 0, 0], NiftiType::Uint8);
        hdr.scl_slope = 2.0;
        hdr.scl_inter = -5.0;
        let cache: VolumeCache<f32, _> =
            VolumeCache::new(Cursor::new(vec![0u8, 1, 2, 3]), &hdr).unwrap();
        let data = cache.into_data().unwrap();
        assert_eq!(data.values(), &[-5., -3., -1., 1.]);
    }

    #[test]
    fn voxel_offset_is_honored() {
        let mut bytes = vec![0xAAu8; 16];
        bytes.extend(vec![7u8, 8, 9, 10]);
        let mut hdr = header([1, 4, 0, 0, 0, 0, 0, 0], NiftiType::Uint8);
        hdr.vox_offset = 16.;
        let cache: VolumeCache<u8, _> = VolumeCache::new(Cursor::new(bytes), &hdr).unwrap();
        let data = cache.into_data().unwrap();
        assert_eq!(data.values(), &[7, 8, 9, 10]);
    }

    #[test]
    fn preloaded_cache_is_full_and_ranged() {
        let dim = Dim::from_slice(&[2, 2]).unwrap();
        let data = VolumeData::from_elements(dim, vec![1.0f32, -2.0, 3.0, 0.5]).unwrap();
        let cache = VolumeCache::preloaded(data);
        assert_eq!(cache.state(), CacheState::Full);
        assert_eq!(cache.data_range(), (Some(-2.), Some(3.)));
        let view = cache.read_all().unwrap();
        assert_eq!(view.get(&[1, 1]).unwrap(), 0.5);
    }

    #[test]
    fn concurrent_readers_agree() {
        let hdr = header([3, 8, 8, 8, 0, 0, 0, 0], NiftiType::Float32);
        let cache: Arc<VolumeCache<f32, _>> =
            Arc::new(VolumeCache::new(Cursor::new(sum_volume_bytes(8)), &hdr).unwrap());

        let mut handles = Vec::new();
        for t in 0..4u16 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                let window = region(&[0, 0, 2 * t], &[8, 8, 2 * t + 2]);
                let values = cache.read(&window).unwrap().to_vec();
                for (n, v) in values.iter().enumerate() {
                    let i = n % 8;
                    let j = (n / 8) % 8;
                    let k = 2 * usize::from(t) + n / 64;
                    assert_eq!(*v, (i + j + k) as f32);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.state(), CacheState::Full);
        assert_eq!(cache.data_range(), (Some(0.), Some(21.)));
    }
}
