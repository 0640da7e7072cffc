//! Module for opening and owning complete volume images.
//!
//! An [`Image`] bundles a parsed header, the voxel-to-world affine and
//! a windowed [`VolumeCache`] over the image's data block. The handle
//! owns every resource it needs; dropping it releases the cache and
//! the underlying source. Construction goes through [`ReaderOptions`].
//!
//! [`Image`]: ./struct.Image.html
//! [`VolumeCache`]: ../volume/cache/struct.VolumeCache.html
//! [`ReaderOptions`]: ./struct.ReaderOptions.html

use crate::affine::Affine4;
use crate::coverage::Region;
use crate::error::{ImageError, Result};
use crate::header::{NiftiHeader, MAGIC_CODE_NI1, MAGIC_CODE_NI2};
use crate::paths;
use crate::typedef::NiftiType;
use crate::volume::cache::{CacheState, CacheView, VolumeCache};
use crate::volume::data::VolumeData;
use crate::volume::element::DataElement;
use crate::volume::source::{open_block, AnySource};
use std::io;
use std::path::Path;

/// Options for loading a volume image from the file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    apply_scaling: bool,
    preload: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            apply_scaling: true,
            preload: false,
        }
    }
}

impl ReaderOptions {
    /// Options with scaling enabled and lazy loading.
    pub fn new() -> Self {
        ReaderOptions::default()
    }

    /// Choose whether the header's slope/intercept scaling is applied
    /// to decoded values. Enabled by default.
    pub fn scaling(mut self, apply_scaling: bool) -> Self {
        self.apply_scaling = apply_scaling;
        self
    }

    /// Choose whether the whole volume is materialized at open time
    /// instead of on demand. Disabled by default.
    pub fn preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    /// Open the image at `path` (or prefix; see [`paths::add_ext`]).
    ///
    /// Header-only files are paired with their ".img[.gz]" companion.
    ///
    /// [`paths::add_ext`]: ../paths/fn.add_ext.html
    pub fn read_file<T, P>(&self, path: P) -> Result<Image<T>>
    where
        T: DataElement,
        P: AsRef<Path>,
    {
        let path = paths::add_ext(path)?;
        let header = NiftiHeader::from_file(&path)?;
        if &header.magic == MAGIC_CODE_NI1 || &header.magic == MAGIC_CODE_NI2 {
            // volume lives in a separate data file
            let img = resolve_data_file(&path)?;
            self.read_pair_parts(header, img)
        } else {
            self.finish(header, open_block(&path)?)
        }
    }

    /// Open an image from explicit header and data files, for file
    /// names that do not follow the pairing convention.
    pub fn read_file_pair<T, P, Q>(&self, hdr_path: P, vol_path: Q) -> Result<Image<T>>
    where
        T: DataElement,
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let header = NiftiHeader::from_file(hdr_path)?;
        self.read_pair_parts(header, vol_path.as_ref().to_path_buf())
    }

    fn read_pair_parts<T: DataElement>(
        &self,
        header: NiftiHeader,
        vol_path: std::path::PathBuf,
    ) -> Result<Image<T>> {
        let source = open_block(&vol_path).map_err(|e| match e {
            ImageError::Io(io_e) if io_e.kind() == io::ErrorKind::NotFound => {
                ImageError::MissingVolumeFile(io_e)
            }
            e => e,
        })?;
        self.finish(header, source)
    }

    fn finish<T: DataElement>(
        &self,
        header: NiftiHeader,
        source: AnySource,
    ) -> Result<Image<T>> {
        let affine = header.affine()?;
        let cache = VolumeCache::with_scaling(source, &header, self.apply_scaling)?;
        if self.preload {
            let _view = cache.read_all()?;
        }
        tracing::debug!("opened image with shape {:?}", cache.dim());
        Ok(Image {
            header,
            affine,
            cache,
        })
    }
}

/// Locate the data file next to a header file, preferring the
/// compressed variant.
fn resolve_data_file(hdr_path: &Path) -> Result<std::path::PathBuf> {
    let img = paths::companion_data_file(hdr_path);
    let gz = if paths::is_gz_file(&img) {
        img.clone()
    } else {
        let mut with_gz = img.clone().into_os_string();
        with_gz.push(".gz");
        with_gz.into()
    };
    for candidate in [&gz, &img] {
        if candidate.is_file() {
            return Ok(candidate.clone());
        }
    }
    Err(ImageError::MissingVolumeFile(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no data file for {:?}", hdr_path),
    )))
}

/// An owned volume image: header, voxel-to-world transform and the
/// windowed cache over its data.
#[derive(Debug)]
pub struct Image<T: DataElement> {
    header: NiftiHeader,
    affine: Affine4,
    cache: VolumeCache<T, AnySource>,
}

impl<T: DataElement> Image<T> {
    /// Open the image at `path` with default options.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use imagewrap::object::Image;
    /// # use imagewrap::Result;
    ///
    /// # fn run() -> Result<()> {
    /// let image: Image<f32> = Image::open("brain.nii.gz")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        ReaderOptions::new().read_file(path)
    }

    /// The parsed header.
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// The voxel-to-world transform.
    pub fn affine(&self) -> &Affine4 {
        &self.affine
    }

    /// The volume shape.
    pub fn dim(&self) -> &[u16] {
        self.cache.dim()
    }

    /// The on-disk data type.
    pub fn data_type(&self) -> NiftiType {
        self.cache.data_type()
    }

    /// The underlying windowed cache.
    pub fn cache(&self) -> &VolumeCache<T, AnySource> {
        &self.cache
    }

    /// Read a window of the volume. See [`VolumeCache::read`].
    ///
    /// [`VolumeCache::read`]: ../volume/cache/struct.VolumeCache.html#method.read
    pub fn read(&self, region: &Region) -> Result<CacheView<'_, T>> {
        self.cache.read(region)
    }

    /// Read the whole volume.
    pub fn read_all(&self) -> Result<CacheView<'_, T>> {
        self.cache.read_all()
    }

    /// How much of the volume is materialized.
    pub fn state(&self) -> CacheState {
        self.cache.state()
    }

    /// The running finite (min, max) over everything read so far.
    pub fn data_range(&self) -> (Option<f64>, Option<f64>) {
        self.cache.data_range()
    }

    /// Materialize the whole volume and unwrap it into owned data.
    pub fn into_data(self) -> Result<VolumeData<T>> {
        self.cache.into_data()
    }
}
