//! This module defines the voxel volume API: shapes and indices, data
//! elements, dense in-memory volumes with explicit sub-views, byte
//! sources over on-disk voxel blocks, and the windowed cache which
//! materializes volumes region by region.

pub mod cache;
pub mod data;
pub mod element;
pub mod shape;
pub mod source;

pub use self::cache::{CacheState, CacheView, VolumeCache};
pub use self::data::{VolumeData, VolumeView};
pub use self::element::DataElement;
pub use self::source::{AnySource, ByteSource, FileSource, MemSource};

use crate::error::Result;

/// Public API for volume data, exposed as a multi-dimensional voxel
/// array.
pub trait VoxelVolume {
    /// Get the dimensions of the volume. The returned slice is clipped
    /// to the effective number of dimensions.
    fn dim(&self) -> &[u16];

    /// Get the volume's number of dimensions.
    fn rank(&self) -> usize {
        self.dim().len()
    }

    /// Fetch a single voxel's value in the given voxel index
    /// coordinates as a double precision floating point value. All
    /// necessary conversions are made when reading the voxel. Note that
    /// using this function continuously to traverse the volume is
    /// inefficient; prefer iterating over views.
    ///
    /// # Errors
    ///
    /// - `ImageError::OutOfBounds` if the given coordinates surpass
    ///   this volume's boundaries.
    fn get_f64(&self, coords: &[u16]) -> Result<f64>;

    /// Fetch a single voxel's value as single precision.
    ///
    /// # Errors
    ///
    /// - `ImageError::OutOfBounds` if the given coordinates surpass
    ///   this volume's boundaries.
    fn get_f32(&self, coords: &[u16]) -> Result<f32> {
        let v = self.get_f64(coords)?;
        Ok(v as f32)
    }
}

impl<'a, V: VoxelVolume> VoxelVolume for &'a V {
    fn dim(&self) -> &[u16] {
        (**self).dim()
    }

    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn get_f64(&self, coords: &[u16]) -> Result<f64> {
        (**self).get_f64(coords)
    }

    fn get_f32(&self, coords: &[u16]) -> Result<f32> {
        (**self).get_f32(coords)
    }
}
