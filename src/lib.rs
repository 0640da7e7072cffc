//! Lazy windowed access to NIfTI volumes.
//!
//! This crate opens NIfTI-1 (and NIfTI-2) volume files and serves
//! rectangular windows of their data on demand. Windows read from disk
//! are cached in memory with exact coverage bookkeeping, so no byte is
//! decoded twice and no stale data is ever served, and the finite
//! intensity range of everything seen so far is tracked incrementally.
//! Volumes carry their voxel-to-world affine and can be resampled onto
//! new grids.
//!
//! # Example
//!
//! ```no_run
//! use imagewrap::{Image, Region};
//!
//! # fn run() -> imagewrap::Result<()> {
//! let image: Image<f32> = Image::open("brain.nii.gz")?;
//!
//! // materializes only the requested window
//! let window = Region::new(&[0, 0, 10], &[91, 109, 12])?;
//! let view = image.read(&window)?;
//! let value = view.get(&[45, 54, 0])?;
//! drop(view);
//!
//! // the range covers everything read so far, skipping NaN and Inf
//! let (min, max) = image.data_range();
//! # let _ = (value, min, max);
//! # Ok(())
//! # }
//! ```
#![deny(missing_debug_implementations)]
#![warn(missing_docs, unused_extern_crates, trivial_casts)]

pub mod affine;
pub mod coverage;
pub mod error;
pub mod header;
pub mod object;
pub mod paths;
pub mod range;
pub mod resample;
pub mod site;
pub mod typedef;
pub mod volume;
pub mod writer;

pub use crate::coverage::{CoverageTracker, IntervalSet, Region};
pub use crate::error::{ImageError, Result};
pub use crate::header::NiftiHeader;
pub use crate::object::{Image, ReaderOptions};
pub use crate::range::{finite_range, RangeTracker};
pub use crate::resample::{
    resample, resample_to_pixdims, resample_to_shape, EdgePolicy, Interpolation, Origin,
    ResampleOptions,
};
pub use crate::typedef::NiftiType;
pub use crate::volume::{
    CacheState, CacheView, DataElement, VolumeCache, VolumeData, VolumeView, VoxelVolume,
};
pub use crate::writer::write_volume;
