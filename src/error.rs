//! Error types and the crate-wide `Result` alias.

use crate::coverage::Region;
use quick_error::quick_error;
use std::io::Error as IoError;
use std::path::PathBuf;

quick_error! {
    /// Error type for all operations in this crate.
    #[derive(Debug)]
    pub enum ImageError {
        /// Read an invalid NIfTI file
        InvalidFormat {
            display("invalid NIfTI file")
        }
        /// A header field holds a code outside its legal value set.
        InvalidCode(name: &'static str, code: i32) {
            display("invalid {} code: {}", name, code)
        }
        /// The `dim` field is in an invalid state: the rank is out of
        /// range or one of the dimensions is zero (or too wide).
        InconsistentDim(index: u8, value: u64) {
            display("inconsistent dim[{}] = {}", index, value)
        }
        /// Attempted to access a voxel outside the volume's boundaries.
        OutOfBounds(coords: Vec<u16>) {
            display("out of bounds access at {:?}", coords)
        }
        /// A requested region exceeds the volume's declared shape.
        RegionOutOfBounds(region: Region, dim: Vec<u16>) {
            display("region {:?} exceeds volume shape {:?}", region, dim)
        }
        /// Two shapes disagree in rank or element count.
        ShapeMismatch(expected: usize, got: usize) {
            display("shape mismatch: expected {}, got {}", expected, got)
        }
        /// A sampled coordinate fell outside the source volume under the
        /// erroring edge policy.
        SampleOutOfBounds {
            display("sampled coordinate outside the source volume")
        }
        /// The header points to a separate volume file which could not
        /// be opened.
        MissingVolumeFile(err: IoError) {
            display("volume file not found: {}", err)
        }
        /// A file name prefix matched more than one image file on disk.
        AmbiguousImagePath(prefix: PathBuf) {
            display("more than one image file matches {:?}", prefix)
        }
        /// The affine transform has no inverse.
        SingularTransform {
            display("affine transform is not invertible")
        }
        /// I/O error
        Io(err: IoError) {
            from()
            source(err)
            display("{}", err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = std::result::Result<T, ImageError>;
