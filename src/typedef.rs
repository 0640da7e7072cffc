//! Codes defined by the NIfTI standard that this crate interprets.
//!
//! Only the scalar numeric data types are retained: the windowed cache
//! tracks a finite intensity range for every volume it serves, which is
//! not defined for complex or color samples.

use num_derive::FromPrimitive;

/// Data type for representing a NIfTI value type in a volume.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
pub enum NiftiType {
    /// unsigned char.
    // NIFTI_TYPE_UINT8           2
    Uint8 = 2,
    /// signed short.
    // NIFTI_TYPE_INT16           4
    Int16 = 4,
    /// signed int.
    // NIFTI_TYPE_INT32           8
    Int32 = 8,
    /// 32 bit float.
    // NIFTI_TYPE_FLOAT32        16
    Float32 = 16,
    /// 64 bit float = double.
    // NIFTI_TYPE_FLOAT64        64
    Float64 = 64,
    /// signed char.
    // NIFTI_TYPE_INT8          256
    Int8 = 256,
    /// unsigned short.
    // NIFTI_TYPE_UINT16        512
    Uint16 = 512,
    /// unsigned int.
    // NIFTI_TYPE_UINT32        768
    Uint32 = 768,
    /// signed long long.
    // NIFTI_TYPE_INT64        1024
    Int64 = 1024,
    /// unsigned long long.
    // NIFTI_TYPE_UINT64       1280
    Uint64 = 1280,
}

impl NiftiType {
    /// Retrieve the size of an element of this data type, in bytes.
    pub fn size_of(self) -> usize {
        use NiftiType::*;
        match self {
            Int8 | Uint8 => 1,
            Int16 | Uint16 => 2,
            Int32 | Uint32 | Float32 => 4,
            Int64 | Uint64 | Float64 => 8,
        }
    }
}

/// The coordinate mapping method attached to a qform or sform field.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
pub enum XForm {
    /// Arbitrary coordinates.
    Unknown = 0,
    /// Scanner-based anatomical coordinates.
    ScannerAnat = 1,
    /// Coordinates aligned to another file's, or to anatomical "truth".
    AlignedAnat = 2,
    /// Coordinates aligned to the Talairach space.
    Talairach = 3,
    /// Coordinates aligned to the MNI-152 space.
    Mni152 = 4,
}

#[cfg(test)]
mod tests {
    use super::NiftiType;
    use num_traits::FromPrimitive;

    #[test]
    fn code_round_trip() {
        assert_eq!(NiftiType::from_i16(16), Some(NiftiType::Float32));
        assert_eq!(NiftiType::from_i16(512), Some(NiftiType::Uint16));
        assert_eq!(NiftiType::from_i16(3), None);
        assert_eq!(NiftiType::Float64.size_of(), 8);
        assert_eq!(NiftiType::Uint8.size_of(), 1);
    }
}
