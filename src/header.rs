//! This module defines the `NiftiHeader` struct, which holds the
//! metadata needed to interpret a volume file: shape, data type, scaling
//! and the voxel-to-world transform.

use crate::affine::{self, Affine4};
use crate::error::{ImageError, Result};
use crate::paths::is_gz_file;
use crate::typedef::{NiftiType, XForm};
use byteordered::{Endian, Endianness};
use flate2::bufread::GzDecoder;
use nalgebra::{Matrix3, Vector3};
use num_traits::FromPrimitive;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Magic code for NIfTI-1 header files (extension ".hdr[.gz]").
pub const MAGIC_CODE_NI1: &[u8; 4] = b"ni1\0";
/// Magic code for full NIfTI-1 files (extension ".nii[.gz]").
pub const MAGIC_CODE_NIP1: &[u8; 4] = b"n+1\0";
/// Magic code for NIfTI-2 header files.
pub const MAGIC_CODE_NI2: &[u8; 4] = b"ni2\0";
/// Magic code for full NIfTI-2 files.
pub const MAGIC_CODE_NIP2: &[u8; 4] = b"n+2\0";

/// The NIfTI-1 header data type.
///
/// All fields are public and named after the specification's header
/// file. NIfTI-2 files are parsed into the same structure; their wide
/// fields are narrowed, and parsing fails if a value cannot be
/// represented.
///
/// # Examples
///
/// ```no_run
/// use imagewrap::NiftiHeader;
/// # use imagewrap::Result;
///
/// # fn run() -> Result<()> {
/// let hdr1 = NiftiHeader::from_file("0000.hdr")?;
/// let hdr2 = NiftiHeader::from_file("0001.hdr.gz")?;
/// let hdr3 = NiftiHeader::from_file("4321.nii.gz")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    /// Header size, must be 348 (NIfTI-1) or 540 (NIfTI-2)
    pub sizeof_hdr: i32,
    /// MRI slice ordering
    pub dim_info: u8,
    /// Data array dimensions
    pub dim: [u16; 8],
    /// 1st intent parameter
    pub intent_p1: f32,
    /// 2nd intent parameter
    pub intent_p2: f32,
    /// 3rd intent parameter
    pub intent_p3: f32,
    /// NIFTI_INTENT_* code
    pub intent_code: i16,
    /// Defines the data type
    pub datatype: i16,
    /// Number of bits per voxel
    pub bitpix: i16,
    /// First slice index
    pub slice_start: i16,
    /// Grid spacings
    pub pixdim: [f32; 8],
    /// Offset into .nii file to reach the volume
    pub vox_offset: f32,
    /// Data scaling: slope
    pub scl_slope: f32,
    /// Data scaling: offset
    pub scl_inter: f32,
    /// Last slice index
    pub slice_end: i16,
    /// Slice timing order
    pub slice_code: u8,
    /// Units of pixdim[1..4]
    pub xyzt_units: u8,
    /// Max display intensity
    pub cal_max: f32,
    /// Min display intensity
    pub cal_min: f32,
    /// Time for 1 slice
    pub slice_duration: f32,
    /// Time axis shift
    pub toffset: f32,
    /// Any text you like
    pub descrip: Vec<u8>,
    /// Auxiliary filename
    pub aux_file: [u8; 24],
    /// NIFTI_XFORM_* code
    pub qform_code: i16,
    /// NIFTI_XFORM_* code
    pub sform_code: i16,
    /// Quaternion b param
    pub quatern_b: f32,
    /// Quaternion c param
    pub quatern_c: f32,
    /// Quaternion d param
    pub quatern_d: f32,
    /// Quaternion x shift
    pub quatern_x: f32,
    /// Quaternion y shift
    pub quatern_y: f32,
    /// Quaternion z shift
    pub quatern_z: f32,
    /// 1st row affine transform
    pub srow_x: [f32; 4],
    /// 2nd row affine transform
    pub srow_y: [f32; 4],
    /// 3rd row affine transform
    pub srow_z: [f32; 4],
    /// 'name' or meaning of data
    pub intent_name: [u8; 16],
    /// Magic code
    pub magic: [u8; 4],
    /// Original data endianness
    pub endianness: Endianness,
}

impl Default for NiftiHeader {
    fn default() -> NiftiHeader {
        NiftiHeader {
            sizeof_hdr: 348,
            dim_info: 0,
            dim: [1, 1, 0, 0, 0, 0, 0, 0],
            intent_p1: 0.,
            intent_p2: 0.,
            intent_p3: 0.,
            intent_code: 0,
            datatype: 0,
            bitpix: 0,
            slice_start: 0,
            pixdim: [0.; 8],
            vox_offset: 352.,
            scl_slope: 0.,
            scl_inter: 0.,
            slice_end: 0,
            slice_code: 0,
            xyzt_units: 0,
            cal_max: 0.,
            cal_min: 0.,
            slice_duration: 0.,
            toffset: 0.,
            descrip: vec![0; 80],
            aux_file: [0; 24],
            qform_code: 0,
            sform_code: 0,
            quatern_b: 0.,
            quatern_c: 0.,
            quatern_d: 0.,
            quatern_x: 0.,
            quatern_y: 0.,
            quatern_z: 0.,
            srow_x: [0.; 4],
            srow_y: [0.; 4],
            srow_z: [0.; 4],
            intent_name: [0; 16],
            magic: *MAGIC_CODE_NIP1,
            endianness: Endianness::Little,
        }
    }
}

impl NiftiHeader {
    /// Retrieve a NIfTI header from a file in the file system. If the
    /// file's name ends with ".gz", the file is assumed to need GZip
    /// decoding.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<NiftiHeader> {
        let gz = is_gz_file(&path);
        let file = BufReader::new(File::open(path)?);
        if gz {
            NiftiHeader::from_stream(GzDecoder::new(file))
        } else {
            NiftiHeader::from_stream(file)
        }
    }

    /// Read a NIfTI header from the given byte stream. It is assumed
    /// that the input is currently at the start of the header. Both
    /// header versions and both byte orders are detected from the
    /// leading `sizeof_hdr` field.
    pub fn from_stream<S: Read>(mut input: S) -> Result<NiftiHeader> {
        let mut first = [0u8; 4];
        input.read_exact(&mut first)?;
        let sizeof_hdr = i32::from_ne_bytes(first);
        let native = Endianness::native();
        if sizeof_hdr == 348 {
            parse_header_1(input, native)
        } else if sizeof_hdr.swap_bytes() == 348 {
            parse_header_1(input, opposite(native))
        } else if sizeof_hdr == 540 {
            parse_header_2(input, native)
        } else if sizeof_hdr.swap_bytes() == 540 {
            parse_header_2(input, opposite(native))
        } else {
            Err(ImageError::InvalidFormat)
        }
    }

    /// Get the data type as a validated enum.
    pub fn data_type(&self) -> Result<NiftiType> {
        FromPrimitive::from_i16(self.datatype)
            .ok_or(ImageError::InvalidCode("datatype", i32::from(self.datatype)))
    }

    /// Get the qform coordinate mapping method as a validated enum.
    pub fn qform(&self) -> Result<XForm> {
        FromPrimitive::from_i16(self.qform_code)
            .ok_or(ImageError::InvalidCode("qform", i32::from(self.qform_code)))
    }

    /// Get the sform coordinate mapping method as a validated enum.
    pub fn sform(&self) -> Result<XForm> {
        FromPrimitive::from_i16(self.sform_code)
            .ok_or(ImageError::InvalidCode("sform", i32::from(self.sform_code)))
    }

    /// The voxel-to-world transform of this header.
    ///
    /// The sform fields take precedence when `sform_code` is set;
    /// otherwise the qform quaternion is reconstructed; otherwise a
    /// scaling transform is derived from the shape and grid spacings.
    pub fn affine(&self) -> Result<Affine4> {
        if self.sform_code > 0 {
            Ok(self.sform_affine())
        } else if self.qform_code > 0 {
            self.qform_affine()
        } else {
            let dim = [
                self.dim[1].max(1),
                self.dim[2].max(1),
                self.dim[3].max(1),
            ];
            let pixdim = [
                nonzero_spacing(self.pixdim[1]),
                nonzero_spacing(self.pixdim[2]),
                nonzero_spacing(self.pixdim[3]),
            ];
            Ok(affine::shape_zoom_affine(&dim, &pixdim))
        }
    }

    fn sform_affine(&self) -> Affine4 {
        let affine = Affine4::new(
            f64::from(self.srow_x[0]), f64::from(self.srow_x[1]), f64::from(self.srow_x[2]), f64::from(self.srow_x[3]),
            f64::from(self.srow_y[0]), f64::from(self.srow_y[1]), f64::from(self.srow_y[2]), f64::from(self.srow_y[3]),
            f64::from(self.srow_z[0]), f64::from(self.srow_z[1]), f64::from(self.srow_z[2]), f64::from(self.srow_z[3]),
            0.0, 0.0, 0.0, 1.0,
        );
        affine
    }

    fn qform_affine(&self) -> Result<Affine4> {
        let q = affine::fill_positive(Vector3::new(
            f64::from(self.quatern_b),
            f64::from(self.quatern_c),
            f64::from(self.quatern_d),
        ))?;
        let rotation = affine::quaternion_to_affine(q);
        // pixdim[0] holds the qfac handedness flag, 0 counts as 1
        let qfac = if self.pixdim[0] == -1.0 { -1.0 } else { 1.0 };
        let zooms = Vector3::new(
            f64::from(nonzero_spacing(self.pixdim[1])),
            f64::from(nonzero_spacing(self.pixdim[2])),
            qfac * f64::from(nonzero_spacing(self.pixdim[3])),
        );
        let rzs = rotation * Matrix3::from_diagonal(&zooms);
        let affine = Affine4::new(
            rzs[(0, 0)], rzs[(0, 1)], rzs[(0, 2)], f64::from(self.quatern_x),
            rzs[(1, 0)], rzs[(1, 1)], rzs[(1, 2)], f64::from(self.quatern_y),
            rzs[(2, 0)], rzs[(2, 1)], rzs[(2, 2)], f64::from(self.quatern_z),
            0.0, 0.0, 0.0, 1.0,
        );
        Ok(affine)
    }
}

fn nonzero_spacing(p: f32) -> f32 {
    if p == 0.0 {
        1.0
    } else {
        p.abs()
    }
}

fn opposite(e: Endianness) -> Endianness {
    match e {
        Endianness::Little => Endianness::Big,
        Endianness::Big => Endianness::Little,
    }
}

fn parse_header_1<S: Read>(mut input: S, e: Endianness) -> Result<NiftiHeader> {
    let mut h = NiftiHeader {
        sizeof_hdr: 348,
        endianness: e,
        ..NiftiHeader::default()
    };

    // data_type, db_name, extents, session_error and regular are unused
    // in NIfTI-1; skip straight to dim_info
    let mut unused = [0u8; 35];
    input.read_exact(&mut unused)?;
    h.dim_info = read_u8(&mut input)?;
    for v in &mut h.dim {
        *v = e.read_u16(&mut input)?;
    }
    h.intent_p1 = e.read_f32(&mut input)?;
    h.intent_p2 = e.read_f32(&mut input)?;
    h.intent_p3 = e.read_f32(&mut input)?;
    h.intent_code = e.read_i16(&mut input)?;
    h.datatype = e.read_i16(&mut input)?;
    h.bitpix = e.read_i16(&mut input)?;
    h.slice_start = e.read_i16(&mut input)?;
    for v in &mut h.pixdim {
        *v = e.read_f32(&mut input)?;
    }
    h.vox_offset = e.read_f32(&mut input)?;
    h.scl_slope = e.read_f32(&mut input)?;
    h.scl_inter = e.read_f32(&mut input)?;
    h.slice_end = e.read_i16(&mut input)?;
    h.slice_code = read_u8(&mut input)?;
    h.xyzt_units = read_u8(&mut input)?;
    h.cal_max = e.read_f32(&mut input)?;
    h.cal_min = e.read_f32(&mut input)?;
    h.slice_duration = e.read_f32(&mut input)?;
    h.toffset = e.read_f32(&mut input)?;
    // glmax, glmin are unused in NIfTI-1
    let mut unused = [0u8; 8];
    input.read_exact(&mut unused)?;

    input.read_exact(h.descrip.as_mut_slice())?;
    input.read_exact(&mut h.aux_file)?;
    h.qform_code = e.read_i16(&mut input)?;
    h.sform_code = e.read_i16(&mut input)?;
    h.quatern_b = e.read_f32(&mut input)?;
    h.quatern_c = e.read_f32(&mut input)?;
    h.quatern_d = e.read_f32(&mut input)?;
    h.quatern_x = e.read_f32(&mut input)?;
    h.quatern_y = e.read_f32(&mut input)?;
    h.quatern_z = e.read_f32(&mut input)?;
    for v in &mut h.srow_x {
        *v = e.read_f32(&mut input)?;
    }
    for v in &mut h.srow_y {
        *v = e.read_f32(&mut input)?;
    }
    for v in &mut h.srow_z {
        *v = e.read_f32(&mut input)?;
    }
    input.read_exact(&mut h.intent_name)?;
    input.read_exact(&mut h.magic)?;

    debug_assert_eq!(h.descrip.len(), 80);

    if &h.magic != MAGIC_CODE_NI1 && &h.magic != MAGIC_CODE_NIP1 {
        Err(ImageError::InvalidFormat)
    } else {
        Ok(h)
    }
}

fn parse_header_2<S: Read>(mut input: S, e: Endianness) -> Result<NiftiHeader> {
    let mut h = NiftiHeader {
        sizeof_hdr: 540,
        endianness: e,
        ..NiftiHeader::default()
    };

    let mut magic = [0u8; 8];
    input.read_exact(&mut magic)?;
    h.magic.copy_from_slice(&magic[..4]);
    if &h.magic != MAGIC_CODE_NI2 && &h.magic != MAGIC_CODE_NIP2 {
        return Err(ImageError::InvalidFormat);
    }

    h.datatype = e.read_i16(&mut input)?;
    h.bitpix = e.read_i16(&mut input)?;
    let mut raw_dim = [0i64; 8];
    for v in &mut raw_dim {
        *v = e.read_i64(&mut input)?;
    }
    h.dim = narrow_dim(raw_dim)?;
    h.intent_p1 = e.read_f64(&mut input)? as f32;
    h.intent_p2 = e.read_f64(&mut input)? as f32;
    h.intent_p3 = e.read_f64(&mut input)? as f32;
    for v in &mut h.pixdim {
        *v = e.read_f64(&mut input)? as f32;
    }
    let vox_offset = e.read_i64(&mut input)?;
    if vox_offset < 0 {
        return Err(ImageError::InvalidFormat);
    }
    h.vox_offset = vox_offset as f32;
    h.scl_slope = e.read_f64(&mut input)? as f32;
    h.scl_inter = e.read_f64(&mut input)? as f32;
    h.cal_max = e.read_f64(&mut input)? as f32;
    h.cal_min = e.read_f64(&mut input)? as f32;
    h.slice_duration = e.read_f64(&mut input)? as f32;
    h.toffset = e.read_f64(&mut input)? as f32;
    h.slice_start = e.read_i64(&mut input)? as i16;
    h.slice_end = e.read_i64(&mut input)? as i16;
    input.read_exact(h.descrip.as_mut_slice())?;
    input.read_exact(&mut h.aux_file)?;
    h.qform_code = e.read_i32(&mut input)? as i16;
    h.sform_code = e.read_i32(&mut input)? as i16;
    h.quatern_b = e.read_f64(&mut input)? as f32;
    h.quatern_c = e.read_f64(&mut input)? as f32;
    h.quatern_d = e.read_f64(&mut input)? as f32;
    h.quatern_x = e.read_f64(&mut input)? as f32;
    h.quatern_y = e.read_f64(&mut input)? as f32;
    h.quatern_z = e.read_f64(&mut input)? as f32;
    for v in &mut h.srow_x {
        *v = e.read_f64(&mut input)? as f32;
    }
    for v in &mut h.srow_y {
        *v = e.read_f64(&mut input)? as f32;
    }
    for v in &mut h.srow_z {
        *v = e.read_f64(&mut input)? as f32;
    }
    h.slice_code = e.read_i32(&mut input)? as u8;
    h.xyzt_units = e.read_i32(&mut input)? as u8;
    h.intent_code = e.read_i32(&mut input)? as i16;
    input.read_exact(&mut h.intent_name)?;
    h.dim_info = read_u8(&mut input)?;
    let mut unused = [0u8; 15];
    input.read_exact(&mut unused)?;

    Ok(h)
}

/// Narrow a NIfTI-2 dim field to the crate's `u16` shape domain.
/// Slots past the rank are cleared; slots within it must fit in `u16`.
fn narrow_dim(raw: [i64; 8]) -> Result<[u16; 8]> {
    if !(1..=7).contains(&raw[0]) {
        return Err(ImageError::InconsistentDim(0, raw[0] as u64));
    }
    let rank = raw[0] as usize;
    let mut dim = [0u16; 8];
    dim[0] = raw[0] as u16;
    for i in 1..=rank {
        if raw[i] < 1 || raw[i] > i64::from(u16::MAX) {
            return Err(ImageError::InconsistentDim(i as u8, raw[i] as u64));
        }
        dim[i] = raw[i] as u16;
    }
    Ok(dim)
}

fn read_u8<S: Read>(mut input: S) -> Result<u8> {
    let mut byte = [0u8; 1];
    input.read_exact(&mut byte)?;
    Ok(byte[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typedef::NiftiType;

    #[test]
    fn default_header_is_nifti1() {
        let h = NiftiHeader::default();
        assert_eq!(h.sizeof_hdr, 348);
        assert_eq!(h.vox_offset, 352.);
        assert_eq!(&h.magic, MAGIC_CODE_NIP1);
        assert!(h.data_type().is_err());
    }

    #[test]
    fn data_type_validation() {
        let h = NiftiHeader {
            datatype: NiftiType::Float32 as i16,
            ..NiftiHeader::default()
        };
        assert_eq!(h.data_type().unwrap(), NiftiType::Float32);

        let h = NiftiHeader {
            datatype: 3,
            ..NiftiHeader::default()
        };
        assert!(h.data_type().is_err());
    }

    #[test]
    fn affine_falls_back_to_pixdim() {
        let h = NiftiHeader {
            dim: [3, 4, 4, 4, 0, 0, 0, 0],
            pixdim: [0., 2., 2., 2., 0., 0., 0., 0.],
            ..NiftiHeader::default()
        };
        let affine = h.affine().unwrap();
        assert_eq!(affine[(0, 0)], -2.0);
        assert_eq!(affine[(1, 1)], 2.0);
        assert_eq!(affine[(2, 2)], 2.0);
        assert_eq!(affine[(3, 3)], 1.0);
    }

    #[test]
    fn affine_prefers_sform() {
        let h = NiftiHeader {
            dim: [3, 4, 4, 4, 0, 0, 0, 0],
            sform_code: 1,
            srow_x: [1., 0., 0., -10.],
            srow_y: [0., 1., 0., 20.],
            srow_z: [0., 0., 1., 30.],
            qform_code: 1,
            ..NiftiHeader::default()
        };
        assert_eq!(h.sform().unwrap(), XForm::ScannerAnat);
        assert_eq!(h.qform().unwrap(), XForm::ScannerAnat);
        let affine = h.affine().unwrap();
        assert_eq!(affine[(0, 3)], -10.0);
        assert_eq!(affine[(1, 3)], 20.0);
        assert_eq!(affine[(2, 2)], 1.0);
    }

    #[test]
    fn affine_from_qform_identity_quaternion() {
        let h = NiftiHeader {
            dim: [3, 4, 4, 4, 0, 0, 0, 0],
            qform_code: 1,
            pixdim: [1., 2., 3., 4., 0., 0., 0., 0.],
            quatern_x: 5.,
            quatern_y: 6.,
            quatern_z: 7.,
            ..NiftiHeader::default()
        };
        let affine = h.affine().unwrap();
        assert_eq!(affine[(0, 0)], 2.0);
        assert_eq!(affine[(1, 1)], 3.0);
        assert_eq!(affine[(2, 2)], 4.0);
        assert_eq!(affine[(0, 3)], 5.0);
        assert_eq!(affine[(1, 3)], 6.0);
        assert_eq!(affine[(2, 3)], 7.0);
    }
}
