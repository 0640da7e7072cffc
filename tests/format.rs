//! Header parsing: byte orders, versions, affines, failure modes.

use byteordered::{Endian, Endianness};
use imagewrap::volume::shape::Dim;
use imagewrap::{
    Image, ImageError, NiftiHeader, NiftiType, VolumeCache, VolumeData, write_volume,
};
use pretty_assertions::assert_eq;
use std::io::Cursor;
use tempfile::TempDir;

/// Serialize a minimal single-file NIfTI-1 header in the given byte
/// order.
fn nifti1_bytes(e: Endianness, dim: [u16; 8], datatype: i16) -> Vec<u8> {
    nifti1_bytes_with(e, dim, datatype, *b"n+1\0", 352.)
}

/// Serialize a minimal NIfTI-1 header with an explicit magic code and
/// voxel offset.
fn nifti1_bytes_with(
    e: Endianness,
    dim: [u16; 8],
    datatype: i16,
    magic: [u8; 4],
    vox_offset: f32,
) -> Vec<u8> {
    let mut w = Vec::new();
    e.write_i32(&mut w, 348).unwrap();
    w.extend_from_slice(&[0u8; 35]);
    w.push(0); // dim_info
    for d in &dim {
        e.write_u16(&mut w, *d).unwrap();
    }
    for _ in 0..3 {
        e.write_f32(&mut w, 0.).unwrap(); // intent parameters
    }
    e.write_i16(&mut w, 0).unwrap(); // intent_code
    e.write_i16(&mut w, datatype).unwrap();
    e.write_i16(&mut w, 32).unwrap(); // bitpix
    e.write_i16(&mut w, 0).unwrap(); // slice_start
    for _ in 0..8 {
        e.write_f32(&mut w, 1.).unwrap(); // pixdim
    }
    e.write_f32(&mut w, vox_offset).unwrap();
    e.write_f32(&mut w, 0.).unwrap(); // scl_slope
    e.write_f32(&mut w, 0.).unwrap(); // scl_inter
    e.write_i16(&mut w, 0).unwrap(); // slice_end
    w.push(0); // slice_code
    w.push(0); // xyzt_units
    for _ in 0..4 {
        e.write_f32(&mut w, 0.).unwrap(); // cal_max .. toffset
    }
    w.extend_from_slice(&[0u8; 8]); // glmax, glmin
    w.extend_from_slice(&[0u8; 80]); // descrip
    w.extend_from_slice(&[0u8; 24]); // aux_file
    e.write_i16(&mut w, 0).unwrap(); // qform_code
    e.write_i16(&mut w, 0).unwrap(); // sform_code
    for _ in 0..6 {
        e.write_f32(&mut w, 0.).unwrap(); // quaternion fields
    }
    for _ in 0..12 {
        e.write_f32(&mut w, 0.).unwrap(); // srow fields
    }
    w.extend_from_slice(&[0u8; 16]); // intent_name
    w.extend_from_slice(&magic);
    w.extend_from_slice(&[0u8; 4]); // extender
    assert_eq!(w.len(), 352);
    w
}

/// Serialize a minimal single-file NIfTI-2 header in the given byte
/// order, with the volume starting at offset 544.
fn nifti2_bytes(e: Endianness, dim: [i64; 8], datatype: i16) -> Vec<u8> {
    let mut w = Vec::new();
    e.write_i32(&mut w, 540).unwrap();
    w.extend_from_slice(b"n+2\0\r\n\x1a\n");
    e.write_i16(&mut w, datatype).unwrap();
    e.write_i16(&mut w, 32).unwrap(); // bitpix
    for d in &dim {
        e.write_i64(&mut w, *d).unwrap();
    }
    for _ in 0..3 {
        e.write_f64(&mut w, 0.).unwrap(); // intent parameters
    }
    for _ in 0..8 {
        e.write_f64(&mut w, 1.).unwrap(); // pixdim
    }
    e.write_i64(&mut w, 544).unwrap(); // vox_offset
    e.write_f64(&mut w, 2.).unwrap(); // scl_slope
    e.write_f64(&mut w, 10.).unwrap(); // scl_inter
    for _ in 0..4 {
        e.write_f64(&mut w, 0.).unwrap(); // cal_max .. toffset
    }
    e.write_i64(&mut w, 0).unwrap(); // slice_start
    e.write_i64(&mut w, 0).unwrap(); // slice_end
    w.extend_from_slice(&[0u8; 80]); // descrip
    w.extend_from_slice(&[0u8; 24]); // aux_file
    e.write_i32(&mut w, 0).unwrap(); // qform_code
    e.write_i32(&mut w, 0).unwrap(); // sform_code
    for _ in 0..6 {
        e.write_f64(&mut w, 0.).unwrap(); // quaternion fields
    }
    for _ in 0..12 {
        e.write_f64(&mut w, 0.).unwrap(); // srow fields
    }
    e.write_i32(&mut w, 0).unwrap(); // slice_code
    e.write_i32(&mut w, 0).unwrap(); // xyzt_units
    e.write_i32(&mut w, 0).unwrap(); // intent_code
    w.extend_from_slice(&[0u8; 16]); // intent_name
    w.push(0); // dim_info
    w.extend_from_slice(&[0u8; 15]);
    assert_eq!(w.len(), 540);
    w.extend_from_slice(&[0u8; 4]); // pad up to the voxel offset
    w
}

#[test]
fn parses_both_byte_orders() {
    let dim = [3u16, 6, 5, 4, 0, 0, 0, 0];
    for e in [Endianness::Little, Endianness::Big] {
        let bytes = nifti1_bytes(e, dim, NiftiType::Float32 as i16);
        let header = NiftiHeader::from_stream(&bytes[..]).unwrap();
        assert_eq!(header.endianness, e);
        assert_eq!(header.dim, dim);
        assert_eq!(header.data_type().unwrap(), NiftiType::Float32);
        assert_eq!(header.vox_offset, 352.);
    }
}

#[test]
fn parses_nifti2_and_serves_its_volume() {
    let dim = [2i64, 3, 2, 0, 0, 0, 0, 0];
    let mut bytes = nifti2_bytes(Endianness::Little, dim, NiftiType::Float32 as i16);
    for v in 0..6 {
        Endianness::Little
            .write_f32(&mut bytes, v as f32)
            .unwrap();
    }

    let header = NiftiHeader::from_stream(&bytes[..]).unwrap();
    assert_eq!(header.sizeof_hdr, 540);
    assert_eq!(header.dim, [2, 3, 2, 0, 0, 0, 0, 0]);
    assert_eq!(header.vox_offset, 544.);
    assert_eq!(header.scl_slope, 2.);
    assert_eq!(header.scl_inter, 10.);

    // slope 2, intercept 10 applies on decode
    let cache: VolumeCache<f32, _> = VolumeCache::new(Cursor::new(bytes), &header).unwrap();
    let data = cache.into_data().unwrap();
    assert_eq!(data.values(), &[10., 12., 14., 16., 18., 20.]);
}

#[test]
fn rejects_oversized_nifti2_dims() {
    let dim = [3i64, 6, 70_000, 4, 0, 0, 0, 0];
    let bytes = nifti2_bytes(Endianness::Little, dim, NiftiType::Float32 as i16);
    assert!(NiftiHeader::from_stream(&bytes[..]).is_err());
}

#[test]
fn rejects_bad_magic_and_garbage() {
    let dim = [3u16, 6, 5, 4, 0, 0, 0, 0];
    let mut bytes = nifti1_bytes(Endianness::Little, dim, NiftiType::Float32 as i16);
    bytes[344..348].copy_from_slice(b"nope");
    assert!(NiftiHeader::from_stream(&bytes[..]).is_err());

    assert!(NiftiHeader::from_stream(&[0u8; 348][..]).is_err());
    assert!(NiftiHeader::from_stream(&[1u8, 2, 3][..]).is_err());
}

#[test]
fn truncated_header_is_an_error() {
    let dim = [3u16, 6, 5, 4, 0, 0, 0, 0];
    let bytes = nifti1_bytes(Endianness::Little, dim, NiftiType::Float32 as i16);
    assert!(NiftiHeader::from_stream(&bytes[..200]).is_err());
}

#[test]
fn header_data_pairs_resolve_and_read() {
    let dir = TempDir::new().unwrap();
    let dim = [2u16, 2, 3, 0, 0, 0, 0, 0];
    let hdr_bytes = nifti1_bytes_with(
        Endianness::Little,
        dim,
        NiftiType::Float32 as i16,
        *b"ni1\0",
        0.,
    );
    std::fs::write(dir.path().join("pair.hdr"), &hdr_bytes).unwrap();

    let mut img_bytes = Vec::new();
    for v in 0..6 {
        Endianness::Little
            .write_f32(&mut img_bytes, v as f32)
            .unwrap();
    }
    std::fs::write(dir.path().join("pair.img"), &img_bytes).unwrap();

    // a bare prefix resolves to the pair and reads its data file
    let image: Image<f32> = Image::open(dir.path().join("pair")).unwrap();
    assert_eq!(image.dim(), &[2, 3]);
    let data = image.into_data().unwrap();
    assert_eq!(data.values(), &[0., 1., 2., 3., 4., 5.]);

    // a header without its data file is an error
    std::fs::write(dir.path().join("solo.hdr"), &hdr_bytes).unwrap();
    let err = Image::<f32>::open(dir.path().join("solo.hdr"))
        .err()
        .unwrap();
    assert!(matches!(err, ImageError::MissingVolumeFile(_)));
}

#[test]
fn written_sform_survives_a_round_trip() {
    let dir = TempDir::new().unwrap();
    let dim = Dim::from_slice(&[2, 2, 2]).unwrap();
    let vol = VolumeData::from_elements(dim, vec![1.0f32; 8]).unwrap();
    let reference = NiftiHeader {
        sform_code: 1,
        srow_x: [1.5, 0., 0., -9.],
        srow_y: [0., 1.5, 0., 12.],
        srow_z: [0., 0., 4.5, 0.],
        ..NiftiHeader::default()
    };
    let path = dir.path().join("xform.nii");
    write_volume(&path, &vol, Some(&reference)).unwrap();

    let header = NiftiHeader::from_file(&path).unwrap();
    assert_eq!(header.sform_code, 1);
    let affine = header.affine().unwrap();
    assert_eq!(affine[(0, 0)], 1.5);
    assert_eq!(affine[(0, 3)], -9.0);
    assert_eq!(affine[(2, 2)], 4.5);
}
