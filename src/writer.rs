//! Utility functions to write volumes back to NIfTI files.

use crate::error::Result;
use crate::header::{NiftiHeader, MAGIC_CODE_NIP1};
use crate::paths::is_gz_file;
use crate::volume::data::VolumeData;
use crate::volume::element::DataElement;
use byteordered::{Endian, Endianness};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::mem;
use std::path::Path;

const E: Endianness = Endianness::Little;

/// Write a volume to a ".nii" or ".nii.gz" file.
///
/// If a `reference` header is given, its descriptive fields are kept
/// and each voxel intensity is divided back through its slope and
/// intercept before encoding. The `dim`, `datatype` and `bitpix`
/// fields are always derived from `data`, and the output is always a
/// single-file little-endian NIfTI-1 image.
pub fn write_volume<P, T>(
    path: P,
    data: &VolumeData<T>,
    reference: Option<&NiftiHeader>,
) -> Result<()>
where
    P: AsRef<Path>,
    T: DataElement,
{
    let mut dim = [0u16; 8];
    dim[0] = data.shape().rank() as u16;
    for (i, s) in data.shape().as_ref().iter().enumerate() {
        dim[i + 1] = *s;
    }

    let reference = match reference {
        Some(r) => r.clone(),
        None => NiftiHeader::default(),
    };
    let header = NiftiHeader {
        sizeof_hdr: 348,
        dim,
        datatype: T::DATA_TYPE as i16,
        bitpix: (mem::size_of::<T>() * 8) as i16,
        vox_offset: 352.,
        magic: *MAGIC_CODE_NIP1,
        endianness: E,
        ..reference
    };

    let writer = BufWriter::new(File::create(&path)?);
    if is_gz_file(&path) {
        let mut e = GzEncoder::new(writer, Compression::default());
        write_header(&mut e, &header)?;
        write_data(&mut e, &header, data)?;
        let _ = e.finish()?;
    } else {
        let mut writer = writer;
        write_header(&mut writer, &header)?;
        write_data(&mut writer, &header, data)?;
    }
    Ok(())
}

fn write_header<W: Write>(mut w: W, header: &NiftiHeader) -> Result<()> {
    E.write_i32(&mut w, header.sizeof_hdr)?;
    // data_type, db_name, extents, session_error and regular are unused
    w.write_all(&[0u8; 35])?;
    w.write_all(&[header.dim_info])?;
    for s in &header.dim {
        E.write_u16(&mut w, *s)?;
    }
    E.write_f32(&mut w, header.intent_p1)?;
    E.write_f32(&mut w, header.intent_p2)?;
    E.write_f32(&mut w, header.intent_p3)?;
    E.write_i16(&mut w, header.intent_code)?;
    E.write_i16(&mut w, header.datatype)?;
    E.write_i16(&mut w, header.bitpix)?;
    E.write_i16(&mut w, header.slice_start)?;
    for f in &header.pixdim {
        E.write_f32(&mut w, *f)?;
    }
    E.write_f32(&mut w, header.vox_offset)?;
    E.write_f32(&mut w, header.scl_slope)?;
    E.write_f32(&mut w, header.scl_inter)?;
    E.write_i16(&mut w, header.slice_end)?;
    w.write_all(&[header.slice_code, header.xyzt_units])?;
    E.write_f32(&mut w, header.cal_max)?;
    E.write_f32(&mut w, header.cal_min)?;
    E.write_f32(&mut w, header.slice_duration)?;
    E.write_f32(&mut w, header.toffset)?;
    // glmax and glmin are unused
    w.write_all(&[0u8; 8])?;

    // the description field is exactly 80 bytes on disk
    let mut descrip = [0u8; 80];
    let n = header.descrip.len().min(80);
    descrip[..n].copy_from_slice(&header.descrip[..n]);
    w.write_all(&descrip)?;
    w.write_all(&header.aux_file)?;
    E.write_i16(&mut w, header.qform_code)?;
    E.write_i16(&mut w, header.sform_code)?;
    for f in &[
        header.quatern_b,
        header.quatern_c,
        header.quatern_d,
        header.quatern_x,
        header.quatern_y,
        header.quatern_z,
    ] {
        E.write_f32(&mut w, *f)?;
    }
    for f in header
        .srow_x
        .iter()
        .chain(&header.srow_y)
        .chain(&header.srow_z)
    {
        E.write_f32(&mut w, *f)?;
    }
    w.write_all(&header.intent_name)?;
    w.write_all(&header.magic)?;

    // empty extender after the header
    w.write_all(&[0u8; 4])?;
    Ok(())
}

fn write_data<W, T>(mut w: W, header: &NiftiHeader, data: &VolumeData<T>) -> Result<()>
where
    W: Write,
    T: DataElement,
{
    // invert the scaling so that decoding with this header restores
    // the original intensities
    let slope = if header.scl_slope == 0. {
        1.0
    } else {
        f64::from(header.scl_slope)
    };
    let inter = f64::from(header.scl_inter);
    if slope != 1.0 || inter != 0.0 {
        for v in data.values() {
            let raw = T::from_f64((v.as_() - inter) / slope);
            raw.to_raw(&mut w, E)?;
        }
    } else {
        for v in data.values() {
            v.to_raw(&mut w, E)?;
        }
    }
    Ok(())
}
