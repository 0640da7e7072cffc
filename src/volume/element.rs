//! This module defines the data element API, which enables volume API
//! implementations to read, write and convert voxel values between the
//! on-disk data type and the element type requested by the caller.

use crate::error::Result;
use crate::typedef::NiftiType;
use byteordered::{ByteOrdered, Endian, Endianness};
use num_traits::{AsPrimitive, Zero};
use std::fmt::Debug;
use std::io::{Read, Write};

/// Trait type for characterizing a voxel data element, implemented for
/// the primitive numeric types used by the crate to represent voxel
/// values.
pub trait DataElement:
    'static + Sized + Copy + PartialEq + Debug + Send + Sync + Zero + AsPrimitive<f64>
{
    /// The `datatype` code mapped to this type.
    const DATA_TYPE: NiftiType;

    /// Convert back from double precision. Integer targets round to
    /// nearest and saturate; float targets keep `as` cast semantics.
    fn from_f64(value: f64) -> Self;

    /// Read a single element from the given byte source.
    fn from_raw<S: Read>(src: S, endianness: Endianness) -> Result<Self>;

    /// Write a single element to the given byte sink.
    fn to_raw<W: Write>(self, dst: W, endianness: Endianness) -> Result<()>;
}

/// Apply the standard slope/intercept scaling to a raw value. A slope
/// of zero means no scaling was defined and leaves the value untouched.
pub fn linear_transform(value: f64, slope: f32, intercept: f32) -> f64 {
    if slope == 0. {
        return value;
    }
    value * f64::from(slope) + f64::from(intercept)
}

/// Decode a run of raw on-disk values of type `U` into elements of
/// type `T`, scaling each value on the way.
pub fn convert_raw<U, T, S>(
    mut src: S,
    endianness: Endianness,
    slope: f32,
    intercept: f32,
    out: &mut [T],
) -> Result<()>
where
    U: DataElement,
    T: DataElement,
    S: Read,
{
    for slot in out.iter_mut() {
        let raw = U::from_raw(&mut src, endianness)?;
        *slot = T::from_f64(linear_transform(raw.as_(), slope, intercept));
    }
    Ok(())
}

/// Decode a run of raw bytes of the given on-disk data type into
/// elements of type `T`.
pub fn decode_run<T: DataElement>(
    bytes: &[u8],
    datatype: NiftiType,
    endianness: Endianness,
    slope: f32,
    intercept: f32,
    out: &mut [T],
) -> Result<()> {
    debug_assert_eq!(bytes.len(), out.len() * datatype.size_of());
    match datatype {
        NiftiType::Uint8 => convert_raw::<u8, _, _>(bytes, endianness, slope, intercept, out),
        NiftiType::Int8 => convert_raw::<i8, _, _>(bytes, endianness, slope, intercept, out),
        NiftiType::Uint16 => convert_raw::<u16, _, _>(bytes, endianness, slope, intercept, out),
        NiftiType::Int16 => convert_raw::<i16, _, _>(bytes, endianness, slope, intercept, out),
        NiftiType::Uint32 => convert_raw::<u32, _, _>(bytes, endianness, slope, intercept, out),
        NiftiType::Int32 => convert_raw::<i32, _, _>(bytes, endianness, slope, intercept, out),
        NiftiType::Uint64 => convert_raw::<u64, _, _>(bytes, endianness, slope, intercept, out),
        NiftiType::Int64 => convert_raw::<i64, _, _>(bytes, endianness, slope, intercept, out),
        NiftiType::Float32 => convert_raw::<f32, _, _>(bytes, endianness, slope, intercept, out),
        NiftiType::Float64 => convert_raw::<f64, _, _>(bytes, endianness, slope, intercept, out),
    }
}

impl DataElement for u8 {
    const DATA_TYPE: NiftiType = NiftiType::Uint8;
    fn from_f64(value: f64) -> Self {
        value.round() as u8
    }
    fn from_raw<S: Read>(src: S, _: Endianness) -> Result<Self> {
        Ok(ByteOrdered::native(src).read_u8()?)
    }
    fn to_raw<W: Write>(self, dst: W, _: Endianness) -> Result<()> {
        Ok(ByteOrdered::native(dst).write_u8(self)?)
    }
}

impl DataElement for i8 {
    const DATA_TYPE: NiftiType = NiftiType::Int8;
    fn from_f64(value: f64) -> Self {
        value.round() as i8
    }
    fn from_raw<S: Read>(src: S, _: Endianness) -> Result<Self> {
        Ok(ByteOrdered::native(src).read_i8()?)
    }
    fn to_raw<W: Write>(self, dst: W, _: Endianness) -> Result<()> {
        Ok(ByteOrdered::native(dst).write_i8(self)?)
    }
}

impl DataElement for u16 {
    const DATA_TYPE: NiftiType = NiftiType::Uint16;
    fn from_f64(value: f64) -> Self {
        value.round() as u16
    }
    fn from_raw<S: Read>(mut src: S, e: Endianness) -> Result<Self> {
        Ok(e.read_u16(&mut src)?)
    }
    fn to_raw<W: Write>(self, mut dst: W, e: Endianness) -> Result<()> {
        Ok(e.write_u16(&mut dst, self)?)
    }
}

impl DataElement for i16 {
    const DATA_TYPE: NiftiType = NiftiType::Int16;
    fn from_f64(value: f64) -> Self {
        value.round() as i16
    }
    fn from_raw<S: Read>(mut src: S, e: Endianness) -> Result<Self> {
        Ok(e.read_i16(&mut src)?)
    }
    fn to_raw<W: Write>(self, mut dst: W, e: Endianness) -> Result<()> {
        Ok(e.write_i16(&mut dst, self)?)
    }
}

impl DataElement for u32 {
    const DATA_TYPE: NiftiType = NiftiType::Uint32;
    fn from_f64(value: f64) -> Self {
        value.round() as u32
    }
    fn from_raw<S: Read>(mut src: S, e: Endianness) -> Result<Self> {
        Ok(e.read_u32(&mut src)?)
    }
    fn to_raw<W: Write>(self, mut dst: W, e: Endianness) -> Result<()> {
        Ok(e.write_u32(&mut dst, self)?)
    }
}

impl DataElement for i32 {
    const DATA_TYPE: NiftiType = NiftiType::Int32;
    fn from_f64(value: f64) -> Self {
        value.round() as i32
    }
    fn from_raw<S: Read>(mut src: S, e: Endianness) -> Result<Self> {
        Ok(e.read_i32(&mut src)?)
    }
    fn to_raw<W: Write>(self, mut dst: W, e: Endianness) -> Result<()> {
        Ok(e.write_i32(&mut dst, self)?)
    }
}

impl DataElement for u64 {
    const DATA_TYPE: NiftiType = NiftiType::Uint64;
    fn from_f64(value: f64) -> Self {
        value.round() as u64
    }
    fn from_raw<S: Read>(mut src: S, e: Endianness) -> Result<Self> {
        Ok(e.read_u64(&mut src)?)
    }
    fn to_raw<W: Write>(self, mut dst: W, e: Endianness) -> Result<()> {
        Ok(e.write_u64(&mut dst, self)?)
    }
}

impl DataElement for i64 {
    const DATA_TYPE: NiftiType = NiftiType::Int64;
    fn from_f64(value: f64) -> Self {
        value.round() as i64
    }
    fn from_raw<S: Read>(mut src: S, e: Endianness) -> Result<Self> {
        Ok(e.read_i64(&mut src)?)
    }
    fn to_raw<W: Write>(self, mut dst: W, e: Endianness) -> Result<()> {
        Ok(e.write_i64(&mut dst, self)?)
    }
}

impl DataElement for f32 {
    const DATA_TYPE: NiftiType = NiftiType::Float32;
    fn from_f64(value: f64) -> Self {
        value as f32
    }
    fn from_raw<S: Read>(mut src: S, e: Endianness) -> Result<Self> {
        Ok(e.read_f32(&mut src)?)
    }
    fn to_raw<W: Write>(self, mut dst: W, e: Endianness) -> Result<()> {
        Ok(e.write_f32(&mut dst, self)?)
    }
}

impl DataElement for f64 {
    const DATA_TYPE: NiftiType = NiftiType::Float64;
    fn from_f64(value: f64) -> Self {
        value
    }
    fn from_raw<S: Read>(mut src: S, e: Endianness) -> Result<Self> {
        Ok(e.read_f64(&mut src)?)
    }
    fn to_raw<W: Write>(self, mut dst: W, e: Endianness) -> Result<()> {
        Ok(e.write_f64(&mut dst, self)?)
    }
}
