//! Grid resampling of volumes.
//!
//! A volume can be resampled onto a new voxel grid either by giving the
//! target grid's voxel-to-world affine ([`resample`]) or by giving just
//! a new shape ([`resample_to_shape`]), in which case a scaling
//! transform is derived from the shape ratio. Sampling walks the target
//! grid, maps each target voxel into source voxel coordinates, and
//! interpolates in double precision regardless of the element type.
//!
//! Coordinates falling outside the source grid are governed by an
//! explicit [`EdgePolicy`]; there is no silent default that could be
//! mistaken for data.
//!
//! [`resample`]: ./fn.resample.html
//! [`resample_to_shape`]: ./fn.resample_to_shape.html
//! [`EdgePolicy`]: ./enum.EdgePolicy.html

use crate::affine::{self, Affine4};
use crate::error::{ImageError, Result};
use crate::volume::data::VolumeData;
use crate::volume::element::DataElement;
use crate::volume::shape::Dim;
use num_traits::AsPrimitive;

/// Interpolation used when sampling the source volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Take the value of the nearest source voxel.
    Nearest,
    /// Multilinear interpolation over the surrounding source voxels.
    Linear,
}

/// What to do when a sampled coordinate falls outside the source grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgePolicy {
    /// Use the given constant value.
    Constant(f64),
    /// Clamp the coordinate to the nearest edge voxel.
    Clamp,
    /// Fail the whole resampling with an error.
    Error,
}

/// Grid alignment used when resampling by shape ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Align the centres of the corner voxels of both grids.
    Centre,
    /// Align the corners of the corner voxels, so the voxel grids
    /// coincide.
    Corner,
}

/// Options controlling how a volume is resampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampleOptions {
    /// Interpolation policy. Linear by default.
    pub interpolation: Interpolation,
    /// Edge policy. Clamping by default.
    pub edge: EdgePolicy,
    /// Grid alignment for shape-ratio resampling. Centre by default.
    pub origin: Origin,
}

impl Default for ResampleOptions {
    fn default() -> Self {
        ResampleOptions {
            interpolation: Interpolation::Linear,
            edge: EdgePolicy::Clamp,
            origin: Origin::Centre,
        }
    }
}

impl ResampleOptions {
    /// Options with the default policies.
    pub fn new() -> Self {
        ResampleOptions::default()
    }

    /// Choose the interpolation policy.
    pub fn interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Choose the edge policy.
    pub fn edge(mut self, edge: EdgePolicy) -> Self {
        self.edge = edge;
        self
    }

    /// Choose the grid alignment for shape-ratio resampling.
    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

enum VoxelMapping {
    /// Full 3-D affine from target voxels to source voxels.
    Affine(Affine4),
    /// Independent scale and offset per axis.
    AxisAligned { scales: Vec<f64>, offsets: Vec<f64> },
}

/// Resample a 3-D volume onto the grid described by `target_affine` and
/// `new_shape`.
///
/// The mapping from target voxels to source voxels goes through world
/// space: `inv(src_affine) * target_affine`. Returns the resampled data
/// together with its voxel-to-world transform (which is exactly
/// `target_affine`).
///
/// # Errors
///
/// - `ImageError::ShapeMismatch` if `new_shape` does not have the same
///   rank as the source, or the source is not 3-dimensional.
/// - `ImageError::SingularTransform` if `src_affine` is not
///   invertible.
/// - `ImageError::SampleOutOfBounds` under `EdgePolicy::Error`.
pub fn resample<T: DataElement>(
    src: &VolumeData<T>,
    src_affine: &Affine4,
    new_shape: &[u16],
    target_affine: &Affine4,
    options: &ResampleOptions,
) -> Result<(VolumeData<T>, Affine4)> {
    let rank = src.shape().rank();
    if new_shape.len() != rank {
        return Err(ImageError::ShapeMismatch(rank, new_shape.len()));
    }
    if rank != 3 {
        return Err(ImageError::ShapeMismatch(3, rank));
    }
    let vox = affine::concat(&affine::invert(src_affine)?, target_affine);
    let out = run(src, new_shape, &VoxelMapping::Affine(vox), options)?;
    Ok((out, *target_affine))
}

/// Resample a volume to a new shape, deriving a per-axis scaling from
/// the shape ratio and the origin policy.
///
/// Returns the resampled data together with its adjusted voxel-to-world
/// transform. When the shapes are equal the data is returned as a plain
/// copy.
///
/// # Errors
///
/// - `ImageError::ShapeMismatch` if `new_shape` does not have the same
///   rank as the source.
/// - `ImageError::SampleOutOfBounds` under `EdgePolicy::Error`.
pub fn resample_to_shape<T: DataElement>(
    src: &VolumeData<T>,
    src_affine: &Affine4,
    new_shape: &[u16],
    options: &ResampleOptions,
) -> Result<(VolumeData<T>, Affine4)> {
    let rank = src.shape().rank();
    if new_shape.len() != rank {
        return Err(ImageError::ShapeMismatch(rank, new_shape.len()));
    }
    if new_shape == src.shape().as_ref() {
        return Ok((src.clone(), *src_affine));
    }
    let scales: Vec<f64> = Iterator::zip(src.shape().as_ref().iter(), new_shape.iter())
        .map(|(old, new)| f64::from(*old) / f64::from(*new))
        .collect();
    let offsets: Vec<f64> = match options.origin {
        Origin::Centre => vec![0.0; rank],
        Origin::Corner => scales.iter().map(|r| (r - 1.0) / 2.0).collect(),
    };
    let out = run(
        src,
        new_shape,
        &VoxelMapping::AxisAligned {
            scales: scales.clone(),
            offsets: offsets.clone(),
        },
        options,
    )?;
    let adjusted = affine::concat(src_affine, &affine::scale_offset(&scales, &offsets));
    Ok((out, adjusted))
}

/// Resample a volume so that its spatial axes get the given voxel
/// dimensions. The new shape is `old_shape * old_pixdim / new_pixdim`,
/// rounded.
///
/// # Errors
///
/// Same as [`resample_to_shape`].
///
/// [`resample_to_shape`]: ./fn.resample_to_shape.html
pub fn resample_to_pixdims<T: DataElement>(
    src: &VolumeData<T>,
    src_affine: &Affine4,
    old_pixdims: &[f32],
    new_pixdims: &[f32],
    options: &ResampleOptions,
) -> Result<(VolumeData<T>, Affine4)> {
    let rank = src.shape().rank();
    if old_pixdims.len() != rank || new_pixdims.len() != rank {
        return Err(ImageError::ShapeMismatch(rank, old_pixdims.len().min(new_pixdims.len())));
    }
    let new_shape: Vec<u16> = src
        .shape()
        .as_ref()
        .iter()
        .enumerate()
        .map(|(d, old)| {
            let scaled =
                f64::from(*old) * f64::from(old_pixdims[d]) / f64::from(new_pixdims[d]);
            scaled.round().max(1.0) as u16
        })
        .collect();
    resample_to_shape(src, src_affine, &new_shape, options)
}

fn run<T: DataElement>(
    src: &VolumeData<T>,
    new_shape: &[u16],
    mapping: &VoxelMapping,
    options: &ResampleOptions,
) -> Result<VolumeData<T>> {
    let out_dim = Dim::from_slice(new_shape)?;
    let rank = out_dim.rank();
    let sizes: Vec<usize> = src.shape().as_ref().iter().map(|d| usize::from(*d)).collect();
    let strides = src.shape().strides();
    let values = src.values();

    let mut out = Vec::with_capacity(out_dim.element_count());
    let mut coords = vec![0f64; rank];
    for idx in out_dim.index_iter() {
        map_voxel(mapping, idx.as_ref(), &mut coords);
        let v = match options.interpolation {
            Interpolation::Nearest => sample_nearest(values, &sizes, &strides, &coords, options)?,
            Interpolation::Linear => sample_linear(values, &sizes, &strides, &coords, options)?,
        };
        out.push(T::from_f64(v));
    }
    VolumeData::from_elements(out_dim, out)
}

fn map_voxel(mapping: &VoxelMapping, idx: &[u16], coords: &mut [f64]) {
    match mapping {
        VoxelMapping::Affine(m) => {
            let p = affine::transform_point(
                m,
                [
                    f64::from(idx[0]),
                    f64::from(idx[1]),
                    f64::from(idx[2]),
                ],
            );
            coords.copy_from_slice(&p);
        }
        VoxelMapping::AxisAligned { scales, offsets } => {
            for (d, c) in coords.iter_mut().enumerate() {
                *c = scales[d] * f64::from(idx[d]) + offsets[d];
            }
        }
    }
}

fn sample_nearest<T: DataElement>(
    values: &[T],
    sizes: &[usize],
    strides: &[usize],
    coords: &[f64],
    options: &ResampleOptions,
) -> Result<f64> {
    let mut lin = 0usize;
    for (d, c) in coords.iter().enumerate() {
        let i = (c + 0.5).floor() as i64;
        let i = match clip(i, sizes[d], options.edge)? {
            Some(i) => i,
            None => {
                if let EdgePolicy::Constant(cval) = options.edge {
                    return Ok(cval);
                }
                unreachable!("clip only yields None for the constant policy");
            }
        };
        lin += i * strides[d];
    }
    Ok(values[lin].as_())
}

fn sample_linear<T: DataElement>(
    values: &[T],
    sizes: &[usize],
    strides: &[usize],
    coords: &[f64],
    options: &ResampleOptions,
) -> Result<f64> {
    let rank = coords.len();
    let base: Vec<i64> = coords.iter().map(|c| c.floor() as i64).collect();
    let frac: Vec<f64> = Iterator::zip(coords.iter(), base.iter())
        .map(|(c, b)| c - *b as f64)
        .collect();

    let mut acc = 0f64;
    'corner: for corner in 0..(1usize << rank) {
        let mut weight = 1f64;
        let mut lin = 0usize;
        let mut oob_constant = None;
        for d in 0..rank {
            let up = corner & (1 << d) != 0;
            weight *= if up { frac[d] } else { 1.0 - frac[d] };
            if weight == 0.0 {
                continue 'corner;
            }
            let i = base[d] + if up { 1 } else { 0 };
            match clip(i, sizes[d], options.edge)? {
                Some(i) => lin += i * strides[d],
                None => {
                    if let EdgePolicy::Constant(cval) = options.edge {
                        oob_constant = Some(cval);
                    }
                }
            }
        }
        acc += weight
            * match oob_constant {
                Some(cval) => cval,
                None => values[lin].as_(),
            };
    }
    Ok(acc)
}

/// Apply the edge policy to one index. `Ok(Some(i))` is an in-bounds
/// (possibly clamped) index; `Ok(None)` means the constant fill value
/// applies.
fn clip(i: i64, size: usize, edge: EdgePolicy) -> Result<Option<usize>> {
    if i >= 0 && (i as usize) < size {
        return Ok(Some(i as usize));
    }
    match edge {
        EdgePolicy::Constant(_) => Ok(None),
        EdgePolicy::Clamp => Ok(Some(i.max(0).min(size as i64 - 1) as usize)),
        EdgePolicy::Error => Err(ImageError::SampleOutOfBounds),
    }
}
