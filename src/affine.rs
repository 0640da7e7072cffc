//! Affine transform utilities.
//!
//! Volumes carry a 4x4 matrix mapping voxel indices to world
//! coordinates. This module provides the constructions needed to read
//! that matrix out of a header (quaternion form and scaling fallback),
//! to combine and invert transforms, and to map points between voxel
//! and world space. All arithmetic is done in double precision.

use crate::error::{ImageError, Result};
use nalgebra::{Matrix3, Matrix4, Point3, Quaternion, Vector3};

/// A 3x3 affine component (rotation, scaling, shearing).
pub type Affine3 = Matrix3<f64>;
/// A 4x4 homogeneous affine transform.
pub type Affine4 = Matrix4<f64>;

const QUATERNION_THRESHOLD: f64 = -std::f64::EPSILON * 3.0;

/// Separate a 4x4 affine into its 3x3 affine and translation components.
pub fn get_affine_and_translation(affine: &Affine4) -> (Affine3, Vector3<f64>) {
    let translation = Vector3::new(affine[12], affine[13], affine[14]);
    let affine = affine.fixed_view::<3, 3>(0, 0).into_owned();
    (affine, translation)
}

/// Get affine implied by given shape and zooms.
///
/// We get the translations from the center of the image (implied by
/// `shape`).
pub fn shape_zoom_affine(shape: &[u16], spacing: &[f32]) -> Affine4 {
    // Get translations from center of image
    let origin = Vector3::new(
        (f64::from(shape[0]) - 1.0) / 2.0,
        (f64::from(shape[1]) - 1.0) / 2.0,
        (f64::from(shape[2]) - 1.0) / 2.0,
    );
    let spacing = [
        -f64::from(spacing[0]),
        f64::from(spacing[1]),
        f64::from(spacing[2]),
    ];
    Affine4::new(
        spacing[0], 0.0, 0.0, -origin[0] * spacing[0],
        0.0, spacing[1], 0.0, -origin[1] * spacing[1],
        0.0, 0.0, spacing[2], -origin[2] * spacing[2],
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Compute unit quaternion from last 3 values.
///
/// If w, x, y, z are the values in the full quaternion, assumes w is
/// positive. w = 0.0 corresponds to a 180 degree rotation. The unit
/// quaternion specifies that `wxyz.dot(wxyz) == 1.0`.
///
/// `1.0 - (x*x + y*y + z*z)` can be near zero, which will lead to
/// numerical instability in sqrt; slightly negative estimates are
/// clamped to zero.
///
/// # Errors
///
/// - `ImageError::InvalidFormat` if `x*x + y*y + z*z` exceeds 1 by more
///   than the numerical tolerance, which no valid header produces.
pub fn fill_positive(xyz: Vector3<f64>) -> Result<Quaternion<f64>> {
    let w2 = 1.0 - xyz.dot(&xyz);
    let w = if w2 < 0.0 {
        if w2 < QUATERNION_THRESHOLD {
            return Err(ImageError::InvalidFormat);
        }
        0.0
    } else {
        w2.sqrt()
    };
    Ok(Quaternion::new(w, xyz.x, xyz.y, xyz.z))
}

/// Calculate rotation matrix corresponding to quaternion.
///
/// Rotation matrix applies to column vectors, and is applied to the
/// left of coordinate vectors. The algorithm here allows non-unit
/// quaternions.
///
/// Algorithm from https://en.wikipedia.org/wiki/Rotation_matrix#Quaternion
pub fn quaternion_to_affine(q: Quaternion<f64>) -> Affine3 {
    let nq = q.w * q.w + q.i * q.i + q.j * q.j + q.k * q.k;
    if nq < std::f64::EPSILON {
        return Affine3::identity();
    }
    let s = 2.0 / nq;
    let x = q.i * s;
    let y = q.j * s;
    let z = q.k * s;
    let wx = q.w * x;
    let wy = q.w * y;
    let wz = q.w * z;
    let xx = q.i * x;
    let xy = q.i * y;
    let xz = q.i * z;
    let yy = q.j * y;
    let yz = q.j * z;
    let zz = q.k * z;
    Affine3::new(
        1.0 - (yy + zz), xy - wz, xz + wy,
        xy + wz, 1.0 - (xx + zz), yz - wx,
        xz - wy, yz + wx, 1.0 - (xx + yy),
    )
}

/// Combine two affines into the transform applying `b` first, then `a`.
pub fn concat(a: &Affine4, b: &Affine4) -> Affine4 {
    a * b
}

/// Invert an affine.
///
/// # Errors
///
/// - `ImageError::SingularTransform` if the matrix has no inverse.
pub fn invert(x: &Affine4) -> Result<Affine4> {
    x.try_inverse().ok_or(ImageError::SingularTransform)
}

/// Build an affine from per-axis scales and offsets (no rotation).
///
/// Only the first three entries of each slice are used; missing entries
/// default to scale 1 and offset 0.
pub fn scale_offset(scales: &[f64], offsets: &[f64]) -> Affine4 {
    let mut out = Affine4::identity();
    for d in 0..3 {
        if let Some(s) = scales.get(d) {
            out[(d, d)] = *s;
        }
        if let Some(o) = offsets.get(d) {
            out[(d, 3)] = *o;
        }
    }
    out
}

/// Map a 3-D point through an affine.
pub fn transform_point(affine: &Affine4, point: [f64; 3]) -> [f64; 3] {
    let p = affine.transform_point(&Point3::new(point[0], point[1], point[2]));
    [p.x, p.y, p.z]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_get_affine_and_translation() {
        let affine = Affine4::new(
            -3.0, 0.0, 0.0, 117.86,
            0.0, 1.97, -0.36, -35.72,
            0.0, 0.32, 2.17, -7.25,
            0.0, 0.0, 0.0, 1.0,
        );
        let (rzs, translation) = get_affine_and_translation(&affine);
        assert_eq!(
            rzs,
            Affine3::new(
                -3.0, 0.0, 0.0,
                0.0, 1.97, -0.36,
                0.0, 0.32, 2.17,
            )
        );
        assert_eq!(translation, Vector3::new(117.86, -35.72, -7.25));
    }

    #[test]
    fn test_shape_zoom_affine() {
        let affine = shape_zoom_affine(&[3, 5, 7], &[3.0, 2.0, 1.0]);
        let expected = Affine4::new(
            -3.0, 0.0, 0.0, 3.0,
            0.0, 2.0, 0.0, -4.0,
            0.0, 0.0, 1.0, -3.0,
            0.0, 0.0, 0.0, 1.0,
        );
        assert_eq!(affine, expected);

        let affine = shape_zoom_affine(&[256, 256, 54], &[0.9375, 0.9375, 3.0]);
        let expected = Affine4::new(
            -0.9375, 0.0, 0.0, 119.53125,
            0.0, 0.9375, 0.0, -119.53125,
            0.0, 0.0, 3.0, -79.5,
            0.0, 0.0, 0.0, 1.0,
        );
        assert_eq!(affine, expected);
    }

    #[test]
    fn test_fill_positive() {
        let q = fill_positive(Vector3::new(0.0, 0.0, 0.0)).unwrap();
        assert_eq!(q, Quaternion::new(1.0, 0.0, 0.0, 0.0));

        let q = fill_positive(Vector3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(q, Quaternion::new(0.0, 1.0, 0.0, 0.0));
        assert_relative_eq!(q.dot(&q), 1.0);

        assert!(fill_positive(Vector3::new(1.0, 1.0, 0.0)).is_err());
    }

    #[test]
    fn test_quaternion_to_affine() {
        // identity
        let affine = quaternion_to_affine(Quaternion::new(1.0, 0.0, 0.0, 0.0));
        assert_eq!(affine, Affine3::identity());

        // 180 degree rotation around the x axis
        let affine = quaternion_to_affine(Quaternion::new(0.0, 1.0, 0.0, 0.0));
        assert_relative_eq!(
            affine,
            Affine3::new(
                1.0, 0.0, 0.0,
                0.0, -1.0, 0.0,
                0.0, 0.0, -1.0,
            )
        );
    }

    #[test]
    fn test_invert_and_concat() {
        let affine = scale_offset(&[2.0, 2.0, 2.0], &[10.0, -4.0, 0.5]);
        let inverse = invert(&affine).unwrap();
        assert_relative_eq!(concat(&inverse, &affine), Affine4::identity());

        let p = transform_point(&affine, [1.0, 2.0, 3.0]);
        assert_eq!(p, [12.0, 0.0, 6.5]);
        let q = transform_point(&inverse, p);
        assert_relative_eq!(q[0], 1.0);
        assert_relative_eq!(q[1], 2.0);
        assert_relative_eq!(q[2], 3.0);

        let singular = Affine4::zeros();
        assert!(invert(&singular).is_err());
    }
}
