//! Owned dense volumes and borrowed sub-views.
//!
//! [`VolumeData`] is the crate's strided-array building block: a flat
//! buffer in column-major (volume file) order plus a validated shape.
//! Sub-windows are taken explicitly as [`VolumeView`]s, which keep the
//! parent's strides and an offset instead of copying.
//!
//! [`VolumeData`]: ./struct.VolumeData.html
//! [`VolumeView`]: ./struct.VolumeView.html

use super::element::DataElement;
use super::shape::Dim;
use super::VoxelVolume;
use crate::coverage::Region;
use crate::error::{ImageError, Result};
use crate::range::finite_range;

#[cfg(feature = "ndarray_volumes")]
use ndarray::{Array, IxDyn, ShapeBuilder};

/// A dense volume owned in memory, stored in column-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeData<T> {
    dim: Dim,
    data: Vec<T>,
}

impl<T: DataElement> VolumeData<T> {
    /// Build a volume from a shape and its elements in column-major
    /// order.
    ///
    /// # Errors
    ///
    /// - `ImageError::ShapeMismatch` if the element count does not
    ///   match the shape.
    pub fn from_elements(dim: Dim, data: Vec<T>) -> Result<Self> {
        if data.len() != dim.element_count() {
            return Err(ImageError::ShapeMismatch(dim.element_count(), data.len()));
        }
        Ok(VolumeData { dim, data })
    }

    /// Build a volume with every element set to `value`.
    pub fn filled(dim: Dim, value: T) -> Self {
        VolumeData {
            dim,
            data: vec![value; dim.element_count()],
        }
    }

    /// The shape of this volume.
    pub fn shape(&self) -> &Dim {
        &self.dim
    }

    /// The elements in column-major order.
    pub fn values(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the elements in column-major order.
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the volume into its elements.
    pub fn into_values(self) -> Vec<T> {
        self.data
    }

    /// Fetch a single element.
    pub fn get(&self, coords: &[u16]) -> Result<T> {
        Ok(self.data[self.dim.linear_index(coords)?])
    }

    /// The finite (min, max) over all elements, if any value is finite.
    pub fn range(&self) -> Option<(f64, f64)> {
        finite_range(&self.data)
    }

    /// Borrow a rectangular window of this volume.
    ///
    /// # Errors
    ///
    /// - `ImageError::RegionOutOfBounds` if the region exceeds this
    ///   volume's shape.
    /// - `ImageError::InconsistentDim` if the region is empty.
    pub fn view(&self, region: &Region) -> Result<VolumeView<T>> {
        if region.rank() != self.dim.rank() || !Region::full(&self.dim).contains(region) {
            return Err(ImageError::RegionOutOfBounds(
                *region,
                self.dim.as_ref().to_vec(),
            ));
        }
        let shape = Dim::from_slice(
            &Iterator::zip(region.lo().iter(), region.hi().iter())
                .map(|(lo, hi)| hi - lo)
                .collect::<Vec<_>>(),
        )?;
        Ok(VolumeView {
            data: &self.data,
            parent_dim: self.dim,
            region: *region,
            shape,
        })
    }

    /// Consume the volume into an `ndarray` with the same (column-major)
    /// memory layout.
    #[cfg(feature = "ndarray_volumes")]
    pub fn into_ndarray(self) -> Array<T, IxDyn> {
        let dim: Vec<_> = self.dim.as_ref().iter().map(|d| usize::from(*d)).collect();
        Array::from_shape_vec(IxDyn(&dim).f(), self.data)
            .expect("shape and element count were validated together")
    }
}

impl<T: DataElement> VoxelVolume for VolumeData<T> {
    fn dim(&self) -> &[u16] {
        self.dim.as_ref()
    }

    fn get_f64(&self, coords: &[u16]) -> Result<f64> {
        self.get(coords).map(|v| v.as_())
    }
}

/// A borrowed rectangular window of a [`VolumeData`].
///
/// The view keeps the parent's buffer and strides together with the
/// window bounds; no elements are copied until requested.
///
/// [`VolumeData`]: ./struct.VolumeData.html
#[derive(Debug, Clone, Copy)]
pub struct VolumeView<'a, T> {
    data: &'a [T],
    parent_dim: Dim,
    region: Region,
    shape: Dim,
}

impl<'a, T: DataElement> VolumeView<'a, T> {
    /// The shape of the window.
    pub fn shape(&self) -> &Dim {
        &self.shape
    }

    /// The window bounds in the parent volume's index space.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Fetch a single element by window-relative coordinates.
    pub fn get(&self, coords: &[u16]) -> Result<T> {
        let _ = self.shape.linear_index(coords)?;
        let absolute: Vec<u16> = Iterator::zip(coords.iter(), self.region.lo().iter())
            .map(|(c, lo)| c + lo)
            .collect();
        Ok(self.data[self.parent_dim.linear_index(&absolute)?])
    }

    /// Iterate the window's elements in column-major order.
    pub fn iter(&self) -> impl Iterator<Item = T> + 'a {
        let data = self.data;
        let parent_dim = self.parent_dim;
        let region = self.region;
        let run = region.run_len();
        region.run_starts().flat_map(move |start| {
            let lin = parent_dim
                .linear_index(start.as_ref())
                .expect("run starts lie inside the parent volume");
            data[lin..lin + run].iter().copied()
        })
    }

    /// Copy the window's elements out in column-major order.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Copy the window into an owned volume.
    pub fn to_data(&self) -> VolumeData<T> {
        VolumeData {
            dim: self.shape,
            data: self.to_vec(),
        }
    }
}

impl<'a, T: DataElement> VoxelVolume for VolumeView<'a, T> {
    fn dim(&self) -> &[u16] {
        self.shape.as_ref()
    }

    fn get_f64(&self, coords: &[u16]) -> Result<f64> {
        self.get(coords).map(|v| v.as_())
    }
}

#[cfg(test)]
mod tests {
    use super::VolumeData;
    use crate::coverage::Region;
    use crate::volume::shape::Dim;
    use crate::volume::VoxelVolume;

    fn sample_volume() -> VolumeData<f32> {
        // v[i, j, k] = i + 10 j + 100 k over a 3x3x3 grid
        let dim = Dim::from_slice(&[3, 3, 3]).unwrap();
        let mut data = Vec::with_capacity(27);
        for k in 0..3 {
            for j in 0..3 {
                for i in 0..3 {
                    data.push((i + 10 * j + 100 * k) as f32);
                }
            }
        }
        VolumeData::from_elements(dim, data).unwrap()
    }

    #[test]
    fn element_access() {
        let vol = sample_volume();
        assert_eq!(vol.get(&[0, 0, 0]).unwrap(), 0.);
        assert_eq!(vol.get(&[2, 1, 0]).unwrap(), 12.);
        assert_eq!(vol.get(&[1, 2, 2]).unwrap(), 221.);
        assert!(vol.get(&[3, 0, 0]).is_err());
        assert_eq!(vol.get_f64(&[2, 0, 1]).unwrap(), 102.);
    }

    #[test]
    fn from_elements_validates_count() {
        let dim = Dim::from_slice(&[2, 2]).unwrap();
        assert!(VolumeData::from_elements(dim, vec![0.0f32; 3]).is_err());
    }

    #[test]
    fn view_window() {
        let vol = sample_volume();
        let region = Region::new(&[1, 1, 0], &[3, 3, 2]).unwrap();
        let view = vol.view(&region).unwrap();
        assert_eq!(view.shape().as_ref(), &[2, 2, 2]);
        assert_eq!(view.get(&[0, 0, 0]).unwrap(), 11.);
        assert_eq!(view.get(&[1, 1, 1]).unwrap(), 122.);
        assert!(view.get(&[2, 0, 0]).is_err());

        assert_eq!(
            view.to_vec(),
            vec![11., 12., 21., 22., 111., 112., 121., 122.]
        );
        let owned = view.to_data();
        assert_eq!(owned.get(&[1, 0, 1]).unwrap(), 112.);
    }

    #[test]
    fn view_rejects_out_of_bounds() {
        let vol = sample_volume();
        let region = Region::new(&[0, 0, 0], &[4, 3, 3]).unwrap();
        assert!(vol.view(&region).is_err());
        let region = Region::new(&[0, 0], &[2, 2]).unwrap();
        assert!(vol.view(&region).is_err());
    }

    #[test]
    fn finite_range_of_data() {
        let dim = Dim::from_slice(&[4]).unwrap();
        let vol = VolumeData::from_elements(dim, vec![f32::NAN, 3.0, -1.0, f32::INFINITY]).unwrap();
        assert_eq!(vol.range(), Some((-1.0, 3.0)));
    }

    #[cfg(feature = "ndarray_volumes")]
    #[test]
    fn ndarray_round_trip() {
        let vol = sample_volume();
        let array = vol.clone().into_ndarray();
        assert_eq!(array.shape(), &[3, 3, 3]);
        assert_eq!(array[[2, 1, 0]], 12.);
        assert_eq!(array[[1, 2, 2]], 221.);
    }
}
