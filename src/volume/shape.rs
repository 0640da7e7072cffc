//! Shape and N-dimensional index constructs.
//!
//! The NIfTI format has a hard dimensionality limit of 7, specified in the
//! `dim` header field as an array of 8 integers where the first element
//! holds the number of dimensions. The types [`Dim`] and [`Idx`] wrap that
//! raw representation with validation, element counting and the
//! column-major stride arithmetic used by the windowed cache.
//!
//! [`Dim`]: ./struct.Dim.html
//! [`Idx`]: ./struct.Idx.html

use crate::error::{ImageError, Result};

/// A validated N-dimensional index.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct Idx(
    /// coordinates starting at 1, raw[0] is the rank
    [u16; 8],
);

impl Idx {
    /// Validate and create a new index from the raw data field.
    pub fn new(idx: [u16; 8]) -> Result<Self> {
        validate_rank(&idx)?;
        Ok(Idx(idx))
    }

    /// Create a new N-dimensional index using the given slice as the
    /// concrete coordinates (`idx[0]` is a position, not the rank).
    pub fn from_slice(idx: &[u16]) -> Result<Self> {
        if idx.is_empty() || idx.len() > 7 {
            return Err(ImageError::InconsistentDim(0, idx.len() as u64));
        }
        let mut raw = [0; 8];
        raw[0] = idx.len() as u16;
        raw[1..=idx.len()].copy_from_slice(idx);
        Ok(Idx(raw))
    }

    /// Retrieve a reference to the raw field.
    pub fn raw(&self) -> &[u16; 8] {
        &self.0
    }

    /// Retrieve the rank of this index (dimensionality).
    pub fn rank(&self) -> usize {
        usize::from(self.0[0])
    }
}

impl AsRef<[u16]> for Idx {
    fn as_ref(&self) -> &[u16] {
        &self.0[1..=self.rank()]
    }
}

impl AsMut<[u16]> for Idx {
    fn as_mut(&mut self) -> &mut [u16] {
        let rank = self.rank();
        &mut self.0[1..=rank]
    }
}

/// A validated volume shape.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct Dim(Idx);

impl Dim {
    /// Validate and create a new volume shape from a raw `dim` field.
    ///
    /// # Example
    ///
    /// ```
    /// # use imagewrap::volume::shape::Dim;
    /// let dim = Dim::new([3, 64, 32, 16, 0, 0, 0, 0])?;
    /// assert_eq!(dim.as_ref(), &[64, 32, 16]);
    /// # Ok::<(), imagewrap::ImageError>(())
    /// ```
    pub fn new(dim: [u16; 8]) -> Result<Self> {
        validate_dim(&dim)?;
        Ok(Dim(Idx(dim)))
    }

    /// Create a new volume shape using the given slice as the concrete
    /// shape (`dim[0]` is a width, not the rank).
    pub fn from_slice(dim: &[u16]) -> Result<Self> {
        let idx = Idx::from_slice(dim)?;
        validate_dim(idx.raw())?;
        Ok(Dim(idx))
    }

    /// Retrieve a reference to the raw dim field.
    pub fn raw(&self) -> &[u16; 8] {
        self.0.raw()
    }

    /// Retrieve the rank of this shape (dimensionality).
    pub fn rank(&self) -> usize {
        self.0.rank()
    }

    /// Calculate the number of elements in this shape.
    pub fn element_count(&self) -> usize {
        self.as_ref().iter().cloned().map(usize::from).product()
    }

    /// Column-major strides, in elements, one per axis.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = Vec::with_capacity(self.rank());
        let mut acc = 1;
        for d in self.as_ref() {
            strides.push(acc);
            acc *= usize::from(*d);
        }
        strides
    }

    /// Map voxel coordinates to a linear element offset in column-major
    /// (volume file) order.
    ///
    /// # Errors
    ///
    /// - `ImageError::OutOfBounds` if the coordinates have the wrong rank
    ///   or exceed this shape on any axis.
    pub fn linear_index(&self, coords: &[u16]) -> Result<usize> {
        if coords.len() != self.rank()
            || Iterator::zip(coords.iter(), self.as_ref().iter()).any(|(c, d)| c >= d)
        {
            return Err(ImageError::OutOfBounds(coords.to_vec()));
        }
        let mut acc = 1;
        let mut index = 0;
        for (c, d) in Iterator::zip(coords.iter(), self.as_ref().iter()) {
            index += usize::from(*c) * acc;
            acc *= usize::from(*d);
        }
        Ok(index)
    }

    /// Provide an iterator traversing all indices of a hypothetical
    /// volume with this shape, in column-major order.
    pub fn index_iter(&self) -> DimIter {
        DimIter::new(*self)
    }
}

impl AsRef<[u16]> for Dim {
    fn as_ref(&self) -> &[u16] {
        self.0.as_ref()
    }
}

/// An iterator of all indices in a multi-dimensional volume.
///
/// Traversal is in standard volume file order (column major).
#[derive(Debug, Clone)]
pub struct DimIter {
    shape: Dim,
    state: DimIterState,
}

#[derive(Debug, Copy, Clone)]
enum DimIterState {
    First,
    Middle(Idx),
    Fused,
}

impl DimIter {
    fn new(shape: Dim) -> Self {
        let state = if shape.element_count() == 0 {
            DimIterState::Fused
        } else {
            DimIterState::First
        };
        DimIter { shape, state }
    }
}

impl Iterator for DimIter {
    type Item = Idx;

    fn next(&mut self) -> Option<Self::Item> {
        let (out, next_state) = match self.state {
            DimIterState::First => {
                let out = Idx([self.shape.rank() as u16, 0, 0, 0, 0, 0, 0, 0]);
                (Some(out), DimIterState::Middle(out))
            }
            DimIterState::Fused => (None, DimIterState::Fused),
            DimIterState::Middle(mut current) => {
                let mut good = false;
                for (c, s) in Iterator::zip(current.as_mut().iter_mut(), self.shape.as_ref().iter())
                {
                    if *c < *s - 1 {
                        *c += 1;
                        good = true;
                        break;
                    }
                    *c = 0;
                }
                if good {
                    (Some(current), DimIterState::Middle(current))
                } else {
                    (None, DimIterState::Fused)
                }
            }
        };
        self.state = next_state;
        out
    }
}

fn validate_rank(raw: &[u16; 8]) -> Result<()> {
    if raw[0] == 0 || raw[0] > 7 {
        return Err(ImageError::InconsistentDim(0, u64::from(raw[0])));
    }
    Ok(())
}

fn validate_dim(raw: &[u16; 8]) -> Result<()> {
    validate_rank(raw)?;
    for i in 1..=usize::from(raw[0]) {
        if raw[i] == 0 {
            return Err(ImageError::InconsistentDim(i as u8, u64::from(raw[i])));
        }
    }
    Ok(())
}
