//! Batched box and index tensors.
//!
//! Box data is a flat row-major buffer of shape
//! `[batch_size, num_anchors, elem_length]`; each anchor occupies one row of
//! `elem_length` elements. Index tensors are `[batch_size, num_anchors]`
//! buffers of `i32` where `-1` marks an empty slot. Views borrow the backing
//! slice without copying and are validated once at construction.

use crate::element::Element;
use crate::util::{NmsError, NmsResult};

/// Sentinel stored in index tensors for "no candidate here".
pub const INVALID_INDEX: i32 = -1;

/// Dimensions of a box tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TensorShape {
    batch_size: usize,
    num_anchors: usize,
    elem_length: usize,
}

impl TensorShape {
    /// Validates that every dimension is non-zero and the element count fits.
    pub fn new(batch_size: usize, num_anchors: usize, elem_length: usize) -> NmsResult<Self> {
        let shape = Self {
            batch_size,
            num_anchors,
            elem_length,
        };
        if batch_size == 0 || num_anchors == 0 || elem_length == 0 {
            return Err(shape.invalid());
        }
        // Anchor positions are stored as i32 in index tensors.
        if i32::try_from(num_anchors).is_err() {
            return Err(shape.invalid());
        }
        batch_size
            .checked_mul(num_anchors)
            .and_then(|v| v.checked_mul(elem_length))
            .ok_or(shape.invalid())?;
        Ok(shape)
    }

    fn invalid(self) -> NmsError {
        NmsError::InvalidShape {
            batch_size: self.batch_size,
            num_anchors: self.num_anchors,
            elem_length: self.elem_length,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_anchors(&self) -> usize {
        self.num_anchors
    }

    pub fn elem_length(&self) -> usize {
        self.elem_length
    }

    /// Elements between the starts of consecutive batches.
    pub fn batch_stride(&self) -> usize {
        self.num_anchors * self.elem_length
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.batch_size * self.batch_stride()
    }

    /// Always false for a validated shape.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_exact_len(got: usize, needed: usize, context: &'static str) -> NmsResult<()> {
    if got < needed {
        return Err(NmsError::BufferTooSmall { needed, got });
    }
    if got > needed {
        return Err(NmsError::ShapeMismatch {
            context,
            expected: needed,
            got,
        });
    }
    Ok(())
}

/// Borrowed box tensor.
#[derive(Clone, Copy, Debug)]
pub struct BoxTensorView<'a, T> {
    data: &'a [T],
    shape: TensorShape,
}

impl<'a, T: Element> BoxTensorView<'a, T> {
    /// Creates a view over the first `shape.len()` elements of `data`.
    pub fn new(data: &'a [T], shape: TensorShape) -> NmsResult<Self> {
        let needed = shape.len();
        if data.len() < needed {
            return Err(NmsError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data: &data[..needed],
            shape,
        })
    }

    /// Convenience constructor taking the three dimensions directly.
    pub fn from_slice(
        data: &'a [T],
        batch_size: usize,
        num_anchors: usize,
        elem_length: usize,
    ) -> NmsResult<Self> {
        Self::new(data, TensorShape::new(batch_size, num_anchors, elem_length)?)
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns all rows of batch `b`.
    pub fn batch(&self, b: usize) -> Option<&'a [T]> {
        if b >= self.shape.batch_size {
            return None;
        }
        let stride = self.shape.batch_stride();
        self.data.get(b * stride..(b + 1) * stride)
    }

    /// Returns row `anchor` of batch `b`.
    pub fn row(&self, b: usize, anchor: usize) -> Option<&'a [T]> {
        if anchor >= self.shape.num_anchors {
            return None;
        }
        let elem = self.shape.elem_length;
        self.batch(b)?.get(anchor * elem..(anchor + 1) * elem)
    }

    /// Copies the view into an owned tensor.
    pub fn to_tensor(&self) -> BoxTensor<T> {
        BoxTensor {
            data: self.data.to_vec(),
            shape: self.shape,
        }
    }
}

/// Owned box tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxTensor<T> {
    data: Vec<T>,
    shape: TensorShape,
}

impl<T: Element> BoxTensor<T> {
    /// Takes ownership of a buffer holding exactly the declared shape.
    pub fn new(
        data: Vec<T>,
        batch_size: usize,
        num_anchors: usize,
        elem_length: usize,
    ) -> NmsResult<Self> {
        let shape = TensorShape::new(batch_size, num_anchors, elem_length)?;
        check_exact_len(data.len(), shape.len(), "box buffer length")?;
        Ok(Self { data, shape })
    }

    /// Creates a tensor with every element set to the sentinel value.
    pub fn sentinel(shape: TensorShape) -> Self {
        Self {
            data: vec![T::SENTINEL; shape.len()],
            shape,
        }
    }

    pub fn view(&self) -> BoxTensorView<'_, T> {
        BoxTensorView {
            data: &self.data,
            shape: self.shape,
        }
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn batch(&self, b: usize) -> Option<&[T]> {
        if b >= self.shape.batch_size {
            return None;
        }
        let stride = self.shape.batch_stride();
        self.data.get(b * stride..(b + 1) * stride)
    }

    pub fn batch_mut(&mut self, b: usize) -> Option<&mut [T]> {
        if b >= self.shape.batch_size {
            return None;
        }
        let stride = self.shape.batch_stride();
        self.data.get_mut(b * stride..(b + 1) * stride)
    }

    pub fn row(&self, b: usize, anchor: usize) -> Option<&[T]> {
        self.view().row(b, anchor)
    }

    /// Mutable access to the flat buffer for batch-parallel kernels.
    pub(crate) fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Owned `[batch_size, num_anchors]` tensor of `i32` indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexTensor {
    data: Vec<i32>,
    batch_size: usize,
    num_anchors: usize,
}

impl IndexTensor {
    pub fn new(data: Vec<i32>, batch_size: usize, num_anchors: usize) -> NmsResult<Self> {
        let shape = TensorShape::new(batch_size, num_anchors, 1)?;
        check_exact_len(data.len(), shape.len(), "index buffer length")?;
        Ok(Self {
            data,
            batch_size,
            num_anchors,
        })
    }

    /// Creates a tensor filled with [`INVALID_INDEX`].
    pub fn invalid(batch_size: usize, num_anchors: usize) -> NmsResult<Self> {
        let shape = TensorShape::new(batch_size, num_anchors, 1)?;
        Ok(Self {
            data: vec![INVALID_INDEX; shape.len()],
            batch_size,
            num_anchors,
        })
    }

    /// Identity map `0..num_anchors` for every batch.
    ///
    /// This is the original-index map for data that never went through
    /// valid-count compaction.
    pub fn arange(batch_size: usize, num_anchors: usize) -> NmsResult<Self> {
        let mut out = Self::invalid(batch_size, num_anchors)?;
        for row in out.data.chunks_exact_mut(num_anchors) {
            for (slot, value) in row.iter_mut().zip(0i32..) {
                *slot = value;
            }
        }
        Ok(out)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_anchors(&self) -> usize {
        self.num_anchors
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<i32> {
        self.data
    }

    pub fn row(&self, b: usize) -> Option<&[i32]> {
        if b >= self.batch_size {
            return None;
        }
        self.data
            .get(b * self.num_anchors..(b + 1) * self.num_anchors)
    }

    pub fn row_mut(&mut self, b: usize) -> Option<&mut [i32]> {
        if b >= self.batch_size {
            return None;
        }
        self.data
            .get_mut(b * self.num_anchors..(b + 1) * self.num_anchors)
    }

    pub(crate) fn data_mut(&mut self) -> &mut [i32] {
        &mut self.data
    }

    /// Fails unless this tensor matches `shape` in its first two dimensions.
    pub(crate) fn ensure_matches(
        &self,
        shape: TensorShape,
        context: &'static str,
    ) -> NmsResult<()> {
        if self.batch_size != shape.batch_size() {
            return Err(NmsError::ShapeMismatch {
                context,
                expected: shape.batch_size(),
                got: self.batch_size,
            });
        }
        if self.num_anchors != shape.num_anchors() {
            return Err(NmsError::ShapeMismatch {
                context,
                expected: shape.num_anchors(),
                got: self.num_anchors,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BoxTensor, BoxTensorView, IndexTensor, TensorShape};
    use crate::util::NmsError;

    #[test]
    fn shape_rejects_zero_dimensions() {
        assert_eq!(
            TensorShape::new(1, 0, 6),
            Err(NmsError::InvalidShape {
                batch_size: 1,
                num_anchors: 0,
                elem_length: 6,
            })
        );
    }

    #[test]
    fn view_rows_address_the_right_elements() {
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let view = BoxTensorView::from_slice(&data, 2, 2, 6).unwrap();
        assert_eq!(view.row(1, 0).unwrap()[0], 12.0);
        assert_eq!(view.row(0, 1).unwrap(), &data[6..12]);
        assert!(view.row(2, 0).is_none());
        assert!(view.row(0, 2).is_none());
    }

    #[test]
    fn owned_tensor_requires_exact_length() {
        let err = BoxTensor::new(vec![0.0f32; 11], 1, 2, 6).unwrap_err();
        assert_eq!(err, NmsError::BufferTooSmall { needed: 12, got: 11 });
    }

    #[test]
    fn arange_restarts_per_batch() {
        let idx = IndexTensor::arange(2, 3).unwrap();
        assert_eq!(idx.as_slice(), &[0, 1, 2, 0, 1, 2]);
    }
}
