#![forbid(unsafe_code)]

//! The tensor side of the adapter, built on `ndarray`.
//!
//! Decoders allocate an [`ArrayD<u8>`] once the image shape is known.
//! Encoders accept any array of a [`ByteSample`] element type and any memory
//! order, and look at it through [`ByteTensor`], which is always `u8` and
//! always in standard (row-major, tightly packed) layout.

use ndarray::{ArrayBase, ArrayD, ArrayViewD, CowArray, Data, Dimension, IxDyn};

use crate::{color::TensorShape, row_arena::RowArena, ImgrwError};

/// An element type that can be coerced to one byte per sample.
///
/// The coercion is Rust's `as` cast: integers keep their low byte, floats
/// saturate to `0..=255` (and NaN becomes 0).
pub trait ByteSample: Copy {
  /// Coerces one sample.
  fn to_byte(self) -> u8;

  /// Coerces a whole tensor, borrowing when nothing needs to change.
  #[doc(hidden)]
  fn byte_tensor(view: ArrayViewD<'_, Self>) -> CowArray<'_, u8, IxDyn> {
    CowArray::from(view.mapv(Self::to_byte))
  }
}

impl ByteSample for u8 {
  #[inline]
  fn to_byte(self) -> u8 {
    self
  }
  #[inline]
  fn byte_tensor(view: ArrayViewD<'_, u8>) -> CowArray<'_, u8, IxDyn> {
    CowArray::from(view)
  }
}

macro_rules! impl_byte_sample_by_cast {
  ($($t:ty),*) => {
    $(
      impl ByteSample for $t {
        #[inline]
        fn to_byte(self) -> u8 {
          self as u8
        }
      }
    )*
  };
}
impl_byte_sample_by_cast!(i8, u16, i16, u32, i32, u64, i64, usize, isize, f32, f64);

impl ByteSample for bool {
  #[inline]
  fn to_byte(self) -> u8 {
    self as u8
  }
}

/// A caller's tensor seen as contiguous bytes, ready for an encoder.
#[derive(Debug)]
pub struct ByteTensor<'a> {
  array: CowArray<'a, u8, IxDyn>,
  height: usize,
  width: usize,
  channels: usize,
}

impl<'a> ByteTensor<'a> {
  /// Coerces `tensor` to `u8` and standard layout.
  ///
  /// Only the dimensionality is checked here: it must be 2 or 3.
  pub fn coerce<S, T, D>(tensor: &'a ArrayBase<S, D>) -> Result<Self, ImgrwError>
  where
    S: Data<Elem = T>,
    T: ByteSample + 'a,
    D: Dimension,
  {
    let array = standard_layout(T::byte_tensor(tensor.view().into_dyn()));
    let (height, width, channels) = match *array.shape() {
      [h, w] => (h, w, 1),
      [h, w, c] => (h, w, c),
      _ => return Err(ImgrwError::InvalidShape(array.shape().to_vec())),
    };
    Ok(Self { array, height, width, channels })
  }

  /// Rows.
  #[inline]
  #[must_use]
  pub fn height(&self) -> usize {
    self.height
  }

  /// Columns.
  #[inline]
  #[must_use]
  pub fn width(&self) -> usize {
    self.width
  }

  /// Samples per pixel: the trailing dimension, or 1 for a 2-d tensor.
  #[inline]
  #[must_use]
  pub fn channels(&self) -> usize {
    self.channels
  }

  /// The full shape, for error reporting.
  #[inline]
  #[must_use]
  pub fn shape(&self) -> &[usize] {
    self.array.shape()
  }

  /// All samples, row-major and tightly packed.
  #[inline]
  #[must_use]
  pub fn as_bytes(&self) -> &[u8] {
    // standard layout was forced in `coerce`
    self.array.as_slice().unwrap_or(&[])
  }

  /// Row `y`: `width * channels` bytes starting at `y * width * channels`.
  #[inline]
  #[must_use]
  pub fn row(&self, y: usize) -> &[u8] {
    let row_len = self.width * self.channels;
    &self.as_bytes()[y * row_len..(y + 1) * row_len]
  }

  /// Copies each row into the same row of `arena`.
  ///
  /// ## Failure
  /// * The arena is missing a row, or a row has the wrong length.
  pub(crate) fn copy_rows_into(&self, arena: &mut RowArena) -> Result<(), ImgrwError> {
    for y in 0..self.height {
      let src = self.row(y);
      match arena.row_mut(y) {
        Some(dest) if dest.len() == src.len() => dest.copy_from_slice(src),
        _ => return Err(ImgrwError::OutOfMemory),
      }
    }
    Ok(())
  }
}

fn standard_layout(array: CowArray<'_, u8, IxDyn>) -> CowArray<'_, u8, IxDyn> {
  if array.is_standard_layout() {
    array
  } else {
    let owned = array.as_standard_layout().into_owned();
    CowArray::from(owned)
  }
}

/// Allocates a zeroed tensor for a decoded image.
///
/// Gives `None` when the size overflows or the allocator refuses.
pub(crate) fn allocate(height: usize, width: usize, shape: TensorShape) -> Option<ArrayD<u8>> {
  let dims = shape.dims_for(height, width);
  let len = dims.iter().try_fold(1_usize, |acc, &d| acc.checked_mul(d))?;
  let mut bytes: Vec<u8> = Vec::new();
  bytes.try_reserve_exact(len).ok()?;
  bytes.resize(len, 0);
  ArrayD::from_shape_vec(IxDyn(&dims), bytes).ok()
}

/// Row `y` of a freshly allocated decode tensor.
#[inline]
pub(crate) fn row_mut(tensor: &mut ArrayD<u8>, y: usize, row_len: usize) -> Option<&mut [u8]> {
  tensor.as_slice_mut()?.get_mut(y * row_len..(y + 1) * row_len)
}
