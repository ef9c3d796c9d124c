#![forbid(unsafe_code)]

//! The one place that knows how channel counts and color models relate.
//!
//! Both codecs have their own words for "what the channels mean" (PNG color
//! types, JPEG color spaces). Each codec module translates its vocabulary to
//! and from [`ColorModel`], and everything about tensor shape is decided
//! here.

use crate::ImgrwError;

/// The color models a tensor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColorModel {
  /// One channel of luminance.
  Gray,
  /// Luminance and alpha.
  GrayAlpha,
  /// Red, green, blue.
  Rgb,
  /// Red, green, blue, alpha.
  Rgba,
}

impl ColorModel {
  /// Samples per pixel.
  #[inline]
  #[must_use]
  pub const fn channel_count(self) -> usize {
    match self {
      Self::Gray => 1,
      Self::GrayAlpha => 2,
      Self::Rgb => 3,
      Self::Rgba => 4,
    }
  }
}

/// How a decoded image is laid out as a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TensorShape {
  /// Samples per pixel.
  pub channels: usize,
  /// 2 for grayscale, 3 otherwise.
  pub dims: usize,
}

impl TensorShape {
  /// The shape for `channels` samples per pixel.
  ///
  /// A single channel never gets a trailing dimension.
  #[inline]
  #[must_use]
  pub const fn with_channels(channels: usize) -> Self {
    Self { channels, dims: if channels == 1 { 2 } else { 3 } }
  }

  /// The full tensor dimensions for an image of the given size.
  #[must_use]
  pub fn dims_for(&self, height: usize, width: usize) -> Vec<usize> {
    if self.dims == 2 {
      vec![height, width]
    } else {
      vec![height, width, self.channels]
    }
  }

  /// Bytes in one row of the tensor.
  #[inline]
  #[must_use]
  pub const fn row_len(&self, width: usize) -> usize {
    width * self.channels
  }
}

/// Tensor layout for a decoded color model.
#[inline]
#[must_use]
pub const fn shape_for(model: ColorModel) -> TensorShape {
  TensorShape::with_channels(model.channel_count())
}

/// On-disk color model for a tensor with `channels` samples per pixel.
///
/// ## Failure
/// * Any channel count outside `1..=4`, reported against `shape`.
pub fn color_model_for(channels: usize, shape: &[usize]) -> Result<ColorModel, ImgrwError> {
  Ok(match channels {
    1 => ColorModel::Gray,
    2 => ColorModel::GrayAlpha,
    3 => ColorModel::Rgb,
    4 => ColorModel::Rgba,
    _ => return Err(ImgrwError::InvalidShape(shape.to_vec())),
  })
}

#[test]
fn test_shape_for() {
  assert_eq!(shape_for(ColorModel::Gray), TensorShape { channels: 1, dims: 2 });
  assert_eq!(shape_for(ColorModel::GrayAlpha), TensorShape { channels: 2, dims: 3 });
  assert_eq!(shape_for(ColorModel::Rgb), TensorShape { channels: 3, dims: 3 });
  assert_eq!(shape_for(ColorModel::Rgba), TensorShape { channels: 4, dims: 3 });
}

#[test]
fn test_dims_for() {
  assert_eq!(shape_for(ColorModel::Gray).dims_for(5, 7), vec![5, 7]);
  assert_eq!(shape_for(ColorModel::GrayAlpha).dims_for(5, 7), vec![5, 7, 2]);
  assert_eq!(TensorShape::with_channels(4).dims_for(1, 1), vec![1, 1, 4]);
}

#[test]
fn test_color_model_for_round_trips() {
  for model in [ColorModel::Gray, ColorModel::GrayAlpha, ColorModel::Rgb, ColorModel::Rgba] {
    let shape = shape_for(model);
    assert_eq!(color_model_for(shape.channels, &[1, 1, shape.channels]).unwrap(), model);
  }
}

#[test]
fn test_color_model_for_rejects_other_counts() {
  for channels in [0, 5, 6, 255] {
    match color_model_for(channels, &[2, 2, channels]) {
      Err(ImgrwError::InvalidShape(shape)) => assert_eq!(shape, vec![2, 2, channels]),
      other => panic!("channels {channels}: {other:?}"),
    }
  }
}
