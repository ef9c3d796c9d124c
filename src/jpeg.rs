#![forbid(unsafe_code)]

//! Glue between the tensor side and the JPEG codecs: `jpeg-decoder` for
//! reading, the `image` crate's encoder for gray and RGB, and `jpeg-encoder`
//! for four components written verbatim.
//!
//! The codecs themselves are used as black boxes. All this module does is
//! map component counts onto what each codec expects, and move scanlines
//! between the codec and the tensor.

use std::io;

use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder};
use jpeg_decoder::{Decoder, PixelFormat};
use log::debug;
use ndarray::ArrayD;

use crate::{
  color::TensorShape,
  error::CodecFailure,
  tensor::{self, ByteTensor},
};

/// The quality used when none is given.
pub const DEFAULT_JPEG_QUALITY: i32 = 95;

/// Options for [`save_jpeg`](crate::save_jpeg).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JpegOptions {
  /// Compression quality.
  ///
  /// Values outside `1..=100` are clamped into that range.
  pub quality: i32,
}

impl Default for JpegOptions {
  #[inline]
  fn default() -> Self {
    Self { quality: DEFAULT_JPEG_QUALITY }
  }
}

impl JpegOptions {
  /// Options with the given quality.
  #[inline]
  #[must_use]
  pub const fn with_quality(quality: i32) -> Self {
    Self { quality }
  }

  /// The quality the encoder actually gets.
  #[inline]
  #[must_use]
  pub fn resolved_quality(&self) -> u8 {
    self.quality.clamp(1, 100) as u8
  }
}

/// Samples per pixel of the decoder's output.
///
/// 16-bit output doesn't fit in bytes, and is treated like any other stream
/// an 8-bit decoder can't read.
#[allow(unreachable_patterns)]
pub(crate) fn channels_for(pixel_format: PixelFormat) -> Result<usize, CodecFailure> {
  match pixel_format {
    PixelFormat::L8 => Ok(1),
    PixelFormat::RGB24 => Ok(3),
    PixelFormat::CMYK32 => Ok(4),
    _ => Err(CodecFailure::Malformed("jpeg sample precision is not 8 bits")),
  }
}

/// How a tensor's samples reach an encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum EncoderInput {
  /// A JPEG color space the `image` encoder takes as is.
  Direct(ExtendedColorType),
  /// Gray+alpha: the alpha is dropped and the gray written alone.
  DropAlpha,
  /// Four components, stored verbatim with no color transform.
  Verbatim4,
  /// No JPEG layout for this many components.
  Unusable,
}

/// Picks the encoder input for `components` samples per pixel.
pub(crate) const fn input_for(components: usize) -> EncoderInput {
  match components {
    1 => EncoderInput::Direct(ExtendedColorType::L8),
    2 => EncoderInput::DropAlpha,
    3 => EncoderInput::Direct(ExtendedColorType::Rgb8),
    4 => EncoderInput::Verbatim4,
    _ => EncoderInput::Unusable,
  }
}

/// Decodes a whole JPEG stream into a freshly allocated tensor.
///
/// ## Failure
/// * The decoder rejects the stream.
/// * The output is 16-bit.
/// * The tensor can't be allocated.
pub(crate) fn decode_jpeg<R: io::Read>(r: R) -> Result<ArrayD<u8>, CodecFailure> {
  let mut decoder = Decoder::new(r);
  decoder.read_info()?;
  let info = decoder.info().ok_or(CodecFailure::Malformed("jpeg has no frame header"))?;
  debug!("jpeg header: {info:?}");
  let channels = channels_for(info.pixel_format)?;
  let (width, height) = (usize::from(info.width), usize::from(info.height));
  let shape = TensorShape::with_channels(channels);
  let mut out = tensor::allocate(height, width, shape).ok_or(CodecFailure::OutOfMemory)?;

  let pixels = decoder.decode()?;
  let row_len = shape.row_len(width);
  for y in 0..height {
    let line = pixels
      .get(y * row_len..(y + 1) * row_len)
      .ok_or(CodecFailure::Malformed("jpeg decoded fewer rows than its header"))?;
    let row = tensor::row_mut(&mut out, y, row_len).ok_or(CodecFailure::OutOfMemory)?;
    row.copy_from_slice(line);
  }
  Ok(out)
}

/// The compression parameters for one JPEG encode.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JpegCompressor {
  width: usize,
  height: usize,
  components: usize,
  input: EncoderInput,
  quality: u8,
}

impl JpegCompressor {
  pub fn new(tensor: &ByteTensor<'_>, options: JpegOptions) -> Self {
    let components = tensor.channels();
    Self {
      width: tensor.width(),
      height: tensor.height(),
      components,
      input: input_for(components),
      quality: options.resolved_quality(),
    }
  }

  /// Encodes `pixels` (rows back to back) to `w`.
  ///
  /// ## Failure
  /// * The component count is outside `1..=4`.
  /// * Width or height is 0 or more than 65535.
  /// * The encoder or the writer fails.
  pub fn compress<W: io::Write>(&self, w: &mut W, pixels: &[u8]) -> Result<(), CodecFailure> {
    if matches!(self.input, EncoderInput::Unusable) {
      return Err(CodecFailure::Malformed("no jpeg layout for this many components"));
    }
    let dim = |d: usize| match u16::try_from(d) {
      Ok(d) if d > 0 => Ok(d),
      _ => Err(CodecFailure::Malformed("image dimensions out of range for JPEG")),
    };
    let (width, height) = (dim(self.width)?, dim(self.height)?);
    debug!(
      "jpeg encode {width}x{height}, {} components as {:?}, quality {}",
      self.components, self.input, self.quality
    );
    match self.input {
      EncoderInput::Direct(color_type) => {
        JpegEncoder::new_with_quality(w, self.quality).write_image(
          pixels,
          u32::from(width),
          u32::from(height),
          color_type,
        )?;
      }
      EncoderInput::DropAlpha => {
        let mut gray: Vec<u8> = Vec::new();
        gray.try_reserve_exact(pixels.len() / 2)?;
        gray.extend(pixels.chunks_exact(2).map(|la| la[0]));
        JpegEncoder::new_with_quality(w, self.quality).write_image(
          &gray,
          u32::from(width),
          u32::from(height),
          ExtendedColorType::L8,
        )?;
      }
      EncoderInput::Verbatim4 => {
        jpeg_encoder::Encoder::new(w, self.quality).encode(
          pixels,
          width,
          height,
          jpeg_encoder::ColorType::Cmyk,
        )?;
      }
      EncoderInput::Unusable => (),
    }
    Ok(())
  }
}
