#![forbid(unsafe_code)]

//! The file operations.
//!
//! Decoders return a freshly allocated tensor and report every failure as
//! an `Err`. Encoders return `Ok(true)` when the file was written, `Ok(false)`
//! when the codec failed part way, and `Err` only for problems found before
//! the codec ran (bad shape, unopenable file, no memory).

use std::path::Path;

use log::debug;
use ndarray::{ArrayBase, ArrayD, Data, Dimension};

use crate::{ByteSample, ImgrwError};

#[cfg(any(feature = "png", feature = "jpeg"))]
use {
  crate::{guard::CodecScope, tensor::ByteTensor},
  log::warn,
  std::{
    fs::File,
    io::{BufReader, BufWriter},
  },
};

#[cfg(feature = "png")]
use {
  crate::{
    color::{color_model_for, shape_for},
    png::{is_png_header_correct, PngReadContext, PngWriteContext, PNG_SIGNATURE},
    tensor, IoReason,
  },
  std::io::Read,
};

#[cfg(feature = "jpeg")]
use crate::jpeg::{decode_jpeg, JpegCompressor, JpegOptions};

/// Reads a PNG file.
///
/// Whatever the file holds comes back as 8 bits per sample:
/// * grayscale (1 channel) is a `(height, width)` tensor,
/// * grayscale with alpha, RGB, and RGBA are `(height, width, 2|3|4)`,
/// * paletted images become RGB, or RGBA when they carry transparency.
///
/// ## Failure
/// * [`ImgrwError::Io`] when the file can't be opened, doesn't start with
///   the PNG signature, or the stream is malformed or truncated.
/// * [`ImgrwError::OutOfMemory`] when a buffer can't be reserved.
/// * [`ImgrwError::UnsupportedFormat`] when the decoded color model has no
///   tensor layout.
#[cfg(feature = "png")]
#[cfg_attr(docs_rs, doc(cfg(feature = "png")))]
pub fn read_png(path: impl AsRef<Path>) -> Result<ArrayD<u8>, ImgrwError> {
  let path = path.as_ref();
  let mut scope: CodecScope<BufReader<File>, PngReadContext> = CodecScope::new(path);
  let file = scope.open_read()?;
  let mut signature = [0_u8; PNG_SIGNATURE.len()];
  file.read_exact(&mut signature).map_err(|e| ImgrwError::io_with(path, IoReason::Header, e))?;
  if !is_png_header_correct(&signature) {
    return Err(ImgrwError::io(path, IoReason::Signature));
  }
  let size_hint = file
    .get_ref()
    .metadata()
    .map(|m| usize::try_from(m.len()).unwrap_or(usize::MAX))
    .unwrap_or(0)
    .saturating_sub(PNG_SIGNATURE.len());
  scope.install(|| PngReadContext::try_new(size_hint))?;

  let decoded = scope
    .run(|file, ctx| {
      ctx.read_stream(file)?;
      ctx.decode()
    })
    .map_err(|failure| failure.into_decode_error(path))?;

  let shape = shape_for(decoded.color_model);
  debug!(
    "{}: {}x{} {:?} -> {:?}",
    path.display(),
    decoded.width,
    decoded.height,
    decoded.color_model,
    shape.dims_for(decoded.height as usize, decoded.width as usize)
  );
  let mut out = tensor::allocate(decoded.height as usize, decoded.width as usize, shape)
    .ok_or(ImgrwError::OutOfMemory)?;
  for (y, row) in decoded.rows.rows().enumerate() {
    let dest = tensor::row_mut(&mut out, y, row.len()).ok_or(ImgrwError::OutOfMemory)?;
    dest.copy_from_slice(row);
  }
  scope.finish().map_err(|failure| failure.into_decode_error(path))?;
  Ok(out)
}

/// Writes a tensor as an 8-bit PNG file.
///
/// The tensor must be `(height, width)` or `(height, width, channels)` with
/// 1 to 4 channels, meaning gray, gray+alpha, RGB, or RGBA. Samples of other
/// types are cast to `u8`, and any memory order is accepted.
///
/// ## Failure
/// * [`ImgrwError::InvalidShape`] before anything is created.
/// * [`ImgrwError::Io`] when the file can't be created.
/// * [`ImgrwError::OutOfMemory`] when the row buffers can't be reserved.
/// * `Ok(false)` when encoding or writing fails part way. The partial file
///   is left behind.
#[cfg(feature = "png")]
#[cfg_attr(docs_rs, doc(cfg(feature = "png")))]
pub fn save_png<S, T, D>(path: impl AsRef<Path>, tensor: &ArrayBase<S, D>) -> Result<bool, ImgrwError>
where
  S: Data<Elem = T>,
  T: ByteSample,
  D: Dimension,
{
  let path = path.as_ref();
  let tensor = ByteTensor::coerce(tensor)?;
  let color_model = color_model_for(tensor.channels(), tensor.shape())?;
  debug!("{}: writing {:?} as {color_model:?}", path.display(), tensor.shape());

  let mut scope: CodecScope<BufWriter<File>, PngWriteContext> = CodecScope::new(path);
  scope.create_write()?;
  scope.install(|| PngWriteContext::try_new(tensor.width(), tensor.height(), color_model))?;
  let ctx = scope.context_mut().ok_or(ImgrwError::OutOfMemory)?;
  tensor.copy_rows_into(ctx.rows_mut())?;

  if scope.run(|file, ctx| ctx.write_png(file)).is_err() {
    return Ok(false);
  }
  Ok(finish_encode(scope))
}

/// Reads a JPEG file.
///
/// Grayscale comes back as `(height, width)`. Color images come back as
/// `(height, width, components)`: 3 for RGB, and 4 for CMYK files as the
/// decoder gives them.
///
/// ## Failure
/// * [`ImgrwError::Io`] when the file can't be opened or the codec rejects
///   the stream, which includes 16-bit lossless files.
/// * [`ImgrwError::OutOfMemory`] when the tensor can't be allocated.
#[cfg(feature = "jpeg")]
#[cfg_attr(docs_rs, doc(cfg(feature = "jpeg")))]
pub fn read_jpeg(path: impl AsRef<Path>) -> Result<ArrayD<u8>, ImgrwError> {
  let path = path.as_ref();
  let mut scope: CodecScope<BufReader<File>, ()> = CodecScope::bare(path);
  scope.open_read()?;
  let out = scope
    .run(|file, _| decode_jpeg(file))
    .map_err(|failure| failure.into_decode_error(path))?;
  debug!("{}: decoded to {:?}", path.display(), out.shape());
  scope.finish().map_err(|failure| failure.into_decode_error(path))?;
  Ok(out)
}

/// Writes a tensor as a JPEG file.
///
/// 1 channel is written as grayscale and 3 as RGB. 4 channels are stored
/// verbatim as a 4-component (CMYK) image, so they read back as 4 channels.
/// 2 channels are gray+alpha: JPEG has no alpha, so only the gray is
/// written. Other channel counts make the codec fail, giving `Ok(false)`.
///
/// ## Failure
/// * [`ImgrwError::InvalidShape`] for tensors that aren't 2 or 3
///   dimensional, before anything is created.
/// * [`ImgrwError::Io`] when the file can't be created.
/// * `Ok(false)` when encoding or writing fails part way.
#[cfg(feature = "jpeg")]
#[cfg_attr(docs_rs, doc(cfg(feature = "jpeg")))]
pub fn save_jpeg<S, T, D>(
  path: impl AsRef<Path>, tensor: &ArrayBase<S, D>, options: JpegOptions,
) -> Result<bool, ImgrwError>
where
  S: Data<Elem = T>,
  T: ByteSample,
  D: Dimension,
{
  let path = path.as_ref();
  let tensor = ByteTensor::coerce(tensor)?;
  debug!("{}: writing {:?} at quality {}", path.display(), tensor.shape(), options.quality);

  let mut scope: CodecScope<BufWriter<File>, JpegCompressor> = CodecScope::new(path);
  scope.install(|| Ok(JpegCompressor::new(&tensor, options)))?;
  scope.create_write()?;
  if scope.run(|file, compressor| compressor.compress(file, tensor.as_bytes())).is_err() {
    return Ok(false);
  }
  Ok(finish_encode(scope))
}

/// Closes an encoder's scope; a failed final flush is a failed write.
#[cfg(any(feature = "png", feature = "jpeg"))]
fn finish_encode<C>(scope: CodecScope<BufWriter<File>, C>) -> bool {
  let path = scope.path().to_path_buf();
  match scope.finish() {
    Ok(()) => true,
    Err(failure) => {
      warn!("{}: {failure}", path.display());
      false
    }
  }
}

/// The file formats this build can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageFormat {
  /// `.png`
  Png,
  /// `.jpg`, `.jpeg`, `.jpe`
  Jpeg,
}

impl ImageFormat {
  /// Picks a format by file extension, ignoring case.
  ///
  /// Formats that are compiled out give `None`, same as unknown extensions.
  #[must_use]
  pub fn from_path(path: &Path) -> Option<Self> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
      #[cfg(feature = "png")]
      "png" => Some(Self::Png),
      #[cfg(feature = "jpeg")]
      "jpg" | "jpeg" | "jpe" => Some(Self::Jpeg),
      _ => None,
    }
  }
}

/// Reads an image, picking the decoder by file extension.
///
/// Unknown extensions give `Ok(None)`.
pub fn imread(path: impl AsRef<Path>) -> Result<Option<ArrayD<u8>>, ImgrwError> {
  let path = path.as_ref();
  match ImageFormat::from_path(path) {
    #[cfg(feature = "png")]
    Some(ImageFormat::Png) => read_png(path).map(Some),
    #[cfg(feature = "jpeg")]
    Some(ImageFormat::Jpeg) => read_jpeg(path).map(Some),
    _ => {
      debug!("{}: no reader for this extension", path.display());
      Ok(None)
    }
  }
}

/// Writes an image, picking the encoder by file extension.
///
/// `quality` only matters for JPEG, and defaults to 95. Unknown extensions
/// give `Ok(false)`.
///
/// ## Failure
/// * [`ImgrwError::InvalidArgument`] when a JPEG quality outside `0..=100`
///   is given.
/// * Anything [`save_png`] or [`save_jpeg`] can fail with.
#[allow(unused_variables)]
pub fn imsave<S, T, D>(
  path: impl AsRef<Path>, tensor: &ArrayBase<S, D>, quality: Option<i32>,
) -> Result<bool, ImgrwError>
where
  S: Data<Elem = T>,
  T: ByteSample,
  D: Dimension,
{
  let path = path.as_ref();
  match ImageFormat::from_path(path) {
    #[cfg(feature = "png")]
    Some(ImageFormat::Png) => save_png(path, tensor),
    #[cfg(feature = "jpeg")]
    Some(ImageFormat::Jpeg) => {
      let options = match quality {
        Some(q) if !(0..=100).contains(&q) => {
          return Err(ImgrwError::InvalidArgument("jpeg quality must be in 0..=100"))
        }
        Some(q) => JpegOptions::with_quality(q),
        None => JpegOptions::default(),
      };
      save_jpeg(path, tensor, options)
    }
    _ => {
      debug!("{}: no writer for this extension", path.display());
      Ok(false)
    }
  }
}

#[test]
fn test_format_from_path() {
  #[cfg(feature = "png")]
  assert_eq!(ImageFormat::from_path(Path::new("a/b.PNG")), Some(ImageFormat::Png));
  #[cfg(feature = "jpeg")]
  {
    assert_eq!(ImageFormat::from_path(Path::new("photo.JpEg")), Some(ImageFormat::Jpeg));
    assert_eq!(ImageFormat::from_path(Path::new("photo.jpe")), Some(ImageFormat::Jpeg));
  }
  assert_eq!(ImageFormat::from_path(Path::new("notes.txt")), None);
  assert_eq!(ImageFormat::from_path(Path::new("no_extension")), None);
}
