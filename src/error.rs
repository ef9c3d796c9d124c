#![forbid(unsafe_code)]

use std::{collections::TryReserveError, fmt, io, path::PathBuf};

/// Which step of an operation failed to do its I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IoReason {
  /// The file could not be opened for reading.
  Open,
  /// The file could not be created for writing.
  Create,
  /// The file ended before the fixed-size header could be read.
  Header,
  /// The header bytes are not the signature of the expected format.
  Signature,
  /// The codec reported a malformed or truncated stream, or a read failed
  /// part way through.
  Decode,
}

impl fmt::Display for IoReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Open => "failed to open file",
      Self::Create => "failed to create file",
      Self::Header => "failed to read header info",
      Self::Signature => "header signature mismatch",
      Self::Decode => "error happened while reading file",
    })
  }
}

/// An error from the `imgrw` crate.
#[derive(Debug)]
pub enum ImgrwError {
  /// The file couldn't be opened, read, or understood as the expected
  /// format.
  Io {
    /// The file the operation was working on.
    path: PathBuf,
    /// Which step failed.
    reason: IoReason,
    /// The underlying OS error, when there is one.
    source: Option<io::Error>,
  },

  /// The allocator couldn't give us enough space.
  OutOfMemory,

  /// The decoded color model has no tensor layout.
  UnsupportedFormat,

  /// The tensor given to an encoder doesn't describe an image.
  ///
  /// It must be `(height, width)` or `(height, width, channels)` with
  /// `channels` in `1..=4`.
  InvalidShape(Vec<usize>),

  /// An argument to one of the dispatching entry points is out of range.
  InvalidArgument(&'static str),
}

impl ImgrwError {
  pub(crate) fn io(path: impl Into<PathBuf>, reason: IoReason) -> Self {
    Self::Io { path: path.into(), reason, source: None }
  }

  pub(crate) fn io_with(path: impl Into<PathBuf>, reason: IoReason, source: io::Error) -> Self {
    Self::Io { path: path.into(), reason, source: Some(source) }
  }

  /// The I/O step that failed, if this is an I/O error.
  #[inline]
  #[must_use]
  pub fn io_reason(&self) -> Option<IoReason> {
    match self {
      Self::Io { reason, .. } => Some(*reason),
      _ => None,
    }
  }
}

impl fmt::Display for ImgrwError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Io { path, reason, source: Some(e) } => {
        write!(f, "{reason} '{}': {e}", path.display())
      }
      Self::Io { path, reason, source: None } => write!(f, "{reason} '{}'", path.display()),
      Self::OutOfMemory => f.write_str("failed to allocate memory"),
      Self::UnsupportedFormat => f.write_str("unsupported color type of input file"),
      Self::InvalidShape(shape) => write!(f, "tensor of shape {shape:?} is not an image"),
      Self::InvalidArgument(what) => f.write_str(what),
    }
  }
}

impl std::error::Error for ImgrwError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Io { source: Some(e), .. } => Some(e),
      _ => None,
    }
  }
}

impl From<TryReserveError> for ImgrwError {
  #[inline]
  fn from(_: TryReserveError) -> Self {
    Self::OutOfMemory
  }
}

/// What a codec hands back to the recovery point of the call that ran it.
///
/// This never escapes the crate: decoders turn it into [`ImgrwError::Io`],
/// encoders into an `Ok(false)`.
#[derive(Debug)]
pub(crate) enum CodecFailure {
  /// A read or write on the file failed.
  Io(io::Error),
  /// The stream is malformed, or the codec can't represent the image.
  Malformed(&'static str),
  /// The decoded color model has no tensor layout.
  Unsupported,
  /// A buffer reservation failed while the codec was running.
  OutOfMemory,
  #[cfg(feature = "jpeg")]
  JpegDecode(jpeg_decoder::Error),
  #[cfg(feature = "jpeg")]
  JpegEncode(image::ImageError),
  #[cfg(feature = "jpeg")]
  JpegEncodeVerbatim(jpeg_encoder::EncodingError),
  /// The codec unwound instead of returning.
  Panicked(String),
}

impl fmt::Display for CodecFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Io(e) => write!(f, "i/o: {e}"),
      Self::Malformed(what) => f.write_str(what),
      Self::Unsupported => f.write_str("unsupported color model"),
      Self::OutOfMemory => f.write_str("allocation failed"),
      #[cfg(feature = "jpeg")]
      Self::JpegDecode(e) => write!(f, "jpeg: {e}"),
      #[cfg(feature = "jpeg")]
      Self::JpegEncode(e) => write!(f, "jpeg: {e}"),
      #[cfg(feature = "jpeg")]
      Self::JpegEncodeVerbatim(e) => write!(f, "jpeg: {e}"),
      Self::Panicked(msg) => write!(f, "codec panicked: {msg}"),
    }
  }
}

impl From<io::Error> for CodecFailure {
  #[inline]
  fn from(e: io::Error) -> Self {
    Self::Io(e)
  }
}

impl From<TryReserveError> for CodecFailure {
  #[inline]
  fn from(_: TryReserveError) -> Self {
    Self::OutOfMemory
  }
}

#[cfg(feature = "jpeg")]
impl From<jpeg_decoder::Error> for CodecFailure {
  #[inline]
  fn from(e: jpeg_decoder::Error) -> Self {
    Self::JpegDecode(e)
  }
}

#[cfg(feature = "jpeg")]
impl From<image::ImageError> for CodecFailure {
  #[inline]
  fn from(e: image::ImageError) -> Self {
    Self::JpegEncode(e)
  }
}

#[cfg(feature = "jpeg")]
impl From<jpeg_encoder::EncodingError> for CodecFailure {
  #[inline]
  fn from(e: jpeg_encoder::EncodingError) -> Self {
    Self::JpegEncodeVerbatim(e)
  }
}

impl CodecFailure {
  /// Converts a failure seen while decoding into the error the caller gets.
  pub(crate) fn into_decode_error(self, path: impl Into<PathBuf>) -> ImgrwError {
    match self {
      Self::Io(e) => ImgrwError::io_with(path, IoReason::Decode, e),
      Self::Unsupported => ImgrwError::UnsupportedFormat,
      Self::OutOfMemory => ImgrwError::OutOfMemory,
      _ => ImgrwError::io(path, IoReason::Decode),
    }
  }
}
