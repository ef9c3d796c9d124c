#![forbid(unsafe_code)]

//! Scoped ownership of the file and codec context of one operation.
//!
//! Every operation follows the same shape:
//!
//! 1) Make a [`CodecScope`] for the path.
//! 2) Open the file and [`install`](CodecScope::install) the codec context,
//!    in whichever order the format wants.
//! 3) Do all codec work inside [`run`](CodecScope::run). This is the
//!    recovery point: a codec error returned with `?`, or a codec that
//!    unwinds instead of returning, both arrive here as a [`CodecFailure`].
//! 4) Call [`finish`](CodecScope::finish) on success, or just let the scope
//!    drop. Either way the context is destroyed and the file closed exactly
//!    once.
//!
//! The recovery point is a local of the call, so concurrent or nested
//! operations never share one.
//!
//! Note that unwinds are only recoverable when the crate is built with
//! `panic = "unwind"` (the default). Under `panic = "abort"` a codec panic
//! still ends the process.

use std::{
  any::Any,
  collections::TryReserveError,
  fs::File,
  io::{self, BufReader, BufWriter, Write},
  panic::{self, AssertUnwindSafe},
  path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::{error::CodecFailure, ImgrwError, IoReason};

/// A file handle the scope knows how to close.
pub(crate) trait FileHandle {
  /// Closes the handle, reporting any final write failure.
  fn close(self) -> io::Result<()>;
}

impl FileHandle for BufReader<File> {
  #[inline]
  fn close(self) -> io::Result<()> {
    Ok(())
  }
}

impl FileHandle for BufWriter<File> {
  #[inline]
  fn close(mut self) -> io::Result<()> {
    self.flush()
  }
}

/// Owns the file handle `F` and the codec context `C` of one operation.
pub(crate) struct CodecScope<F: FileHandle, C> {
  path: PathBuf,
  file: Option<F>,
  context: Option<C>,
}

impl<F: FileHandle, C> CodecScope<F, C> {
  /// An empty scope; nothing is acquired yet.
  pub fn new(path: &Path) -> Self {
    Self { path: path.to_path_buf(), file: None, context: None }
  }

  /// The path this scope was made for.
  #[inline]
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Creates the codec context.
  ///
  /// ## Failure
  /// * The context couldn't reserve its memory. Whatever the scope already
  ///   holds is released when it drops.
  pub fn install<M>(&mut self, make: M) -> Result<(), ImgrwError>
  where
    M: FnOnce() -> Result<C, TryReserveError>,
  {
    match make() {
      Ok(context) => {
        self.context = Some(context);
        Ok(())
      }
      Err(e) => {
        debug!("{}: codec context allocation failed: {e}", self.path.display());
        Err(ImgrwError::OutOfMemory)
      }
    }
  }

  /// Runs codec work against the file and context.
  ///
  /// This is the recovery point of the operation. A `CodecFailure` returned by
  /// `op`, or an unwind out of `op`, comes back as `Err`. The scope keeps
  /// ownership of both resources either way.
  pub fn run<T, O>(&mut self, op: O) -> Result<T, CodecFailure>
  where
    O: FnOnce(&mut F, &mut C) -> Result<T, CodecFailure>,
  {
    let (file, context) = match (self.file.as_mut(), self.context.as_mut()) {
      (Some(file), Some(context)) => (file, context),
      _ => {
        return Err(CodecFailure::Io(io::Error::new(
          io::ErrorKind::Other,
          "codec scope used before its file and context were acquired",
        )))
      }
    };
    let outcome = recover(|| op(file, context));
    if let Err(failure) = &outcome {
      warn!("{}: {failure}", self.path.display());
    }
    outcome
  }

  /// Gets the context, if installed.
  #[inline]
  pub fn context_mut(&mut self) -> Option<&mut C> {
    self.context.as_mut()
  }

  /// Releases everything on the success path.
  ///
  /// ## Failure
  /// * The file's final flush failed. Both resources are released anyway.
  pub fn finish(mut self) -> Result<(), CodecFailure> {
    self.release().map_err(CodecFailure::Io)
  }

  fn release(&mut self) -> io::Result<()> {
    let had_context = self.context.take().is_some();
    let closed = match self.file.take() {
      Some(file) => Some(file.close()),
      None => None,
    };
    if had_context || closed.is_some() {
      debug!("{}: released codec scope", self.path.display());
    }
    closed.unwrap_or(Ok(()))
  }
}

impl<C> CodecScope<BufReader<File>, C> {
  /// Opens the scope's path for reading.
  ///
  /// The reader is handed back so a format can check its signature before
  /// installing a context.
  ///
  /// ## Failure
  /// * The file can't be opened.
  pub fn open_read(&mut self) -> Result<&mut BufReader<File>, ImgrwError> {
    match File::open(&self.path) {
      Ok(f) => {
        debug!("{}: opened for reading", self.path.display());
        Ok(self.file.insert(BufReader::new(f)))
      }
      Err(e) => Err(ImgrwError::io_with(&self.path, IoReason::Open, e)),
    }
  }
}

impl<C> CodecScope<BufWriter<File>, C> {
  /// Creates (or truncates) the scope's path for writing.
  ///
  /// ## Failure
  /// * The file can't be created.
  pub fn create_write(&mut self) -> Result<(), ImgrwError> {
    match File::create(&self.path) {
      Ok(f) => {
        debug!("{}: opened for writing", self.path.display());
        self.file = Some(BufWriter::new(f));
        Ok(())
      }
      Err(e) => Err(ImgrwError::io_with(&self.path, IoReason::Create, e)),
    }
  }
}

impl<F: FileHandle> CodecScope<F, ()> {
  /// A scope for a codec that keeps all its state inside [`run`](Self::run).
  pub fn bare(path: &Path) -> Self {
    Self { path: path.to_path_buf(), file: None, context: Some(()) }
  }
}

impl<F: FileHandle, C> Drop for CodecScope<F, C> {
  fn drop(&mut self) {
    if let Err(e) = self.release() {
      debug!("{}: error while closing: {e}", self.path.display());
    }
  }
}

/// Runs `op`, converting an unwind out of it into a failure.
pub(crate) fn recover<T, O>(op: O) -> Result<T, CodecFailure>
where
  O: FnOnce() -> Result<T, CodecFailure>,
{
  match panic::catch_unwind(AssertUnwindSafe(op)) {
    Ok(outcome) => outcome,
    Err(payload) => Err(CodecFailure::Panicked(panic_message(&*payload))),
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    String::from("non-string panic payload")
  }
}
