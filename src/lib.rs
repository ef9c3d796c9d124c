#![cfg_attr(docs_rs, feature(doc_cfg))]

//! A crate for moving images between files and `ndarray` tensors.
//!
//! Decoding gives a freshly allocated [`ArrayD<u8>`](ndarray::ArrayD) that's
//! row-major and tightly packed:
//! * 1 channel (grayscale) images are `(height, width)`.
//! * Everything else is `(height, width, channels)`, with 2 channels being
//!   gray+alpha, 3 being RGB, and 4 being RGBA.
//!
//! Encoding takes any 2 or 3 dimensional array whose elements are a
//! [`ByteSample`], in any memory order, and writes it out as 8 bits per
//! sample.
//!
//! ```no_run
//! # fn main() -> Result<(), imgrw::ImgrwError> {
//! let image = imgrw::read_png("input.png")?;
//! assert!(imgrw::save_jpeg("output.jpg", &image, imgrw::JpegOptions::default())?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Cargo Features
//! * `png` (default): [`read_png`] and [`save_png`], using a built-in codec.
//! * `jpeg` (default): [`read_jpeg`] and [`save_jpeg`], using the
//!   `jpeg-decoder` crate, the `image` crate's JPEG encoder, and
//!   `jpeg-encoder` for 4-component images.
//!
//! [`imread`] and [`imsave`] pick between whichever of these are enabled by
//! looking at the file extension.
//!
//! ## Logging
//! The crate logs through the [`log`](https://docs.rs/log) facade: file
//! open/close and shape decisions at `debug`, codec failures at `warn`. It
//! never installs a logger itself.

#[cfg(target_pointer_width = "16")]
compile_error!("this crate assumes 32-bit or bigger pointers!");

pub use ndarray;

pub mod color;

mod error;
pub use error::{ImgrwError, IoReason};

mod guard;

pub mod pixel_formats;

pub mod row_arena;

pub mod tensor;
pub use tensor::{ByteSample, ByteTensor};

#[cfg(feature = "png")]
#[cfg_attr(docs_rs, doc(cfg(feature = "png")))]
pub mod png;

#[cfg(feature = "jpeg")]
#[cfg_attr(docs_rs, doc(cfg(feature = "jpeg")))]
pub mod jpeg;
#[cfg(feature = "jpeg")]
pub use jpeg::JpegOptions;

mod io;
pub use io::*;
