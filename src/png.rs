#![forbid(unsafe_code)]

//! Module for working with PNG data.
//!
//! * [Portable Network Graphics Specification (Second Edition)][png-spec]
//!
//! [png-spec]: https://www.w3.org/TR/2003/REC-PNG-20031110/
//!
//! This is the PNG codec underneath [`read_png`](crate::read_png) and
//! [`save_png`](crate::save_png). It's split into a few stages:
//!
//! * Chunk parsing: [`PngRawChunkIter`] walks the chunks of a stream that's
//!   fully in memory, and [`PngChunk`] gives structure to the few chunk types
//!   that matter for pixels ([`IHDR`], [`PLTE`], [`tRNS`], [`IDAT`], `IEND`).
//! * Decompression: all `IDAT` chunks form one Zlib stream, inflated with
//!   `miniz_oxide` into a buffer sized by
//!   [`get_zlib_decompression_requirement`](IHDR::get_zlib_decompression_requirement).
//! * Unfiltering: each filterline is reconstructed in place, and interlaced
//!   images are walked as their 7 reduced images. Every pixel is passed out
//!   with its full-image position.
//! * Expansion: the reader turns whatever the file holds into 8 bits per
//!   sample, one sample per byte. Palettes become RGB, transparency chunks
//!   become an alpha channel, and 16-bit samples keep their high byte.
//!
//! Writing always produces 8-bit, non-interlaced images with every
//! filterline using filter type 0.
//!
//! ## Parsing Errors
//!
//! Unlike a viewer, a file I/O layer should refuse damaged data rather than
//! hand out a partial image. So the reader is strict about the critical
//! chunks: their CRCs must match, the stream must contain `IEND`, and the
//! inflated image data must be the exact size the header implies. Ancillary
//! chunks are skipped when they can't be parsed.

use core::fmt::{Debug, Write};

use crate::{color::ColorModel, pixel_formats::RGB8};

mod crc32;
pub use crc32::png_crc;

mod unfilter;

mod read;
pub(crate) use read::PngReadContext;

mod write;
pub(crate) use write::PngWriteContext;

/// The first eight bytes of a PNG datastream should match these bytes.
pub const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// The largest width or height the format allows.
pub const PNG_MAX_DIMENSION: u32 = (1 << 31) - 1;

/// The four letter type of a chunk.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PngRawChunkType(pub [u8; 4]);
#[allow(nonstandard_style)]
impl PngRawChunkType {
  pub const IHDR: Self = Self(*b"IHDR");
  pub const PLTE: Self = Self(*b"PLTE");
  pub const IDAT: Self = Self(*b"IDAT");
  pub const IEND: Self = Self(*b"IEND");
  pub const tRNS: Self = Self(*b"tRNS");

  /// Critical chunks have an uppercase first letter.
  ///
  /// A decoder that doesn't understand a critical chunk can't decode the
  /// image.
  #[inline]
  #[must_use]
  pub const fn is_critical(self) -> bool {
    (self.0[0] & 0x20) == 0
  }
}
impl Debug for PngRawChunkType {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    for byte in self.0 {
      f.write_char(byte as char)?;
    }
    Ok(())
  }
}

/// An unparsed chunk from a PNG.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PngRawChunk<'b> {
  type_: PngRawChunkType,
  data: &'b [u8],
  declared_crc: u32,
}
impl Debug for PngRawChunk<'_> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("PngRawChunk")
      .field("type_", &self.type_)
      .field("data", &(&self.data[..self.data.len().min(12)], self.data.len()))
      .field("declared_crc", &self.declared_crc)
      .finish()
  }
}
impl<'b> PngRawChunk<'b> {
  /// The chunk's type.
  #[inline]
  #[must_use]
  pub const fn chunk_type(&self) -> PngRawChunkType {
    self.type_
  }

  /// The chunk's data bytes.
  #[inline]
  #[must_use]
  pub const fn data(&self) -> &'b [u8] {
    self.data
  }

  /// If the CRC stored in the file matches the chunk's type and data.
  #[inline]
  #[must_use]
  pub fn crc_matches(&self) -> bool {
    crc32::chunk_crc(self.type_, self.data) == self.declared_crc
  }
}

/// An iterator that produces successive raw chunks from PNG bytes.
///
/// Iteration stops early (without error) if the data is cut off part way
/// through a chunk, so callers that care about truncation should look for
/// `IEND`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PngRawChunkIter<'b>(&'b [u8]);
impl<'b> PngRawChunkIter<'b> {
  /// Pass the full PNG bytes, it will remove the PNG signature automatically.
  pub const fn new(bytes: &'b [u8]) -> Self {
    match bytes {
      [_, _, _, _, _, _, _, _, rest @ ..] => Self(rest),
      _ => Self(&[]),
    }
  }

  /// Pass the bytes that follow the signature.
  pub const fn after_signature(bytes: &'b [u8]) -> Self {
    Self(bytes)
  }

  fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
    if self.0.len() < N {
      self.0 = &[];
      return None;
    }
    let (head, rest) = self.0.split_at(N);
    self.0 = rest;
    head.try_into().ok()
  }
}
impl<'b> Iterator for PngRawChunkIter<'b> {
  type Item = PngRawChunk<'b>;
  fn next(&mut self) -> Option<Self::Item> {
    let chunk_len = u32::from_be_bytes(self.take::<4>()?) as usize;
    let type_ = PngRawChunkType(self.take::<4>()?);
    let data: &'b [u8] = if self.0.len() >= chunk_len {
      let (data, rest) = self.0.split_at(chunk_len);
      self.0 = rest;
      data
    } else {
      self.0 = &[];
      return None;
    };
    let declared_crc = u32::from_be_bytes(self.take::<4>()?);
    Some(PngRawChunk { type_, data, declared_crc })
  }
}

/// A parsed PNG chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(nonstandard_style)]
pub enum PngChunk<'b> {
  /// Image Header
  IHDR(IHDR),
  /// Palette
  PLTE(PLTE<'b>),
  /// Transparency
  tRNS(tRNS<'b>),
  /// Image Data
  IDAT(IDAT<'b>),
  /// Image End
  IEND,
}
impl<'b> TryFrom<PngRawChunk<'b>> for PngChunk<'b> {
  type Error = PngRawChunk<'b>;
  fn try_from(raw: PngRawChunk<'b>) -> Result<Self, Self::Error> {
    Ok(match raw.type_ {
      PngRawChunkType::IHDR => {
        // this can fail, so use `return` to avoid the outer Ok()
        return IHDR::try_from(raw.data).map(PngChunk::IHDR).map_err(|_| raw);
      }
      PngRawChunkType::PLTE => match bytemuck::try_cast_slice::<u8, RGB8>(raw.data) {
        Ok(entries) if !entries.is_empty() && entries.len() <= 256 => {
          PngChunk::PLTE(PLTE::from(entries))
        }
        _ => return Err(raw),
      },
      PngRawChunkType::tRNS => PngChunk::tRNS(tRNS::from(raw.data)),
      PngRawChunkType::IDAT => PngChunk::IDAT(IDAT::from(raw.data)),
      PngRawChunkType::IEND => PngChunk::IEND,
      _ => return Err(raw),
    })
  }
}

/// The types of color that PNG supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PngColorType {
  /// Greyscale
  Y = 0,
  /// Red, Green, Blue
  RGB = 2,
  /// Index into a palette.
  ///
  /// The palette will have RGB8 data. There may optionally be a transparency
  /// chunk.
  Index = 3,
  /// Greyscale + Alpha
  YA = 4,
  /// Red, Green, Blue, Alpha
  RGBA = 6,
}
impl PngColorType {
  /// The number of channels in this type of color.
  pub const fn channel_count(self) -> usize {
    match self {
      Self::Y => 1,
      Self::RGB => 3,
      Self::Index => 1,
      Self::YA => 2,
      Self::RGBA => 4,
    }
  }

  /// The direct color model for this color type.
  ///
  /// Indexed color has no direct model until it's been expanded.
  pub const fn to_color_model(self) -> Option<ColorModel> {
    match self {
      Self::Y => Some(ColorModel::Gray),
      Self::YA => Some(ColorModel::GrayAlpha),
      Self::RGB => Some(ColorModel::Rgb),
      Self::RGBA => Some(ColorModel::Rgba),
      Self::Index => None,
    }
  }
}
impl From<ColorModel> for PngColorType {
  #[inline]
  fn from(model: ColorModel) -> Self {
    match model {
      ColorModel::Gray => Self::Y,
      ColorModel::GrayAlpha => Self::YA,
      ColorModel::Rgb => Self::RGB,
      ColorModel::Rgba => Self::RGBA,
    }
  }
}
impl TryFrom<u8> for PngColorType {
  type Error = ();
  fn try_from(value: u8) -> Result<Self, Self::Error> {
    Ok(match value {
      0 => PngColorType::Y,
      2 => PngColorType::RGB,
      3 => PngColorType::Index,
      4 => PngColorType::YA,
      6 => PngColorType::RGBA,
      _ => return Err(()),
    })
  }
}

/// Image Header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IHDR {
  /// width in pixels
  pub width: u32,
  /// height in pixels
  pub height: u32,
  /// bits per channel
  pub bit_depth: u8,
  /// pixel color type
  pub color_type: PngColorType,
  /// if the image data is stored interlaced.
  pub is_interlaced: bool,
}
impl IHDR {
  /// Bytes in one filterline of an image `width` pixels wide: the filter
  /// type byte plus the packed pixels, rounded up to a whole byte.
  #[doc(hidden)]
  pub const fn bytes_per_filterline(&self, width: u32) -> usize {
    1 + ((self.bits_per_pixel() * (width as usize)) + 7) / 8
  }

  /// Gets the buffer size required to perform Zlib decompression.
  pub fn get_zlib_decompression_requirement(&self) -> usize {
    let images = reduced_image_dimensions(self.width, self.height);
    let images: &[(u32, u32)] = if self.is_interlaced { &images[1..] } else { &images[..1] };
    images
      .iter()
      .filter(|(w, h)| *w > 0 && *h > 0)
      .map(|&(w, h)| self.bytes_per_filterline(w).saturating_mul(h as usize))
      .fold(0_usize, usize::saturating_add)
  }

  /// Bits per complete pixel.
  #[doc(hidden)]
  pub const fn bits_per_pixel(&self) -> usize {
    (self.bit_depth as usize) * self.color_type.channel_count()
  }

  /// The header bytes as stored in an `IHDR` chunk.
  ///
  /// Compression and filter method are always 0, the only values defined.
  #[must_use]
  pub fn to_bytes(&self) -> [u8; 13] {
    let mut out = [0_u8; 13];
    out[0..4].copy_from_slice(&self.width.to_be_bytes());
    out[4..8].copy_from_slice(&self.height.to_be_bytes());
    out[8] = self.bit_depth;
    out[9] = self.color_type as u8;
    out[12] = self.is_interlaced as u8;
    out
  }
}
impl TryFrom<&[u8]> for IHDR {
  type Error = ();
  fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
    match value {
      [w0, w1, w2, w3, h0, h1, h2, h3, bit_depth, color_type, 0, 0, interlace_method] => {
        let width = u32::from_be_bytes([*w0, *w1, *w2, *w3]);
        let height = u32::from_be_bytes([*h0, *h1, *h2, *h3]);
        if width == 0 || height == 0 || width > PNG_MAX_DIMENSION || height > PNG_MAX_DIMENSION {
          return Err(());
        }
        Ok(Self {
          width,
          height,
          bit_depth: match *color_type {
            0 if [1, 2, 4, 8, 16].contains(bit_depth) => *bit_depth,
            2 if [8, 16].contains(bit_depth) => *bit_depth,
            3 if [1, 2, 4, 8].contains(bit_depth) => *bit_depth,
            4 if [8, 16].contains(bit_depth) => *bit_depth,
            6 if [8, 16].contains(bit_depth) => *bit_depth,
            _ => return Err(()),
          },
          color_type: PngColorType::try_from(*color_type)?,
          is_interlaced: match interlace_method {
            0 => false,
            1 => true,
            _ => return Err(()),
          },
        })
      }
      _ => Err(()),
    }
  }
}

/// Transparency data
///
/// What the bytes mean depends on the image's color type:
/// * Greyscale: one big-endian `u16`, the transparent grey level.
/// * RGB: three big-endian `u16`, the transparent color.
/// * Indexed: one alpha byte per palette entry, possibly fewer entries than
///   the palette.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(nonstandard_style)]
pub struct tRNS<'b>(&'b [u8]);
impl<'b> From<&'b [u8]> for tRNS<'b> {
  #[inline]
  fn from(data: &'b [u8]) -> Self {
    Self(data)
  }
}
impl Debug for tRNS<'_> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_tuple("tRNS").field(&&self.0[..self.0.len().min(12)]).field(&self.0.len()).finish()
  }
}
impl<'b> tRNS<'b> {
  /// Gets the grayscale value that is transparent.
  ///
  /// Fails when the chunk has the wrong length for grayscale.
  #[inline]
  pub const fn try_to_grayscale(&self) -> Option<u16> {
    match self.0 {
      [y0, y1] => Some(u16::from_be_bytes([*y0, *y1])),
      _ => None,
    }
  }
  /// Gets the RGB value that is transparent.
  ///
  /// Fails when the chunk has the wrong length for rgb.
  #[inline]
  pub const fn try_to_rgb(&self) -> Option<[u16; 3]> {
    match self.0 {
      [r0, r1, g0, g1, b0, b1] => Some([
        u16::from_be_bytes([*r0, *r1]),
        u16::from_be_bytes([*g0, *g1]),
        u16::from_be_bytes([*b0, *b1]),
      ]),
      _ => None,
    }
  }
  /// Gets the alpha values for each palette index.
  pub const fn to_alphas(&self) -> &'b [u8] {
    self.0
  }
}

/// Palette data
///
/// Palette entries are always RGB.
///
/// If you want to have a paletted image with transparency then the transparency
/// info goes in a separate transparency chunk.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PLTE<'b>(&'b [RGB8]);
impl<'b> From<&'b [RGB8]> for PLTE<'b> {
  #[inline]
  fn from(entries: &'b [RGB8]) -> Self {
    Self(entries)
  }
}
impl Debug for PLTE<'_> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    // currently prints no more than 4 palette entries
    f.debug_tuple("PLTE").field(&&self.0[..self.0.len().min(4)]).field(&self.0.len()).finish()
  }
}
impl<'b> PLTE<'b> {
  /// Gets the entries as a slice.
  pub fn entries(&self) -> &'b [RGB8] {
    self.0
  }
}

/// Image Data.
///
/// * Image data is stored with Zlib compression applied.
/// * Images can have more than one IDAT chunk. They should all be stored in a
///   row. Multiple chunks are treated as a single Zlib datastream.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IDAT<'b>(&'b [u8]);
impl<'b> From<&'b [u8]> for IDAT<'b> {
  #[inline]
  fn from(data: &'b [u8]) -> Self {
    Self(data)
  }
}
impl Debug for IDAT<'_> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_tuple("IDAT").field(&&self.0[..self.0.len().min(12)]).field(&self.0.len()).finish()
  }
}
impl<'b> IDAT<'b> {
  /// The compressed bytes of this chunk.
  pub const fn as_bytes(&self) -> &'b [u8] {
    self.0
  }
}

/// Checks if the PNG's initial 8 bytes are correct.
///
/// * If this is the case, the rest of the bytes are very likely PNG data.
/// * If this is *not* the case, the rest of the bytes are very likely *not* PNG
///   data.
pub const fn is_png_header_correct(bytes: &[u8]) -> bool {
  matches!(bytes, [137, 80, 78, 71, 13, 10, 26, 10, ..])
}

/// Given the dimensions of the full PNG image, computes the size of each
/// reduced image.
///
/// The PNG interlacing scheme converts a full image to 7 reduced images, each
/// with potentially separate dimensions.
///
/// The output uses index 0 as the base image size, and indexes 1 through 7 for
/// the size of reduced images 1 through 7.
#[inline]
#[must_use]
const fn reduced_image_dimensions(full_width: u32, full_height: u32) -> [(u32, u32); 8] {
  // ```
  // 1 6 4 6 2 6 4 6
  // 7 7 7 7 7 7 7 7
  // 5 6 5 6 5 6 5 6
  // 7 7 7 7 7 7 7 7
  // 3 6 4 6 3 6 4 6
  // 7 7 7 7 7 7 7 7
  // 5 6 5 6 5 6 5 6
  // 7 7 7 7 7 7 7 7
  // ```
  let mut out = [(full_width, full_height); 8];
  let mut level = 1;
  while level < 8 {
    let (x_step, x_start, y_step, y_start) = ADAM7[level];
    out[level] = (
      reduced_extent(full_width, x_start, x_step),
      reduced_extent(full_height, y_start, y_step),
    );
    level += 1;
  }
  out
}

/// How many of `0..full` are hit by `start, start + step, ...`.
#[inline]
#[must_use]
const fn reduced_extent(full: u32, start: u32, step: u32) -> u32 {
  if full > start {
    (full - start + step - 1) / step
  } else {
    0
  }
}

/// `(x_step, x_start, y_step, y_start)` for each reduced image level.
///
/// Level 0 is the full, non-interlaced image.
const ADAM7: [(u32, u32, u32, u32); 8] = [
  (1, 0, 1, 0),
  (8, 0, 8, 0),
  (8, 4, 8, 0),
  (4, 0, 8, 4),
  (4, 2, 4, 0),
  (2, 0, 4, 2),
  (2, 1, 2, 0),
  (1, 0, 2, 1),
];

/// Converts a reduced image location into the full image location.
///
/// For consistency between this function and the [reduced_image_dimensions]
/// function, when giving an `image_level` of 0 the output will be the same as
/// the input.
#[inline]
#[must_use]
const fn interlaced_pos_to_full_pos(
  image_level: usize, reduced_x: u32, reduced_y: u32,
) -> (u32, u32) {
  let (x_step, x_start, y_step, y_start) = ADAM7[image_level];
  (reduced_x * x_step + x_start, reduced_y * y_step + y_start)
}

#[test]
fn test_reduced_image_dimensions() {
  assert_eq!(reduced_image_dimensions(0, 0), [(0, 0); 8]);
  // one
  for (w, ex) in (1..=8).zip([1, 1, 1, 1, 1, 1, 1, 1]) {
    assert_eq!(reduced_image_dimensions(w, 0)[1].0, ex, "failed w:{w}");
  }
  // two
  for (w, ex) in (1..=8).zip([0, 0, 0, 0, 1, 1, 1, 1]) {
    assert_eq!(reduced_image_dimensions(w, 0)[2].0, ex, "failed w:{w}");
  }
  // three
  for (h, ex) in (1..=8).zip([0, 0, 0, 0, 1, 1, 1, 1]) {
    assert_eq!(reduced_image_dimensions(0, h)[3].1, ex, "failed h: {h}");
  }
  // four
  for (w, ex) in (1..=8).zip([0, 0, 1, 1, 1, 1, 2, 2]) {
    assert_eq!(reduced_image_dimensions(w, 0)[4].0, ex, "failed w: {w}");
  }
  // five
  for (h, ex) in (1..=8).zip([0, 0, 1, 1, 1, 1, 2, 2]) {
    assert_eq!(reduced_image_dimensions(0, h)[5].1, ex, "failed h: {h}");
  }
  // six
  for (w, ex) in (1..=8).zip([0, 1, 1, 2, 2, 3, 3, 4]) {
    assert_eq!(reduced_image_dimensions(w, 0)[6].0, ex, "failed w: {w}");
  }
  // seven
  for (h, ex) in (1..=8).zip([0, 1, 1, 2, 2, 3, 3, 4]) {
    assert_eq!(reduced_image_dimensions(0, h)[7].1, ex, "failed h: {h}");
  }
  //
  assert_eq!(
    reduced_image_dimensions(8, 8),
    [
      (8, 8), // zeroth
      (1, 1), // one
      (1, 1), // two
      (2, 1), // three
      (2, 2), // four
      (4, 2), // five
      (4, 4), // six
      (8, 4), // seven
    ]
  );
}

#[test]
fn test_interlaced_positions_cover_the_image_once() {
  let (w, h) = (13_u32, 9_u32);
  let mut hits = vec![0_u8; (w * h) as usize];
  for (level, (rw, rh)) in reduced_image_dimensions(w, h).into_iter().enumerate().skip(1) {
    for ry in 0..rh {
      for rx in 0..rw {
        let (x, y) = interlaced_pos_to_full_pos(level, rx, ry);
        hits[(y * w + x) as usize] += 1;
      }
    }
  }
  assert!(hits.iter().all(|&n| n == 1));
}

#[test]
fn test_ihdr_round_trips_through_bytes() {
  let ihdr = IHDR {
    width: 37,
    height: 2,
    bit_depth: 8,
    color_type: PngColorType::YA,
    is_interlaced: false,
  };
  assert_eq!(IHDR::try_from(&ihdr.to_bytes()[..]), Ok(ihdr));
}

#[test]
fn test_ihdr_rejects_bad_headers() {
  let good = IHDR { width: 1, height: 1, bit_depth: 8, color_type: PngColorType::RGB, is_interlaced: false }
    .to_bytes();
  let mut zero_width = good;
  zero_width[0..4].copy_from_slice(&0_u32.to_be_bytes());
  assert!(IHDR::try_from(&zero_width[..]).is_err());
  let mut bad_depth = good;
  bad_depth[8] = 4;
  assert!(IHDR::try_from(&bad_depth[..]).is_err());
  let mut bad_compression = good;
  bad_compression[10] = 1;
  assert!(IHDR::try_from(&bad_compression[..]).is_err());
  assert!(IHDR::try_from(&good[..12]).is_err());
}

#[test]
fn test_chunk_iter_stops_on_truncation() {
  let mut bytes = PNG_SIGNATURE.to_vec();
  write::write_chunk(&mut bytes, PngRawChunkType::IEND, &[]).unwrap();
  let full: Vec<_> = PngRawChunkIter::new(&bytes).collect();
  assert_eq!(full.len(), 1);
  assert_eq!(full[0].chunk_type(), PngRawChunkType::IEND);
  assert!(full[0].crc_matches());
  assert_eq!(PngRawChunkIter::new(&bytes[..bytes.len() - 1]).count(), 0);
}

#[test]
fn test_critical_chunk_types() {
  assert!(PngRawChunkType::IDAT.is_critical());
  assert!(!PngRawChunkType::tRNS.is_critical());
}
