use std::{collections::TryReserveError, io::Read};

use bitfrob::u8_replicate_bits;
use log::debug;

use super::{unfilter::unfilter_decompressed_data, *};
use crate::{error::CodecFailure, row_arena::RowArena};

/// A decoded PNG, one byte per sample.
#[derive(Debug, Clone)]
pub(crate) struct DecodedPng {
  pub width: u32,
  pub height: u32,
  pub color_model: ColorModel,
  pub rows: RowArena,
}

/// The reader's codec context: the bytes of the stream after the signature.
#[derive(Debug, Default)]
pub(crate) struct PngReadContext {
  stream: Vec<u8>,
}

/// What a `tRNS` chunk means for a particular color type.
#[derive(Debug, Clone, Copy)]
enum Transparency<'b> {
  Opaque,
  Gray(u16),
  Rgb([u16; 3]),
  Alphas(&'b [u8]),
}

impl PngReadContext {
  /// Reserves room for a stream of about `size_hint` bytes.
  pub fn try_new(size_hint: usize) -> Result<Self, TryReserveError> {
    let mut stream = Vec::new();
    stream.try_reserve(size_hint)?;
    Ok(Self { stream })
  }

  /// Reads everything left in `r`.
  pub fn read_stream<R: Read>(&mut self, r: &mut R) -> Result<(), CodecFailure> {
    r.read_to_end(&mut self.stream)?;
    Ok(())
  }

  /// Parses, inflates, unfilters and expands the stream.
  ///
  /// ## Failure
  /// * The first chunk isn't a valid `IHDR`.
  /// * A critical chunk has a bad CRC, or is of a type we don't know.
  /// * There's no `IEND`, no `IDAT`, or an indexed image has no `PLTE`.
  /// * The zlib stream is corrupt or inflates to the wrong size.
  /// * A filterline uses an unknown filter type.
  pub fn decode(&self) -> Result<DecodedPng, CodecFailure> {
    let mut chunks = PngRawChunkIter::after_signature(&self.stream);
    let ihdr = match chunks.next() {
      Some(raw) if raw.chunk_type() == PngRawChunkType::IHDR => {
        if !raw.crc_matches() {
          return Err(CodecFailure::Malformed("IHDR CRC mismatch"));
        }
        IHDR::try_from(raw.data()).map_err(|_| CodecFailure::Malformed("invalid IHDR"))?
      }
      _ => return Err(CodecFailure::Malformed("first chunk is not IHDR")),
    };
    debug!("png header: {ihdr:?}");

    let mut plte: Option<PLTE<'_>> = None;
    let mut trns: Option<tRNS<'_>> = None;
    let mut idats: Vec<&[u8]> = Vec::new();
    let mut saw_end = false;
    for raw in chunks {
      let type_ = raw.chunk_type();
      let crc_ok = raw.crc_matches();
      if type_.is_critical() && !crc_ok {
        return Err(CodecFailure::Malformed("critical chunk CRC mismatch"));
      }
      match PngChunk::try_from(raw) {
        Ok(PngChunk::IHDR(_)) => return Err(CodecFailure::Malformed("duplicate IHDR")),
        Ok(PngChunk::PLTE(p)) => plte = Some(p),
        Ok(PngChunk::tRNS(t)) if crc_ok => trns = Some(t),
        Ok(PngChunk::tRNS(_)) => debug!("skipping tRNS with a bad CRC"),
        Ok(PngChunk::IDAT(d)) => {
          idats.try_reserve(1)?;
          idats.push(d.as_bytes());
        }
        Ok(PngChunk::IEND) => {
          saw_end = true;
          break;
        }
        Err(raw) if type_.is_critical() => {
          debug!("unusable critical chunk: {raw:?}");
          return Err(CodecFailure::Malformed("unusable critical chunk"));
        }
        Err(raw) => debug!("skipping ancillary chunk {:?}", raw.chunk_type()),
      }
    }
    if !saw_end {
      return Err(CodecFailure::Malformed("stream ends before IEND"));
    }
    if idats.is_empty() {
      return Err(CodecFailure::Malformed("no IDAT chunks"));
    }
    let palette: &[RGB8] = match (ihdr.color_type, plte) {
      (PngColorType::Index, None) => {
        return Err(CodecFailure::Malformed("indexed image without a palette"))
      }
      (_, Some(p)) => p.entries(),
      (_, None) => &[],
    };
    let transparency = resolve_transparency(ihdr.color_type, trns);

    let color_model = match (ihdr.color_type, transparency) {
      (PngColorType::Index, Transparency::Opaque) => ColorModel::Rgb,
      (PngColorType::Index, _) => ColorModel::Rgba,
      (PngColorType::Y, Transparency::Gray(_)) => ColorModel::GrayAlpha,
      (PngColorType::RGB, Transparency::Rgb(_)) => ColorModel::Rgba,
      (color_type, _) => color_type.to_color_model().ok_or(CodecFailure::Unsupported)?,
    };

    let zlib_len = ihdr.get_zlib_decompression_requirement();
    let mut zlib_buffer: Vec<u8> = Vec::new();
    zlib_buffer.try_reserve_exact(zlib_len)?;
    zlib_buffer.resize(zlib_len, 0);
    let inflated = miniz_oxide::inflate::decompress_slice_iter_to_slice(
      &mut zlib_buffer,
      idats.iter().copied(),
      true,
      false,
    )
    .map_err(|status| {
      debug!("inflate stopped with {status:?}");
      CodecFailure::Malformed("corrupt zlib stream")
    })?;
    if inflated != zlib_len {
      return Err(CodecFailure::Malformed("image data is shorter than the header requires"));
    }

    let channels = color_model.channel_count();
    let row_len = (ihdr.width as usize)
      .checked_mul(channels)
      .ok_or(CodecFailure::OutOfMemory)?;
    let mut rows = RowArena::try_new(row_len, ihdr.height as usize)?;
    unfilter_decompressed_data(&ihdr, &mut zlib_buffer, |x, y, data| {
      let x = x as usize;
      if let Some(out) =
        rows.row_mut(y as usize).and_then(|row| row.get_mut(x * channels..(x + 1) * channels))
      {
        expand_pixel(&ihdr, palette, transparency, data, out);
      }
    })?;

    Ok(DecodedPng { width: ihdr.width, height: ihdr.height, color_model, rows })
  }
}

/// A `tRNS` of the wrong size for its color type is ignored.
fn resolve_transparency(color_type: PngColorType, trns: Option<tRNS<'_>>) -> Transparency<'_> {
  let t = match trns {
    Some(t) => t,
    None => return Transparency::Opaque,
  };
  let resolved = match color_type {
    PngColorType::Y => t.try_to_grayscale().map(Transparency::Gray),
    PngColorType::RGB => t.try_to_rgb().map(Transparency::Rgb),
    PngColorType::Index => Some(Transparency::Alphas(t.to_alphas())),
    PngColorType::YA | PngColorType::RGBA => None,
  };
  resolved.unwrap_or_else(|| {
    debug!("ignoring {t:?} on a {color_type:?} image");
    Transparency::Opaque
  })
}

/// Writes one pixel as 8-bit samples into `out`.
///
/// `data` is the pixel as [unfilter_decompressed_data] passes it.
fn expand_pixel(
  ihdr: &IHDR, palette: &[RGB8], transparency: Transparency<'_>, data: &[u8], out: &mut [u8],
) {
  let wide = ihdr.bit_depth == 16;
  // high byte of sample `i`
  let sample = |i: usize| if wide { data[2 * i] } else { data[i] };
  // sample `i` at its original depth, for transparency keys
  let raw = |i: usize| {
    if wide {
      u16::from_be_bytes([data[2 * i], data[2 * i + 1]])
    } else {
      u16::from(data[i])
    }
  };
  match ihdr.color_type {
    PngColorType::Y => {
      out[0] = if ihdr.bit_depth < 8 {
        u8_replicate_bits(u32::from(ihdr.bit_depth), data[0])
      } else {
        sample(0)
      };
      if let Transparency::Gray(key) = transparency {
        out[1] = if raw(0) == key { 0 } else { 255 };
      }
    }
    PngColorType::YA => {
      out[0] = sample(0);
      out[1] = sample(1);
    }
    PngColorType::RGB => {
      for c in 0..3 {
        out[c] = sample(c);
      }
      if let Transparency::Rgb(key) = transparency {
        out[3] = if [raw(0), raw(1), raw(2)] == key { 0 } else { 255 };
      }
    }
    PngColorType::RGBA => {
      for c in 0..4 {
        out[c] = sample(c);
      }
    }
    PngColorType::Index => {
      let index = usize::from(data[0]);
      let entry = palette.get(index).copied().unwrap_or_default();
      out[..3].copy_from_slice(&entry.to_array());
      if let Transparency::Alphas(alphas) = transparency {
        out[3] = alphas.get(index).copied().unwrap_or(255);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn header(bit_depth: u8, color_type: PngColorType) -> IHDR {
    IHDR { width: 1, height: 1, bit_depth, color_type, is_interlaced: false }
  }

  #[test]
  fn test_expand_low_bit_gray_replicates() {
    let mut out = [0_u8; 1];
    expand_pixel(&header(1, PngColorType::Y), &[], Transparency::Opaque, &[1], &mut out);
    assert_eq!(out, [255]);
    expand_pixel(&header(2, PngColorType::Y), &[], Transparency::Opaque, &[0b10], &mut out);
    assert_eq!(out, [0b1010_1010]);
    expand_pixel(&header(4, PngColorType::Y), &[], Transparency::Opaque, &[0x7], &mut out);
    assert_eq!(out, [0x77]);
  }

  #[test]
  fn test_expand_16_bit_keeps_high_byte() {
    let mut out = [0_u8; 4];
    let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0];
    expand_pixel(&header(16, PngColorType::RGBA), &[], Transparency::Opaque, &data, &mut out);
    assert_eq!(out, [0x12, 0x56, 0x9A, 0xDE]);
  }

  #[test]
  fn test_expand_gray_key_compares_full_depth() {
    let h = header(16, PngColorType::Y);
    let mut out = [0_u8; 2];
    expand_pixel(&h, &[], Transparency::Gray(0x1234), &[0x12, 0x34], &mut out);
    assert_eq!(out, [0x12, 0]);
    expand_pixel(&h, &[], Transparency::Gray(0x1234), &[0x12, 0x35], &mut out);
    assert_eq!(out, [0x12, 255]);
  }

  #[test]
  fn test_expand_palette() {
    let palette = [RGB8 { r: 1, g: 2, b: 3 }, RGB8 { r: 4, g: 5, b: 6 }];
    let h = header(8, PngColorType::Index);
    let mut rgb = [0_u8; 3];
    expand_pixel(&h, &palette, Transparency::Opaque, &[1], &mut rgb);
    assert_eq!(rgb, [4, 5, 6]);
    // out of range is black
    expand_pixel(&h, &palette, Transparency::Opaque, &[9], &mut rgb);
    assert_eq!(rgb, [0, 0, 0]);
    // short alpha table is opaque past its end
    let mut rgba = [0_u8; 4];
    expand_pixel(&h, &palette, Transparency::Alphas(&[7]), &[0], &mut rgba);
    assert_eq!(rgba, [1, 2, 3, 7]);
    expand_pixel(&h, &palette, Transparency::Alphas(&[7]), &[1], &mut rgba);
    assert_eq!(rgba, [4, 5, 6, 255]);
  }

  #[test]
  fn test_wrong_size_trns_is_ignored() {
    let bytes = [0_u8, 1];
    let t = tRNS::from(&bytes[..]);
    assert!(matches!(resolve_transparency(PngColorType::RGB, Some(t)), Transparency::Opaque));
    assert!(matches!(resolve_transparency(PngColorType::Y, Some(t)), Transparency::Gray(1)));
  }

  fn gray_with_trns(corrupt_trns: bool) -> PngReadContext {
    use crate::png::write::write_chunk;
    let mut ctx = PngReadContext::default();
    write_chunk(&mut ctx.stream, PngRawChunkType::IHDR, &header(8, PngColorType::Y).to_bytes())
      .unwrap();
    write_chunk(&mut ctx.stream, PngRawChunkType::tRNS, &[0, 5]).unwrap();
    if corrupt_trns {
      let last = ctx.stream.len() - 1;
      ctx.stream[last] ^= 0xFF;
    }
    let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&[0, 5], 6);
    write_chunk(&mut ctx.stream, PngRawChunkType::IDAT, &zlib).unwrap();
    write_chunk(&mut ctx.stream, PngRawChunkType::IEND, &[]).unwrap();
    ctx
  }

  #[test]
  fn test_trns_with_bad_crc_is_skipped() {
    let good = gray_with_trns(false).decode().unwrap();
    assert_eq!(good.color_model, ColorModel::GrayAlpha);
    assert_eq!(good.rows.row(0), Some(&[5_u8, 0][..]));

    let bad = gray_with_trns(true).decode().unwrap();
    assert_eq!(bad.color_model, ColorModel::Gray);
    assert_eq!(bad.rows.row(0), Some(&[5_u8][..]));
  }

  #[test]
  fn test_decode_requires_ihdr_first() {
    let mut ctx = PngReadContext::default();
    crate::png::write::write_chunk(&mut ctx.stream, PngRawChunkType::IEND, &[]).unwrap();
    assert!(matches!(ctx.decode(), Err(CodecFailure::Malformed(_))));
  }
}
