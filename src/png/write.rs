use std::{collections::TryReserveError, io};

use log::debug;

use super::*;
use crate::{error::CodecFailure, row_arena::RowArena};

/// Zlib level for `IDAT` data.
const COMPRESSION_LEVEL: u8 = 6;

/// Chunk lengths are limited to 31 bits.
const MAX_CHUNK_LEN: usize = PNG_MAX_DIMENSION as usize;

/// The writer's codec context: the header fields and one arena row per
/// image row.
#[derive(Debug)]
pub(crate) struct PngWriteContext {
  width: usize,
  height: usize,
  color_model: ColorModel,
  rows: RowArena,
}

impl PngWriteContext {
  /// Reserves the row arena for an 8-bit image.
  ///
  /// Dimensions aren't checked against the format's limits until
  /// [`write_png`](Self::write_png).
  pub fn try_new(
    width: usize, height: usize, color_model: ColorModel,
  ) -> Result<Self, TryReserveError> {
    let row_len = width.checked_mul(color_model.channel_count()).unwrap_or(usize::MAX);
    let rows = RowArena::try_new(row_len, height)?;
    Ok(Self { width, height, color_model, rows })
  }

  /// The rows to fill before writing.
  #[inline]
  pub fn rows_mut(&mut self) -> &mut RowArena {
    &mut self.rows
  }

  fn header(&self) -> Result<IHDR, CodecFailure> {
    let dim = |d: usize| match u32::try_from(d) {
      Ok(d) if d > 0 && d <= PNG_MAX_DIMENSION => Ok(d),
      _ => Err(CodecFailure::Malformed("image dimensions out of range for PNG")),
    };
    Ok(IHDR {
      width: dim(self.width)?,
      height: dim(self.height)?,
      bit_depth: 8,
      color_type: PngColorType::from(self.color_model),
      is_interlaced: false,
    })
  }

  /// Writes the whole datastream.
  ///
  /// Every filterline uses filter type 0.
  ///
  /// ## Failure
  /// * Width or height is 0 or more than 2^31-1.
  /// * The filterline buffer couldn't be reserved.
  /// * Writing to `w` failed.
  pub fn write_png<W: io::Write>(&self, w: &mut W) -> Result<(), CodecFailure> {
    let ihdr = self.header()?;
    debug!("png header: {ihdr:?}");
    let filtered_len = (self.rows.row_len() + 1)
      .checked_mul(self.rows.height())
      .ok_or(CodecFailure::OutOfMemory)?;
    let mut filtered: Vec<u8> = Vec::new();
    filtered.try_reserve_exact(filtered_len)?;
    for row in self.rows.rows() {
      filtered.push(0);
      filtered.extend_from_slice(row);
    }
    let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&filtered, COMPRESSION_LEVEL);

    w.write_all(&PNG_SIGNATURE)?;
    write_chunk(w, PngRawChunkType::IHDR, &ihdr.to_bytes())?;
    for part in compressed.chunks(MAX_CHUNK_LEN) {
      write_chunk(w, PngRawChunkType::IDAT, part)?;
    }
    write_chunk(w, PngRawChunkType::IEND, &[])?;
    Ok(())
  }
}

/// Writes length, type, data and CRC of one chunk.
///
/// `data` must be no longer than 2^31-1 bytes.
pub(crate) fn write_chunk<W: io::Write>(
  w: &mut W, type_: PngRawChunkType, data: &[u8],
) -> io::Result<()> {
  w.write_all(&(data.len() as u32).to_be_bytes())?;
  w.write_all(&type_.0)?;
  w.write_all(data)?;
  w.write_all(&crc32::chunk_crc(type_, data).to_be_bytes())
}
