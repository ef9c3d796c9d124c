use super::*;

use crate::error::CodecFailure;

const fn paeth_predict(a: u8, b: u8, c: u8) -> u8 {
  let a_ = a as i32;
  let b_ = b as i32;
  let c_ = c as i32;
  let p: i32 = a_ + b_ - c_;
  let pa = (p - a_).abs();
  let pb = (p - b_).abs();
  let pc = (p - c_).abs();
  // The order of these tests is fixed by the format, don't rearrange them.
  if pa <= pb && pa <= pc {
    a
  } else if pb <= pc {
    b
  } else {
    c
  }
}

/// Reverses the filter on one filterline, in place.
///
/// * `line` is the filterline without its filter type byte.
/// * `prev` is the previous (already unfiltered) line of the same reduced
///   image, or `None` for the first line, which filters against zeros.
/// * `unit` is the filter's byte distance: bytes per complete pixel, rounded
///   up to 1.
///
/// ## Failure
/// * The filter type is not one of the five defined types.
pub(crate) fn unfilter_line(
  filter: u8, line: &mut [u8], prev: Option<&[u8]>, unit: usize,
) -> Result<(), CodecFailure> {
  let up = |i: usize| prev.and_then(|p| p.get(i).copied()).unwrap_or(0);
  match filter {
    0 => (),
    1 => {
      // Sub
      for i in unit..line.len() {
        line[i] = line[i].wrapping_add(line[i - unit]);
      }
    }
    2 => {
      // Up
      for (i, p) in line.iter_mut().enumerate() {
        *p = p.wrapping_add(up(i));
      }
    }
    3 => {
      // Average
      for i in 0..line.len() {
        let a = if i >= unit { line[i - unit] } else { 0 };
        let avg = ((u16::from(a) + u16::from(up(i))) / 2) as u8;
        line[i] = line[i].wrapping_add(avg);
      }
    }
    4 => {
      // Paeth
      for i in 0..line.len() {
        let (a, c) = if i >= unit { (line[i - unit], up(i - unit)) } else { (0, 0) };
        line[i] = line[i].wrapping_add(paeth_predict(a, up(i), c));
      }
    }
    _ => return Err(CodecFailure::Malformed("unknown filter type")),
  }
  Ok(())
}

/// Passes each pixel of one unfiltered line to `op` with its full-image
/// position.
///
/// Bit-packed samples are unpacked into the low bits of a single byte. 8 and
/// 16 bit pixels are passed as their raw bytes.
fn send_out_pixels<F: FnMut(u32, u32, &[u8])>(
  header: &IHDR, image_level: usize, reduced_width: u32, reduced_y: u32, pixels: &[u8],
  op: &mut F,
) {
  match header.bit_depth {
    1 | 2 | 4 => {
      let depth = u32::from(header.bit_depth);
      let per_byte = 8 / depth;
      let mask = ((1_u32 << depth) - 1) as u8;
      for reduced_x in 0..reduced_width {
        let byte = pixels[(reduced_x / per_byte) as usize];
        let down_shift = 8 - depth * (reduced_x % per_byte + 1);
        let (x, y) = interlaced_pos_to_full_pos(image_level, reduced_x, reduced_y);
        op(x, y, &[(byte >> down_shift) & mask]);
      }
    }
    _ => {
      let bytes_per_pixel = header.bits_per_pixel() / 8;
      for (reduced_x, pixel) in
        pixels.chunks_exact(bytes_per_pixel).take(reduced_width as usize).enumerate()
      {
        let (x, y) = interlaced_pos_to_full_pos(image_level, reduced_x as u32, reduced_y);
        op(x, y, pixel);
      }
    }
  }
}

/// Given the `header`, `decompressed` buffer, and a per-pixel `op`, unfilters
/// the data and passes each pixel output to the `op` as the unfiltering occurs.
///
/// Each call to the `op` gets `|x, y, data|` as arguments, where `x` and `y`
/// are the position of the pixel in the full image (relative to the top
/// left), and `data` is the unfiltered pixel value at that location.
///
/// The data is unfiltered in place, and each filter byte is reset to the "no
/// filter" setting.
///
/// ## Failure
/// * `decompressed` is smaller than the header requires.
/// * A filterline uses an unknown filter type.
pub(crate) fn unfilter_decompressed_data<F>(
  header: &IHDR, mut decompressed: &mut [u8], mut op: F,
) -> Result<(), CodecFailure>
where
  F: FnMut(u32, u32, &[u8]),
{
  let unit = ((header.bits_per_pixel() + 7) / 8).max(1);

  // Non-interlaced data is just level 0, the full image. Interlaced data is
  // levels 1 through 7, the reduced images, in order.
  let levels = reduced_image_dimensions(header.width, header.height);
  let levels = levels.into_iter().enumerate();
  let levels: Vec<(usize, (u32, u32))> =
    if header.is_interlaced { levels.skip(1).collect() } else { levels.take(1).collect() };

  for (image_level, (reduced_width, reduced_height)) in levels {
    if reduced_width == 0 || reduced_height == 0 {
      // The full image is never empty, but a reduced image can be.
      continue;
    }
    let bytes_per_filterline = header.bytes_per_filterline(reduced_width);
    let bytes_used_this_image = bytes_per_filterline.saturating_mul(reduced_height as usize);
    if decompressed.len() < bytes_used_this_image {
      return Err(CodecFailure::Malformed("image data is shorter than the header requires"));
    }
    let (these_bytes, more_bytes) = decompressed.split_at_mut(bytes_used_this_image);
    decompressed = more_bytes;

    let mut prev: Option<&[u8]> = None;
    for (reduced_y, filterline) in these_bytes.chunks_exact_mut(bytes_per_filterline).enumerate() {
      let (f, pixels) = filterline.split_at_mut(1);
      unfilter_line(f[0], pixels, prev, unit)?;
      f[0] = 0;
      let pixels: &[u8] = pixels;
      send_out_pixels(header, image_level, reduced_width, reduced_y as u32, pixels, &mut op);
      prev = Some(pixels);
    }
  }
  Ok(())
}
