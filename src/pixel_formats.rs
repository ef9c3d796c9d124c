//! Pixel formats that appear directly in encoded streams.
//!
//! Everything that reaches a tensor is plain interleaved `u8` samples, so the
//! only structured pixel the codecs need is the palette entry.

use bytemuck::{Pod, Zeroable};

/// An RGB value, 8-bits per channel.
///
/// This is the layout of a PNG palette entry, so a `PLTE` chunk's bytes can
/// be cast directly to a slice of these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct RGB8 {
  pub r: u8,
  pub g: u8,
  pub b: u8,
}

impl RGB8 {
  /// The channels in `[r, g, b]` order.
  #[inline]
  #[must_use]
  pub const fn to_array(self) -> [u8; 3] {
    [self.r, self.g, self.b]
  }
}

#[test]
fn test_palette_bytes_cast() {
  let bytes = [1_u8, 2, 3, 4, 5, 6];
  let entries: &[RGB8] = bytemuck::cast_slice(&bytes);
  assert_eq!(entries, &[RGB8 { r: 1, g: 2, b: 3 }, RGB8 { r: 4, g: 5, b: 6 }]);
  assert!(bytemuck::try_cast_slice::<u8, RGB8>(&bytes[..5]).is_err());
}
