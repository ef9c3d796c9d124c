#![forbid(unsafe_code)]

//! Provides the row buffer table used by the PNG codec.

use std::collections::TryReserveError;

/// A slab of `height` rows, each `row_len` bytes, in one allocation.
///
/// Rows are addressed by row number and the whole slab is freed at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RowArena {
  row_len: usize,
  height: usize,
  bytes: Vec<u8>,
}

impl RowArena {
  /// Reserves a zeroed arena.
  ///
  /// ## Failure
  /// * The total size overflows `usize`, or the allocator refuses.
  pub fn try_new(row_len: usize, height: usize) -> Result<Self, TryReserveError> {
    let mut bytes: Vec<u8> = Vec::new();
    // an overflowing request is reported like any other refused reservation
    let total = row_len.checked_mul(height).unwrap_or(usize::MAX);
    bytes.try_reserve_exact(total)?;
    bytes.resize(total, 0);
    Ok(Self { row_len, height, bytes })
  }

  /// Bytes per row.
  #[inline]
  #[must_use]
  pub const fn row_len(&self) -> usize {
    self.row_len
  }

  /// Number of rows.
  #[inline]
  #[must_use]
  pub const fn height(&self) -> usize {
    self.height
  }

  /// Gets row `y`, or `None` if out of bounds.
  #[inline]
  #[must_use]
  pub fn row(&self, y: usize) -> Option<&[u8]> {
    if y < self.height {
      let start = y * self.row_len;
      Some(&self.bytes[start..start + self.row_len])
    } else {
      None
    }
  }

  /// Gets row `y` mutably, or `None` if out of bounds.
  #[inline]
  #[must_use]
  pub fn row_mut(&mut self, y: usize) -> Option<&mut [u8]> {
    if y < self.height {
      let start = y * self.row_len;
      Some(&mut self.bytes[start..start + self.row_len])
    } else {
      None
    }
  }

  /// Iterates the rows top to bottom.
  #[inline]
  pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
    // `chunks_exact(0)` panics, and a zero-width image still has rows
    (0..self.height).map(move |y| &self.bytes[y * self.row_len..(y + 1) * self.row_len])
  }

  /// The whole slab, rows back to back.
  #[inline]
  #[must_use]
  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }
}

#[test]
fn test_row_arena_rows_are_disjoint() {
  let mut arena = RowArena::try_new(3, 4).unwrap();
  for y in 0..4 {
    arena.row_mut(y).unwrap().fill(y as u8 + 1);
  }
  assert_eq!(arena.as_bytes(), &[1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
  assert_eq!(arena.rows().count(), 4);
  assert_eq!(arena.row(2), Some(&[3_u8, 3, 3][..]));
  assert!(arena.row(4).is_none());
  assert!(arena.row_mut(4).is_none());
}

#[test]
fn test_row_arena_refuses_overflow() {
  assert!(RowArena::try_new(usize::MAX, 2).is_err());
}

#[test]
fn test_row_arena_zero_width() {
  let arena = RowArena::try_new(0, 3).unwrap();
  assert_eq!(arena.rows().filter(|r| r.is_empty()).count(), 3);
}
