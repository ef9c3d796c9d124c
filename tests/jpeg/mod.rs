use imgrw::{
  ndarray::{Array2, Array3, Array4},
  read_jpeg, save_jpeg, ImgrwError, IoReason, JpegOptions,
};

use super::{init_logger, rand_bytes, temp_path};

#[test]
fn test_jpeg_round_trip_keeps_shape() {
  init_logger();
  let path = temp_path("round_trip.jpg");
  for h in [1, 2, 37] {
    for w in [1, 2, 37] {
      let gray = Array2::from_shape_vec((h, w), rand_bytes(h * w)).unwrap();
      assert!(save_jpeg(&path, &gray, JpegOptions::default()).unwrap());
      let back = read_jpeg(&path).unwrap();
      assert_eq!(back.shape(), &[h, w], "gray h:{h} w:{w}");

      let rgb = Array3::from_shape_vec((h, w, 3), rand_bytes(h * w * 3)).unwrap();
      assert!(save_jpeg(&path, &rgb, JpegOptions::default()).unwrap());
      let back = read_jpeg(&path).unwrap();
      assert_eq!(back.shape(), &[h, w, 3], "rgb h:{h} w:{w}");
    }
  }
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_jpeg_flat_color_is_close() {
  let path = temp_path("flat.jpg");
  let rgb = Array3::from_shape_fn((16, 16, 3), |(_, _, c)| [200_u8, 100, 50][c]);
  assert!(save_jpeg(&path, &rgb, JpegOptions::with_quality(100)).unwrap());
  let back = read_jpeg(&path).unwrap();
  for (a, b) in back.iter().zip(rgb.iter()) {
    assert!(a.abs_diff(*b) <= 4, "{a} vs {b}");
  }
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_jpeg_four_components_round_trip_as_four() {
  let path = temp_path("four.jpg");
  for (h, w) in [(1, 1), (8, 8), (37, 2)] {
    let image = Array3::from_shape_vec((h, w, 4), rand_bytes(h * w * 4)).unwrap();
    assert!(save_jpeg(&path, &image, JpegOptions::default()).unwrap());
    assert_eq!(read_jpeg(&path).unwrap().shape(), &[h, w, 4]);
  }
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_jpeg_gray_alpha_drops_the_alpha() {
  let path = temp_path("gray_alpha.jpg");
  let image = Array3::from_shape_fn((8, 8, 2), |(_, _, c)| [120_u8, 30][c]);
  assert!(save_jpeg(&path, &image, JpegOptions::with_quality(100)).unwrap());
  let back = read_jpeg(&path).unwrap();
  assert_eq!(back.shape(), &[8, 8]);
  assert!(back.iter().all(|&v| v.abs_diff(120) <= 2));
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_jpeg_unusable_channel_counts_fail_softly() {
  let path = temp_path("soft_fail.jpg");
  let five = Array3::<u8>::zeros((4, 4, 5));
  assert!(!save_jpeg(&path, &five, JpegOptions::default()).unwrap());
  let too_wide = Array2::<u8>::zeros((1, 70_000));
  assert!(!save_jpeg(&path, &too_wide, JpegOptions::default()).unwrap());
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_jpeg_default_quality_is_95() {
  let default_path = temp_path("q_default.jpg");
  let explicit_path = temp_path("q_95.jpg");
  let image = Array3::from_shape_vec((13, 11, 3), rand_bytes(13 * 11 * 3)).unwrap();
  assert!(save_jpeg(&default_path, &image, JpegOptions::default()).unwrap());
  assert!(save_jpeg(&explicit_path, &image, JpegOptions::with_quality(95)).unwrap());
  assert_eq!(std::fs::read(&default_path).unwrap(), std::fs::read(&explicit_path).unwrap());
  std::fs::remove_file(&default_path).ok();
  std::fs::remove_file(&explicit_path).ok();
}

#[test]
fn test_jpeg_out_of_range_quality_is_clamped() {
  let low_path = temp_path("q_low.jpg");
  let one_path = temp_path("q_1.jpg");
  let image = Array2::from_shape_vec((9, 9), rand_bytes(81)).unwrap();
  assert!(save_jpeg(&low_path, &image, JpegOptions::with_quality(-20)).unwrap());
  assert!(save_jpeg(&one_path, &image, JpegOptions::with_quality(1)).unwrap());
  assert_eq!(std::fs::read(&low_path).unwrap(), std::fs::read(&one_path).unwrap());
  std::fs::remove_file(&low_path).ok();
  std::fs::remove_file(&one_path).ok();
}

#[test]
fn test_jpeg_missing_file_is_io_error() {
  let err = read_jpeg(temp_path("does_not_exist.jpg")).unwrap_err();
  assert_eq!(err.io_reason(), Some(IoReason::Open));
}

#[test]
fn test_jpeg_garbage_is_io_error() {
  let path = temp_path("garbage.jpg");
  std::fs::write(&path, rand_bytes(512)).unwrap();
  let err = read_jpeg(&path).unwrap_err();
  assert_eq!(err.io_reason(), Some(IoReason::Decode));
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_jpeg_truncated_then_retry() {
  let path = temp_path("truncate_source.jpg");
  let cut_path = temp_path("truncated.jpg");
  let image = Array3::from_shape_vec((24, 24, 3), rand_bytes(24 * 24 * 3)).unwrap();
  assert!(save_jpeg(&path, &image, JpegOptions::default()).unwrap());
  let full = std::fs::read(&path).unwrap();
  std::fs::write(&cut_path, &full[..40]).unwrap();
  assert!(read_jpeg(&cut_path).is_err());
  assert_eq!(read_jpeg(&path).unwrap().shape(), &[24, 24, 3]);
  std::fs::remove_file(&path).ok();
  std::fs::remove_file(&cut_path).ok();
}

#[test]
fn test_jpeg_bad_rank_is_invalid_shape() {
  let path = temp_path("rank4.jpg");
  std::fs::remove_file(&path).ok();
  let image = Array4::<u8>::zeros((2, 2, 3, 1));
  assert!(matches!(
    save_jpeg(&path, &image, JpegOptions::default()),
    Err(ImgrwError::InvalidShape(_))
  ));
  assert!(!path.exists());
}
