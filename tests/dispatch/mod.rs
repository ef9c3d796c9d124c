use imgrw::{
  imread, imsave,
  ndarray::{Array2, Array3},
  ImageFormat, ImgrwError,
};

use super::{rand_bytes, temp_path};

#[test]
fn test_unknown_extension() {
  let path = temp_path("image.bmp");
  std::fs::remove_file(&path).ok();
  let image = Array2::<u8>::zeros((2, 2));
  assert!(!imsave(&path, &image, None).unwrap());
  assert!(!path.exists());
  assert!(imread(&path).unwrap().is_none());
  assert_eq!(ImageFormat::from_path(&path), None);
}

#[cfg(feature = "png")]
#[test]
fn test_png_by_extension_any_case() {
  let path = temp_path("upper.PNG");
  let image = Array3::from_shape_vec((3, 5, 3), rand_bytes(45)).unwrap();
  assert!(imsave(&path, &image, None).unwrap());
  // quality is only looked at for jpeg
  assert!(imsave(&path, &image, Some(500)).unwrap());
  assert_eq!(imread(&path).unwrap(), Some(image.into_dyn()));
  std::fs::remove_file(&path).ok();
}

#[cfg(feature = "jpeg")]
#[test]
fn test_jpeg_by_extension() {
  for name in ["photo.jpg", "photo.JPEG", "photo.jpe"] {
    let path = temp_path(name);
    let image = Array2::from_shape_vec((6, 4), rand_bytes(24)).unwrap();
    assert!(imsave(&path, &image, Some(80)).unwrap(), "{name}");
    assert_eq!(imread(&path).unwrap().unwrap().shape(), &[6, 4], "{name}");
    std::fs::remove_file(&path).ok();
  }
}

#[cfg(feature = "jpeg")]
#[test]
fn test_jpeg_quality_is_checked_by_imsave() {
  let path = temp_path("checked.jpg");
  std::fs::remove_file(&path).ok();
  let image = Array2::<u8>::zeros((2, 2));
  for q in [101, -1] {
    assert!(matches!(imsave(&path, &image, Some(q)), Err(ImgrwError::InvalidArgument(_))));
    assert!(!path.exists());
  }
  assert!(imsave(&path, &image, Some(0)).unwrap());
  assert!(imsave(&path, &image, Some(100)).unwrap());
  std::fs::remove_file(&path).ok();
}
