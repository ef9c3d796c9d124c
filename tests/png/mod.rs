use imgrw::{
  ndarray::{Array2, Array3, ArrayD, IxDyn},
  png::{png_crc, PngColorType, PngRawChunkIter, IHDR},
  read_png, save_png, ImgrwError, IoReason,
};
use walkdir::WalkDir;

use super::{init_logger, rand_bytes, temp_path};

fn rand_tensor(h: usize, w: usize, c: usize) -> ArrayD<u8> {
  let shape: Vec<usize> = if c == 1 { vec![h, w] } else { vec![h, w, c] };
  ArrayD::from_shape_vec(IxDyn(&shape), rand_bytes(h * w * c)).unwrap()
}

fn push_chunk(out: &mut Vec<u8>, type_: &[u8; 4], data: &[u8]) {
  out.extend_from_slice(&(data.len() as u32).to_be_bytes());
  out.extend_from_slice(type_);
  out.extend_from_slice(data);
  let crc = png_crc(type_.iter().copied().chain(data.iter().copied()));
  out.extend_from_slice(&crc.to_be_bytes());
}

/// Builds a PNG by hand, `filtered` being the already filtered image data.
fn build_png(ihdr: IHDR, extra: &[(&[u8; 4], &[u8])], filtered: &[u8]) -> Vec<u8> {
  let mut out = vec![137, 80, 78, 71, 13, 10, 26, 10];
  push_chunk(&mut out, b"IHDR", &ihdr.to_bytes());
  for (type_, data) in extra {
    push_chunk(&mut out, type_, data);
  }
  push_chunk(&mut out, b"IDAT", &miniz_oxide::deflate::compress_to_vec_zlib(filtered, 6));
  push_chunk(&mut out, b"IEND", &[]);
  out
}

fn header(width: u32, height: u32, bit_depth: u8, color_type: PngColorType) -> IHDR {
  IHDR { width, height, bit_depth, color_type, is_interlaced: false }
}

fn decode_bytes(name: &str, bytes: &[u8]) -> Result<ArrayD<u8>, ImgrwError> {
  let path = temp_path(name);
  std::fs::write(&path, bytes).unwrap();
  let out = read_png(&path);
  std::fs::remove_file(&path).ok();
  out
}

#[test]
fn test_png_round_trip_all_shapes() {
  init_logger();
  let path = temp_path("round_trip.png");
  for h in [1, 2, 37] {
    for w in [1, 2, 37] {
      for c in 1..=4 {
        let image = rand_tensor(h, w, c);
        assert!(save_png(&path, &image).unwrap(), "save failed h:{h} w:{w} c:{c}");
        let back = read_png(&path).unwrap();
        assert_eq!(back.ndim(), if c == 1 { 2 } else { 3 });
        assert_eq!(back, image, "mismatch h:{h} w:{w} c:{c}");
      }
    }
  }
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_png_rgba_example() {
  let path = temp_path("rgba_example.png");
  let image = Array3::from_shape_vec(
    (2, 2, 4),
    vec![255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 255, 0],
  )
  .unwrap();
  assert!(save_png(&path, &image).unwrap());
  let back = read_png(&path).unwrap();
  assert_eq!(back.shape(), &[2, 2, 4]);
  assert_eq!(back, image.into_dyn());
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_png_non_u8_and_non_contiguous_tensors() {
  let path = temp_path("coerced.png");
  let channels_first =
    Array3::<u16>::from_shape_fn((3, 4, 5), |(c, y, x)| (c * 100 + y * 10 + x) as u16);
  // (h, w, c) view over (c, h, w) memory
  let view = channels_first.view().permuted_axes([1, 2, 0]);
  assert!(!view.is_standard_layout());
  assert!(save_png(&path, &view).unwrap());
  let expected = view.mapv(|v| v as u8).into_dyn();
  assert_eq!(read_png(&path).unwrap(), expected);

  let floats = Array2::<f64>::from_shape_fn((2, 3), |(y, x)| (y * 3 + x) as f64 * 40.5);
  assert!(save_png(&path, &floats).unwrap());
  let expected = floats.mapv(|v| v as u8).into_dyn();
  assert_eq!(read_png(&path).unwrap(), expected);
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_png_paletted_decodes_to_rgb() {
  let ihdr = header(2, 1, 8, PngColorType::Index);
  let palette = [10, 20, 30, 40, 50, 60];
  let bytes = build_png(ihdr, &[(b"PLTE", &palette)], &[0, 1, 0]);
  let image = decode_bytes("palette.png", &bytes).unwrap();
  assert_eq!(image.shape(), &[1, 2, 3]);
  assert_eq!(image.as_slice().unwrap(), &[40, 50, 60, 10, 20, 30]);

  let bytes = build_png(ihdr, &[(b"PLTE", &palette), (b"tRNS", &[128])], &[0, 1, 0]);
  let image = decode_bytes("palette_trns.png", &bytes).unwrap();
  assert_eq!(image.shape(), &[1, 2, 4]);
  assert_eq!(image.as_slice().unwrap(), &[40, 50, 60, 255, 10, 20, 30, 128]);
}

#[test]
fn test_png_low_bit_gray_replicates() {
  let bytes = build_png(header(3, 1, 1, PngColorType::Y), &[], &[0, 0b1010_0000]);
  let image = decode_bytes("gray1.png", &bytes).unwrap();
  assert_eq!(image.shape(), &[1, 3]);
  assert_eq!(image.as_slice().unwrap(), &[255, 0, 255]);
}

#[test]
fn test_png_16_bit_keeps_high_byte() {
  let bytes = build_png(
    header(1, 1, 16, PngColorType::RGB),
    &[],
    &[0, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC],
  );
  let image = decode_bytes("rgb16.png", &bytes).unwrap();
  assert_eq!(image.shape(), &[1, 1, 3]);
  assert_eq!(image.as_slice().unwrap(), &[0x12, 0x56, 0x9A]);
}

#[test]
fn test_png_gray_trns_adds_alpha() {
  let bytes = build_png(header(2, 1, 8, PngColorType::Y), &[(b"tRNS", &[0, 7])], &[0, 7, 9]);
  let image = decode_bytes("gray_trns.png", &bytes).unwrap();
  assert_eq!(image.shape(), &[1, 2, 2]);
  assert_eq!(image.as_slice().unwrap(), &[7, 0, 9, 255]);
}

#[test]
fn test_png_interlaced_matches_plain() {
  let mut ihdr = header(2, 2, 8, PngColorType::Y);
  let plain = decode_bytes("plain.png", &build_png(ihdr, &[], &[0, 1, 2, 0, 3, 4])).unwrap();
  ihdr.is_interlaced = true;
  // reduced images 1, 6 and 7 hold (0,0), (1,0), and the whole second row
  let laced = decode_bytes("laced.png", &build_png(ihdr, &[], &[0, 1, 0, 2, 0, 3, 4])).unwrap();
  assert_eq!(plain, laced);
  assert_eq!(laced.as_slice().unwrap(), &[1, 2, 3, 4]);

  let one = IHDR { is_interlaced: true, ..header(1, 1, 8, PngColorType::Y) };
  let image = decode_bytes("laced1.png", &build_png(one, &[], &[0, 99])).unwrap();
  assert_eq!(image.as_slice().unwrap(), &[99]);
}

#[test]
fn test_png_missing_file_is_io_error() {
  let err = read_png(temp_path("does_not_exist.png")).unwrap_err();
  assert_eq!(err.io_reason(), Some(IoReason::Open));
}

#[test]
fn test_png_bad_signature_is_io_error() {
  let err = decode_bytes("not_png.png", b"GIF89a, not a png at all").unwrap_err();
  assert_eq!(err.io_reason(), Some(IoReason::Signature));
  let err = decode_bytes("short.png", &[137, 80, 78]).unwrap_err();
  assert_eq!(err.io_reason(), Some(IoReason::Header));
}

#[test]
fn test_png_truncated_body_then_retry() {
  init_logger();
  let path = temp_path("truncate_source.png");
  let image = rand_tensor(20, 20, 3);
  assert!(save_png(&path, &image).unwrap());
  let full = std::fs::read(&path).unwrap();
  for cut in [full.len() / 2, full.len() - 1, 20] {
    let err = decode_bytes("truncated.png", &full[..cut]).unwrap_err();
    assert_eq!(err.io_reason(), Some(IoReason::Decode), "cut at {cut}");
    // nothing is left open, so the valid file reads straight away
    assert_eq!(read_png(&path).unwrap(), image);
  }
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_png_bad_crc_is_io_error() {
  let mut bytes = build_png(header(1, 1, 8, PngColorType::Y), &[], &[0, 5]);
  // signature, IHDR length and type, IHDR data, then its CRC
  bytes[8 + 8 + 13] ^= 0xFF;
  let err = decode_bytes("bad_crc.png", &bytes).unwrap_err();
  assert_eq!(err.io_reason(), Some(IoReason::Decode));
}

#[test]
fn test_png_unknown_filter_is_io_error() {
  let bytes = build_png(header(1, 1, 8, PngColorType::Y), &[], &[9, 5]);
  let err = decode_bytes("bad_filter.png", &bytes).unwrap_err();
  assert_eq!(err.io_reason(), Some(IoReason::Decode));
}

#[test]
fn test_png_five_channels_is_invalid_shape() {
  let path = temp_path("five.png");
  std::fs::remove_file(&path).ok();
  let image = Array3::<u8>::zeros((2, 2, 5));
  match save_png(&path, &image) {
    Err(ImgrwError::InvalidShape(shape)) => assert_eq!(shape, vec![2, 2, 5]),
    other => panic!("{other:?}"),
  }
  assert!(!path.exists());
  let flat = imgrw::ndarray::Array1::<u8>::zeros(4);
  assert!(matches!(save_png(&path, &flat), Err(ImgrwError::InvalidShape(_))));
  assert!(!path.exists());
}

#[test]
fn test_png_empty_tensor_is_a_failed_write() {
  let path = temp_path("empty.png");
  let image = Array3::<u8>::zeros((0, 3, 3));
  assert!(!save_png(&path, &image).unwrap());
  std::fs::remove_file(&path).ok();
}

#[test]
fn test_png_unwritable_path_is_io_error() {
  let path = temp_path("no_such_dir").join("out.png");
  let err = save_png(&path, &Array2::<u8>::zeros((1, 1))).unwrap_err();
  assert_eq!(err.io_reason(), Some(IoReason::Create));
}

#[test]
fn test_png_concurrent_calls() {
  let handles: Vec<_> = (0..4)
    .map(|i| {
      std::thread::spawn(move || {
        let path = temp_path(&format!("thread{i}.png"));
        let image = rand_tensor(9, 7, 1 + i);
        for _ in 0..5 {
          assert!(save_png(&path, &image).unwrap());
          assert_eq!(read_png(&path).unwrap(), image);
        }
        std::fs::remove_file(&path).ok();
      })
    })
    .collect();
  for h in handles {
    h.join().unwrap();
  }
}

#[test]
fn test_png_no_panics() {
  // iter ALL files in the test folder, even non-png files shouldn't panic.
  for entry in WalkDir::new("tests/").into_iter().filter_map(|e| e.ok()) {
    if !entry.file_type().is_file() {
      continue;
    }
    println!("{}", entry.path().display());
    let v = match std::fs::read(entry.path()) {
      Ok(v) => v,
      Err(e) => {
        println!("Error reading file: {e:?}");
        continue;
      }
    };
    for _ in PngRawChunkIter::new(&v) {
      //
    }
    let _ = read_png(entry.path());
  }
  // random data after a valid signature should be an error, never a panic
  for i in 0..10 {
    let mut v = vec![137, 80, 78, 71, 13, 10, 26, 10];
    v.extend(rand_bytes(1024));
    for _ in PngRawChunkIter::new(&v) {
      //
    }
    assert!(decode_bytes(&format!("random{i}.png"), &v).is_err());
  }
}
