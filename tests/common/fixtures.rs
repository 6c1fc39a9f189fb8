use cvlab::History;
use image::{GrayImage, ImageBuffer, Luma, Rgb};
use tempfile::NamedTempFile;

/// Creates a 100x100 red test image and returns the temp file.
/// The file will be automatically cleaned up when dropped.
pub fn create_test_image() -> NamedTempFile {
    let img = ImageBuffer::from_fn(100, 100, |_, _| Rgb([255u8, 0u8, 0u8]));
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Creates a 40x40 RGB image with two white squares on black:
/// 8x8 at (4, 4) and 10x10 at (20, 22).
pub fn create_shapes_image() -> NamedTempFile {
    let img = ImageBuffer::from_fn(40, 40, |x, y| {
        let first = (4..12).contains(&x) && (4..12).contains(&y);
        let second = (20..30).contains(&x) && (22..32).contains(&y);
        if first || second {
            Rgb([255u8, 255, 255])
        } else {
            Rgb([0u8, 0, 0])
        }
    });
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// A 16x16 horizontal gray ramp
pub fn gray_ramp() -> GrayImage {
    GrayImage::from_fn(16, 16, |x, _| Luma([(x * 16) as u8]))
}

/// Loads `file` into a fresh history
pub fn load_history(file: &NamedTempFile) -> History {
    let mut history = History::new();
    history.load_file(file.path()).expect("Failed to load test image");
    history
}

/// File name the history gives an image loaded from `file`
pub fn file_name(file: &NamedTempFile) -> String {
    file.path()
        .file_name()
        .expect("temp file has a name")
        .to_string_lossy()
        .into_owned()
}
