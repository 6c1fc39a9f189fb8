pub mod color;
pub mod contours;
pub mod edges;
pub mod filters;
pub mod gray;
pub mod histogram;
pub mod morphology;
pub mod threshold;

use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};

use crate::error::{CvError, Result};
use crate::models::ContourObject;

pub use color::ColorConversion;
pub use contours::{ApproximationMode, RetrievalMode};
pub use morphology::{KernelShape, MorphKind};
pub use threshold::{AdaptiveMethod, ThresholdType};

/// Image produced by an operator, plus the suffix appended to the parent's name
#[derive(Debug, Clone)]
pub struct OperatorResult {
    pub image: DynamicImage,
    pub suffix: String,
    /// Only filled in by contour detection
    pub contours: Vec<ContourObject>,
}

impl OperatorResult {
    pub fn new(image: DynamicImage, suffix: impl Into<String>) -> Self {
        Self {
            image,
            suffix: suffix.into(),
            contours: Vec::new(),
        }
    }
}

/// Output of contour detection: the rendered contours and one record per contour
#[derive(Debug, Clone)]
pub struct FindContoursResult {
    pub image: DynamicImage,
    pub contours: Vec<ContourObject>,
    pub suffix: String,
}

impl From<FindContoursResult> for OperatorResult {
    fn from(r: FindContoursResult) -> Self {
        Self {
            image: r.image,
            suffix: r.suffix,
            contours: r.contours,
        }
    }
}

/// Reduce any decoded image to 8-bit gray or 8-bit RGB
pub fn normalize(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

pub(crate) fn ensure_non_empty(src: &DynamicImage) -> Result<()> {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return Err(CvError::EmptyImage);
    }
    Ok(())
}

/// Borrow the gray plane of a single-channel image
pub(crate) fn single_channel<'a>(src: &'a DynamicImage, operator: &'static str) -> Result<&'a GrayImage> {
    ensure_non_empty(src)?;
    src.as_luma8().ok_or(CvError::NotSingleChannel {
        operator,
        channels: src.color().channel_count(),
    })
}

/// Split an image into 8-bit planes (one for gray, three for RGB)
pub(crate) fn split_planes(src: &DynamicImage) -> Vec<GrayImage> {
    match src {
        DynamicImage::ImageLuma8(gray) => vec![gray.clone()],
        DynamicImage::ImageRgb8(rgb) => (0..3)
            .map(|c| GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| Luma([rgb.get_pixel(x, y)[c]])))
            .collect(),
        other => split_planes(&normalize(other.clone())),
    }
}

pub(crate) fn merge_planes(planes: Vec<GrayImage>) -> DynamicImage {
    match planes.as_slice() {
        [r, g, b] => DynamicImage::ImageRgb8(RgbImage::from_fn(r.width(), r.height(), |x, y| {
            Rgb([r.get_pixel(x, y)[0], g.get_pixel(x, y)[0], b.get_pixel(x, y)[0]])
        })),
        _ => DynamicImage::ImageLuma8(planes.into_iter().next().unwrap_or_default()),
    }
}

/// Run a gray-level operation on every color plane independently
pub(crate) fn map_planes<F>(src: &DynamicImage, mut f: F) -> Result<DynamicImage>
where
    F: FnMut(&GrayImage) -> Result<GrayImage>,
{
    ensure_non_empty(src)?;
    let planes = split_planes(src)
        .iter()
        .map(|plane| f(plane))
        .collect::<Result<Vec<_>>>()?;
    Ok(merge_planes(planes))
}

/// Map every sample through a 256-entry lookup table
pub(crate) fn apply_lut(src: &DynamicImage, lut: &[u8; 256]) -> Result<DynamicImage> {
    map_planes(src, |plane| {
        let mut out = plane.clone();
        for p in out.pixels_mut() {
            p[0] = lut[p[0] as usize];
        }
        Ok(out)
    })
}

/// Round and clamp to the 8-bit range (OpenCV's saturate_cast)
pub(crate) fn saturate(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

/// Border index for reflect-101 extrapolation (`gfedcb|abcdefgh|gfedcba`)
pub(crate) fn reflect_101(i: i64, size: u32) -> u32 {
    let n = size as i64;
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as u32
}
