use std::fmt;
use std::str::FromStr;

use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use super::{OperatorResult, ensure_non_empty};
use crate::error::{CvError, Result};

/// Supported color space conversions, named after their OpenCV codes.
///
/// Images are stored in RGB order; the `BGR*` codes reinterpret the stored
/// channels as blue-green-red before converting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum ColorConversion {
    #[serde(rename = "RGB2GRAY")]
    Rgb2Gray,
    #[serde(rename = "BGR2GRAY")]
    Bgr2Gray,
    #[serde(rename = "GRAY2RGB")]
    Gray2Rgb,
    #[serde(rename = "GRAY2BGR")]
    Gray2Bgr,
    #[serde(rename = "RGB2BGR")]
    Rgb2Bgr,
    #[serde(rename = "BGR2RGB")]
    Bgr2Rgb,
    #[serde(rename = "RGB2HSV")]
    Rgb2Hsv,
    #[serde(rename = "BGR2HSV")]
    Bgr2Hsv,
}

impl ColorConversion {
    pub const ALL: [ColorConversion; 8] = [
        ColorConversion::Rgb2Gray,
        ColorConversion::Bgr2Gray,
        ColorConversion::Gray2Rgb,
        ColorConversion::Gray2Bgr,
        ColorConversion::Rgb2Bgr,
        ColorConversion::Bgr2Rgb,
        ColorConversion::Rgb2Hsv,
        ColorConversion::Bgr2Hsv,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ColorConversion::Rgb2Gray => "RGB2GRAY",
            ColorConversion::Bgr2Gray => "BGR2GRAY",
            ColorConversion::Gray2Rgb => "GRAY2RGB",
            ColorConversion::Gray2Bgr => "GRAY2BGR",
            ColorConversion::Rgb2Bgr => "RGB2BGR",
            ColorConversion::Bgr2Rgb => "BGR2RGB",
            ColorConversion::Rgb2Hsv => "RGB2HSV",
            ColorConversion::Bgr2Hsv => "BGR2HSV",
        }
    }

    fn source_channels(self) -> u8 {
        match self {
            ColorConversion::Gray2Rgb | ColorConversion::Gray2Bgr => 1,
            _ => 3,
        }
    }
}

impl TryFrom<String> for ColorConversion {
    type Error = CvError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for ColorConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ColorConversion {
    type Err = CvError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|c| c.code() == wanted)
            .ok_or_else(|| CvError::invalid("code", format!("unknown color conversion `{s}`")))
    }
}

/// ITU-R BT.601 luma, as OpenCV computes it for 8-bit images
fn luma(r: u8, g: u8, b: u8) -> u8 {
    super::saturate(0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64)
}

/// 8-bit HSV with hue halved into 0..180
fn hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = v - min;
    let s = if v > 0.0 { 255.0 * delta / v } else { 0.0 };
    let mut h = if delta == 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / delta
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }
    [super::saturate(h / 2.0), super::saturate(s), super::saturate(v)]
}

pub fn convert_color(src: &DynamicImage, code: ColorConversion) -> Result<OperatorResult> {
    ensure_non_empty(src)?;
    let channels = src.color().channel_count();
    if channels != code.source_channels() {
        return Err(CvError::invalid(
            "code",
            format!("{code} expects {} channel(s), image has {channels}", code.source_channels()),
        ));
    }

    let image = match code {
        ColorConversion::Gray2Rgb | ColorConversion::Gray2Bgr => DynamicImage::ImageRgb8(src.to_rgb8()),
        _ => {
            let rgb = src.to_rgb8();
            let (w, h) = rgb.dimensions();
            // Stored channel order is R,G,B; BGR codes read them as B,G,R.
            let swap = matches!(code, ColorConversion::Bgr2Gray | ColorConversion::Bgr2Hsv);
            let pixel = |x: u32, y: u32| {
                let [a, b, c] = rgb.get_pixel(x, y).0;
                if swap { (c, b, a) } else { (a, b, c) }
            };
            match code {
                ColorConversion::Rgb2Gray | ColorConversion::Bgr2Gray => {
                    DynamicImage::ImageLuma8(image::GrayImage::from_fn(w, h, |x, y| {
                        let (r, g, b) = pixel(x, y);
                        image::Luma([luma(r, g, b)])
                    }))
                }
                ColorConversion::Rgb2Hsv | ColorConversion::Bgr2Hsv => {
                    DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                        let (r, g, b) = pixel(x, y);
                        Rgb(hsv(r, g, b))
                    }))
                }
                // RGB2BGR and BGR2RGB are the same channel swap
                _ => DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                    let [r, g, b] = rgb.get_pixel(x, y).0;
                    Rgb([b, g, r])
                })),
            }
        }
    };

    Ok(OperatorResult::new(image, code.code()))
}
