use std::fmt;

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::{box_filter, gaussian_blur_f32};
use serde::{Deserialize, Serialize};

use super::filters::sigma_for_kernel;
use super::{OperatorResult, apply_lut, single_channel};
use crate::error::{CvError, Result};

/// Offset subtracted from the local mean by adaptive thresholding
pub const ADAPTIVE_C: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdType {
    #[default]
    Binary,
    BinaryInv,
    Trunc,
    ToZero,
    ToZeroInv,
}

impl ThresholdType {
    pub fn code(self) -> u8 {
        match self {
            ThresholdType::Binary => 0,
            ThresholdType::BinaryInv => 1,
            ThresholdType::Trunc => 2,
            ThresholdType::ToZero => 3,
            ThresholdType::ToZeroInv => 4,
        }
    }

    /// Lookup table implementing `dst = f(src)` for a fixed level
    pub fn lut(self, thresh: u8, max_value: u8) -> [u8; 256] {
        std::array::from_fn(|i| {
            let v = i as u8;
            let above = v > thresh;
            match self {
                ThresholdType::Binary => if above { max_value } else { 0 },
                ThresholdType::BinaryInv => if above { 0 } else { max_value },
                ThresholdType::Trunc => if above { thresh } else { v },
                ThresholdType::ToZero => if above { v } else { 0 },
                ThresholdType::ToZeroInv => if above { 0 } else { v },
            }
        })
    }
}

impl fmt::Display for ThresholdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThresholdType::Binary => "Binary",
            ThresholdType::BinaryInv => "BinaryInv",
            ThresholdType::Trunc => "Trunc",
            ThresholdType::ToZero => "Tozero",
            ThresholdType::ToZeroInv => "TozeroInv",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveMethod {
    MeanC,
    #[default]
    GaussianC,
}

pub fn threshold(src: &DynamicImage, kind: ThresholdType, thresh: u8, max_value: u8) -> Result<OperatorResult> {
    let image = apply_lut(src, &kind.lut(thresh, max_value))?;
    Ok(OperatorResult::new(
        image,
        format!("Threshold_{kind}_th{thresh}_max{max_value}"),
    ))
}

pub fn adaptive_threshold(
    src: &DynamicImage,
    method: AdaptiveMethod,
    kind: ThresholdType,
    block_size: u32,
    max_value: u8,
) -> Result<OperatorResult> {
    let gray = single_channel(src, "AdaptiveThreshold")?;
    if block_size < 3 || block_size % 2 == 0 {
        return Err(CvError::invalid(
            "k",
            format!("block size must be odd and at least 3, got {block_size}"),
        ));
    }
    if !matches!(kind, ThresholdType::Binary | ThresholdType::BinaryInv) {
        return Err(CvError::invalid("type", "adaptive threshold supports Binary and BinaryInv only"));
    }

    let mean = match method {
        AdaptiveMethod::MeanC => box_filter(gray, block_size / 2, block_size / 2),
        AdaptiveMethod::GaussianC => gaussian_blur_f32(gray, sigma_for_kernel(block_size)),
    };
    let out = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let diff = gray.get_pixel(x, y)[0] as i32 - mean.get_pixel(x, y)[0] as i32;
        let above = diff > -ADAPTIVE_C;
        let on = if kind == ThresholdType::Binary { above } else { !above };
        Luma([if on { max_value } else { 0 }])
    });

    Ok(OperatorResult::new(
        DynamicImage::ImageLuma8(out),
        format!("AdaptiveThreshold_k{block_size}_tt{}_max{max_value}", kind.code()),
    ))
}

pub fn otsu_threshold(src: &DynamicImage, max_value: u8) -> Result<OperatorResult> {
    let gray = single_channel(src, "OtsuThreshold")?;
    let level = otsu_level(gray);
    tracing::debug!(level, "otsu level");
    let image = apply_lut(src, &ThresholdType::Binary.lut(level, max_value))?;
    Ok(OperatorResult::new(image, format!("OtsuThreshold_max{max_value}")))
}

pub fn triangle_threshold(src: &DynamicImage, max_value: u8) -> Result<OperatorResult> {
    let gray = single_channel(src, "TriangleThreshold")?;
    let mut hist = [0u32; 256];
    for p in gray.pixels() {
        hist[p[0] as usize] += 1;
    }
    let level = triangle_level(&hist);
    tracing::debug!(level, "triangle level");
    let image = apply_lut(src, &ThresholdType::Binary.lut(level, max_value))?;
    Ok(OperatorResult::new(image, format!("TriangleThreshold_max{max_value}")))
}

/// Triangle method: the level furthest from the line joining the histogram
/// peak to the far end of its longer tail.
pub fn triangle_level(hist: &[u32; 256]) -> u8 {
    let Some(first) = hist.iter().position(|&c| c > 0) else {
        return 0;
    };
    let last = hist.iter().rposition(|&c| c > 0).unwrap_or(first);

    let left0 = first.saturating_sub(1) as i64;
    let right0 = (if last < 255 { last + 1 } else { last }) as i64;

    let mut peak = 0usize;
    for (i, &c) in hist.iter().enumerate() {
        if c > hist[peak] {
            peak = i;
        }
    }
    let peak = peak as i64;

    // Always walk the longer side, mirroring the histogram if needed
    let mut h: Vec<i64> = hist.iter().map(|&c| c as i64).collect();
    let flipped = (peak - left0) < (right0 - peak);
    let (left, max_ind) = if flipped {
        h.reverse();
        (255 - right0, 255 - peak)
    } else {
        (left0, peak)
    };

    let mut thresh = left;
    let a = h[max_ind as usize];
    let b = left - max_ind;
    let mut dist = 0i64;
    for i in (left + 1)..=max_ind {
        let d = a * i + b * h[i as usize];
        if d > dist {
            dist = d;
            thresh = i;
        }
    }
    thresh -= 1;

    if flipped {
        thresh = 255 - thresh;
    }
    thresh.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(16, 16, |x, y| Luma([(y * 16 + x) as u8])))
    }

    #[test]
    fn fixed_threshold_types() {
        assert_eq!(ThresholdType::Binary.lut(100, 200)[101], 200);
        assert_eq!(ThresholdType::Binary.lut(100, 200)[100], 0);
        assert_eq!(ThresholdType::BinaryInv.lut(100, 200)[50], 200);
        assert_eq!(ThresholdType::Trunc.lut(100, 255)[180], 100);
        assert_eq!(ThresholdType::ToZero.lut(100, 255)[99], 0);
        assert_eq!(ThresholdType::ToZero.lut(100, 255)[180], 180);
        assert_eq!(ThresholdType::ToZeroInv.lut(100, 255)[180], 0);
    }

    #[test]
    fn threshold_label_and_partition() {
        let out = threshold(&ramp(), ThresholdType::Binary, 127, 255).unwrap();
        assert_eq!(out.suffix, "Threshold_Binary_th127_max255");
        let white = out.image.as_luma8().unwrap().pixels().filter(|p| p[0] == 255).count();
        assert_eq!(white, 128);
    }

    #[test]
    fn otsu_splits_bimodal_image() {
        let src = DynamicImage::ImageLuma8(GrayImage::from_fn(10, 10, |x, _| {
            Luma([if x < 5 { 20 } else { 220 }])
        }));
        let out = otsu_threshold(&src, 255).unwrap();
        assert_eq!(out.suffix, "OtsuThreshold_max255");
        let img = out.image.as_luma8().unwrap();
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(9, 0)[0], 255);
    }

    #[test]
    fn triangle_level_lies_between_peak_and_tail() {
        let mut hist = [0u32; 256];
        hist[30] = 1000;
        for (i, v) in hist.iter_mut().enumerate().skip(31).take(150) {
            *v = 1000u32.saturating_sub((i as u32 - 30) * 6);
        }
        let level = triangle_level(&hist);
        assert!(level > 30 && level < 200, "level {level}");
    }

    #[test]
    fn adaptive_requires_odd_block_and_gray() {
        assert!(adaptive_threshold(&ramp(), AdaptiveMethod::MeanC, ThresholdType::Binary, 4, 255).is_err());
        let rgb = DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
        assert!(adaptive_threshold(&rgb, AdaptiveMethod::MeanC, ThresholdType::Binary, 3, 255).is_err());
        let out = adaptive_threshold(&ramp(), AdaptiveMethod::GaussianC, ThresholdType::Binary, 11, 255).unwrap();
        assert_eq!(out.suffix, "AdaptiveThreshold_k11_tt0_max255");
    }

    #[test]
    fn adaptive_flat_region_is_foreground() {
        // src - mean = 0 > -C everywhere
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([90])));
        let out = adaptive_threshold(&flat, AdaptiveMethod::MeanC, ThresholdType::Binary, 3, 255).unwrap();
        assert!(out.image.as_luma8().unwrap().pixels().all(|p| p[0] == 255));
    }
}
