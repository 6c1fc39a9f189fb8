use image::{DynamicImage, GrayImage, Luma};
use imageproc::edges::canny as canny_edges;

use super::{OperatorResult, apply_lut, map_planes, reflect_101, single_channel};
use crate::error::Result;

/// Mixed first derivative (dx = 1, dy = 1)
const SOBEL_XY: [i32; 9] = [1, 0, -1, 0, 0, 0, -1, 0, 1];
const LAPLACIAN: [i32; 9] = [0, 1, 0, 1, -4, 1, 0, 1, 0];
const SCHARR_X: [i32; 9] = [-3, 0, 3, -10, 0, 10, -3, 0, 3];

/// 3×3 correlation with reflect-101 borders, saturated to 8 bit
fn correlate3x3(plane: &GrayImage, kernel: &[i32; 9]) -> GrayImage {
    let (w, h) = plane.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let mut acc = 0i32;
        for ky in 0..3 {
            for kx in 0..3 {
                let coeff = kernel[ky * 3 + kx];
                if coeff == 0 {
                    continue;
                }
                let sx = reflect_101(x as i64 + kx as i64 - 1, w);
                let sy = reflect_101(y as i64 + ky as i64 - 1, h);
                acc += coeff * plane.get_pixel(sx, sy)[0] as i32;
            }
        }
        Luma([acc.clamp(0, 255) as u8])
    })
}

pub fn canny(src: &DynamicImage, threshold1: u32, threshold2: u32) -> Result<OperatorResult> {
    let gray = single_channel(src, "Canny")?;
    let low = threshold1.min(threshold2) as f32;
    let high = threshold1.max(threshold2) as f32;
    let edges = canny_edges(gray, low, high);
    Ok(OperatorResult::new(
        DynamicImage::ImageLuma8(edges),
        format!("Canny_t1{threshold1}_t2{threshold2}"),
    ))
}

pub fn sobel(src: &DynamicImage) -> Result<OperatorResult> {
    let image = map_planes(src, |plane| Ok(correlate3x3(plane, &SOBEL_XY)))?;
    Ok(OperatorResult::new(image, "Sobel"))
}

pub fn laplacian(src: &DynamicImage) -> Result<OperatorResult> {
    let image = map_planes(src, |plane| Ok(correlate3x3(plane, &LAPLACIAN)))?;
    Ok(OperatorResult::new(image, "Laplacian"))
}

pub fn scharr(src: &DynamicImage) -> Result<OperatorResult> {
    let image = map_planes(src, |plane| Ok(correlate3x3(plane, &SCHARR_X)))?;
    Ok(OperatorResult::new(image, "Scharr"))
}

pub fn invert(src: &DynamicImage) -> Result<OperatorResult> {
    let lut: [u8; 256] = std::array::from_fn(|i| 255 - i as u8);
    let image = apply_lut(src, &lut)?;
    Ok(OperatorResult::new(image, "Invert"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CvError;
    use image::{Rgb, RgbImage};

    fn gray(w: u32, h: u32, f: impl Fn(u32, u32) -> u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| Luma([f(x, y)])))
    }

    fn step() -> DynamicImage {
        gray(16, 16, |x, _| if x < 8 { 0 } else { 200 })
    }

    #[test]
    fn invert_is_bitwise_not() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([0, 100, 255])));
        let out = invert(&src).unwrap();
        assert_eq!(out.suffix, "Invert");
        assert_eq!(out.image.as_rgb8().unwrap().get_pixel(1, 1).0, [255, 155, 0]);
    }

    #[test]
    fn laplacian_of_isolated_point() {
        let src = gray(5, 5, |x, y| if (x, y) == (2, 2) { 255 } else { 0 });
        let out = laplacian(&src).unwrap();
        let img = out.image.as_luma8().unwrap();
        assert_eq!(img.get_pixel(2, 2)[0], 0);
        assert_eq!(img.get_pixel(2, 1)[0], 255);
        assert_eq!(img.get_pixel(1, 1)[0], 0);
    }

    #[test]
    fn derivative_filters_are_zero_on_flat_images() {
        let flat = gray(6, 6, |_, _| 77);
        for out in [sobel(&flat).unwrap(), laplacian(&flat).unwrap(), scharr(&flat).unwrap()] {
            assert!(out.image.as_luma8().unwrap().pixels().all(|p| p[0] == 0), "{}", out.suffix);
        }
    }

    #[test]
    fn scharr_responds_to_vertical_step() {
        let out = scharr(&step()).unwrap();
        let img = out.image.as_luma8().unwrap();
        assert_eq!(img.get_pixel(7, 8)[0], 255);
        assert_eq!(img.get_pixel(2, 8)[0], 0);
    }

    #[test]
    fn canny_finds_step_edge_and_requires_gray() {
        let out = canny(&step(), 50, 150).unwrap();
        assert_eq!(out.suffix, "Canny_t150_t2150");
        assert!(out.image.as_luma8().unwrap().pixels().any(|p| p[0] == 255));

        let flat = canny(&gray(8, 8, |_, _| 10), 50, 150).unwrap();
        assert!(flat.image.as_luma8().unwrap().pixels().all(|p| p[0] == 0));

        let rgb = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert!(matches!(canny(&rgb, 1, 2), Err(CvError::NotSingleChannel { .. })));
    }
}
