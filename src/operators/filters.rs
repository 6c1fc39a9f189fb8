use image::DynamicImage;
use imageproc::filter::{box_filter, gaussian_blur_f32, median_filter};

use super::{OperatorResult, map_planes};
use crate::error::{CvError, Result};

/// Sigma OpenCV derives from an aperture when sigma is left at 0
pub fn sigma_for_kernel(k: u32) -> f32 {
    0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn ensure_kernel(k: u32) -> Result<()> {
    if k == 0 {
        return Err(CvError::invalid("k", "kernel size must be at least 1"));
    }
    Ok(())
}

fn ensure_odd_kernel(k: u32) -> Result<()> {
    ensure_kernel(k)?;
    if k % 2 == 0 {
        return Err(CvError::invalid("k", format!("kernel size must be odd, got {k}")));
    }
    Ok(())
}

/// Normalised box filter over a k×k window
pub fn blur(src: &DynamicImage, k: u32) -> Result<OperatorResult> {
    ensure_kernel(k)?;
    let radius = k / 2;
    let image = map_planes(src, |plane| Ok(box_filter(plane, radius, radius)))?;
    Ok(OperatorResult::new(image, format!("Blur_k{k}")))
}

pub fn gaussian_blur(src: &DynamicImage, k: u32) -> Result<OperatorResult> {
    ensure_odd_kernel(k)?;
    let sigma = sigma_for_kernel(k);
    let image = map_planes(src, |plane| Ok(gaussian_blur_f32(plane, sigma)))?;
    Ok(OperatorResult::new(image, format!("GaussianBlur_k{k}")))
}

pub fn median_blur(src: &DynamicImage, k: u32) -> Result<OperatorResult> {
    ensure_odd_kernel(k)?;
    let radius = k / 2;
    let image = map_planes(src, |plane| {
        if radius == 0 {
            Ok(plane.clone())
        } else {
            Ok(median_filter(plane, radius, radius))
        }
    })?;
    Ok(OperatorResult::new(image, format!("MedianBlur_k{k}")))
}

/// Edge-preserving bilateral filter with sigmaColor = 2d and sigmaSpace = d/2
pub fn bilateral_filter(src: &DynamicImage, diameter: u32) -> Result<OperatorResult> {
    if diameter == 0 {
        return Err(CvError::invalid("d", "diameter must be at least 1"));
    }
    let sigma_color = diameter as f32 * 2.0;
    let sigma_space = diameter as f32 / 2.0;
    let image = map_planes(src, |plane| {
        Ok(imageproc::filter::bilateral_filter(plane, diameter, sigma_color, sigma_space))
    })?;
    Ok(OperatorResult::new(image, format!("BilateralBlur_d{diameter}")))
}
