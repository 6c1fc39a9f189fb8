//! Histogram visualisations. These render new images for inspection and are
//! not recorded in the history.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use super::{ensure_non_empty, split_planes};
use crate::error::{CvError, Result};

pub const DEFAULT_HIST_SIZE: u32 = 256;
pub const DEFAULT_WIDTH: u32 = 300;
pub const DEFAULT_HEIGHT: u32 = 150;
pub const HIST_2D_SIZE: u32 = 512;

fn ensure_positive(name: &'static str, value: u32) -> Result<()> {
    if value == 0 {
        return Err(CvError::invalid(name, "must be positive"));
    }
    Ok(())
}

/// Min-max normalise `values` onto `0..=top`; a constant input maps to 0
fn normalize_min_max(values: &[u32], top: f64) -> Vec<f64> {
    let min = values.iter().copied().min().unwrap_or(0) as f64;
    let max = values.iter().copied().max().unwrap_or(0) as f64;
    if max <= min {
        return vec![0.0; values.len()];
    }
    let scale = top / (max - min);
    values.iter().map(|&v| (v as f64 - min) * scale).collect()
}

/// Per-channel histogram drawn as one polyline per channel on a black canvas
pub fn channel_histogram_image(src: &DynamicImage, hist_size: u32, width: u32, height: u32) -> Result<DynamicImage> {
    ensure_non_empty(src)?;
    ensure_positive("hist_size", hist_size)?;
    ensure_positive("width", width)?;
    ensure_positive("height", height)?;

    let planes = split_planes(src);
    let colors: &[Rgb<u8>] = if planes.len() == 1 {
        &[Rgb([255, 255, 255])]
    } else {
        &[Rgb([255, 0, 0]), Rgb([0, 255, 0]), Rgb([0, 0, 255])]
    };

    let bin_width = ((width as f64 / hist_size as f64).round() as u32).max(1);
    let mut canvas = RgbImage::new(width, height);

    for (plane, &color) in planes.iter().zip(colors) {
        let mut hist = vec![0u32; hist_size as usize];
        for p in plane.pixels() {
            let bin = p[0] as u64 * hist_size as u64 / 256;
            hist[bin as usize] += 1;
        }
        let levels = normalize_min_max(&hist, height as f64);

        let point = |i: usize| {
            let x = (bin_width as usize * i) as f32;
            let y = height as f32 - levels[i].round() as f32;
            (x, y)
        };
        for i in 1..levels.len() {
            let (a, b) = (point(i - 1), point(i));
            draw_line_segment_mut(&mut canvas, a, b, color);
            // second pass one pixel up for a 2px stroke
            draw_line_segment_mut(&mut canvas, (a.0, a.1 - 1.0), (b.0, b.1 - 1.0), color);
        }
    }

    Ok(DynamicImage::ImageRgb8(canvas))
}

/// Joint histogram of the first two channels as a 512×512 intensity map
pub fn histogram_2d_image(src: &DynamicImage) -> Result<DynamicImage> {
    ensure_non_empty(src)?;
    let planes = split_planes(src);
    let [first, second, ..] = planes.as_slice() else {
        return Err(CvError::invalid("image", "a 2-D histogram needs at least two channels"));
    };

    let mut hist = vec![0u32; 256 * 256];
    for (a, b) in first.pixels().zip(second.pixels()) {
        hist[a[0] as usize * 256 + b[0] as usize] += 1;
    }
    let levels = normalize_min_max(&hist, 255.0);

    let cell = HIST_2D_SIZE / 256;
    let mut canvas = RgbImage::new(HIST_2D_SIZE, HIST_2D_SIZE);
    for i in 0..256u32 {
        for j in 0..256u32 {
            let intensity = levels[(i * 256 + j) as usize] as u8;
            canvas.put_pixel(j * cell, i * cell, Rgb([intensity; 3]));
        }
    }
    Ok(DynamicImage::ImageRgb8(canvas))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn gray_histogram_is_white_on_black() {
        let src = DynamicImage::ImageLuma8(GrayImage::from_fn(16, 16, |x, _| Luma([x as u8 * 16])));
        let img = channel_histogram_image(&src, DEFAULT_HIST_SIZE, DEFAULT_WIDTH, DEFAULT_HEIGHT).unwrap();
        assert_eq!(img.width(), 300);
        assert_eq!(img.height(), 150);
        let rgb = img.as_rgb8().unwrap();
        assert!(rgb.pixels().any(|p| p.0 == [255, 255, 255]));
        assert!(rgb.pixels().all(|p| p.0 == [255, 255, 255] || p.0 == [0, 0, 0]));
    }

    #[test]
    fn rgb_histogram_uses_channel_colours() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 16, |x, _| Rgb([x as u8 * 16, 0, 255])));
        let img = channel_histogram_image(&src, DEFAULT_HIST_SIZE, DEFAULT_WIDTH, DEFAULT_HEIGHT).unwrap();
        let rgb = img.as_rgb8().unwrap();
        for colour in [[255, 0, 0], [0, 255, 0], [0, 0, 255]] {
            assert!(rgb.pixels().any(|p| p.0 == colour), "{colour:?}");
        }
    }

    #[test]
    fn histogram_parameters_must_be_positive() {
        let src = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        assert!(channel_histogram_image(&src, 0, 300, 150).is_err());
        assert!(channel_histogram_image(&src, 256, 0, 150).is_err());
        assert!(channel_histogram_image(&src, 256, 300, 0).is_err());
    }

    #[test]
    fn two_d_histogram_needs_two_channels() {
        let gray = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        assert!(histogram_2d_image(&gray).is_err());

        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])));
        let img = histogram_2d_image(&rgb).unwrap();
        let canvas = img.as_rgb8().unwrap();
        assert_eq!(canvas.dimensions(), (512, 512));
        assert_eq!(canvas.get_pixel(40, 20).0, [255, 255, 255]);
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 0, 0]);
    }
}
