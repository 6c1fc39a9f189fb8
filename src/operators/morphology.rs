//! Erosion, dilation and the compound morphology operators.
//!
//! Structuring elements follow OpenCV's `getStructuringElement` with the anchor
//! at the centre. Erosion and dilation run on `imageproc`'s grayscale
//! morphology; pixels outside the image are ignored, which matches OpenCV's
//! default border value.

use std::fmt;

use image::{DynamicImage, GrayImage, Luma};
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};
use serde::{Deserialize, Serialize};

use super::{OperatorResult, map_planes};
use crate::error::{CvError, Result};

pub const MAX_KERNEL_SIZE: u32 = 511;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelShape {
    #[default]
    Rect,
    Cross,
    Ellipse,
}

impl KernelShape {
    /// OpenCV `MorphShapes` value, used in labels
    pub fn code(self) -> u8 {
        match self {
            KernelShape::Rect => 0,
            KernelShape::Cross => 1,
            KernelShape::Ellipse => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(KernelShape::Rect),
            1 => Some(KernelShape::Cross),
            2 => Some(KernelShape::Ellipse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphKind {
    Open,
    Close,
    Gradient,
    TopHat,
    BlackHat,
}

impl fmt::Display for MorphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MorphKind::Open => "Open",
            MorphKind::Close => "Close",
            MorphKind::Gradient => "Gradient",
            MorphKind::TopHat => "TopHat",
            MorphKind::BlackHat => "BlackHat",
        };
        f.write_str(name)
    }
}

/// A structuring element, anchored at its centre
#[derive(Debug, Clone)]
pub struct StructuringElement {
    size: u32,
    len: usize,
    mask: Mask,
}

impl StructuringElement {
    pub fn new(shape: KernelShape, size: u32) -> Result<Self> {
        if size == 0 || size > MAX_KERNEL_SIZE {
            return Err(CvError::invalid(
                "k",
                format!("kernel size must be in 1..={MAX_KERNEL_SIZE}, got {size}"),
            ));
        }
        let anchor = u8::try_from(size / 2)
            .map_err(|_| CvError::invalid("k", format!("kernel size {size} is too large")))?;
        let image = element_mask(shape, size);
        let len = image.pixels().filter(|p| p[0] != 0).count();
        let mask = Mask::from_image(&image, anchor, anchor);
        Ok(Self { size, len, mask })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The element as a 0/1 image, built the way OpenCV builds it
pub fn element_mask(shape: KernelShape, size: u32) -> GrayImage {
    let c = (size / 2) as i32;
    let r = c;
    match shape {
        KernelShape::Rect => GrayImage::from_pixel(size, size, Luma([1])),
        KernelShape::Cross => GrayImage::from_fn(size, size, |x, y| {
            Luma([u8::from(x as i32 == c || y as i32 == r)])
        }),
        KernelShape::Ellipse => {
            let mut mask = GrayImage::new(size, size);
            let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };
            for i in 0..size as i32 {
                let dy = i - r;
                if dy.abs() > r {
                    continue;
                }
                let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i32;
                let j1 = (c - dx).max(0);
                let j2 = (c + dx + 1).min(size as i32);
                for j in j1..j2 {
                    mask.put_pixel(j as u32, i as u32, Luma([1]));
                }
            }
            mask
        }
    }
}

fn repeat(
    plane: &GrayImage,
    element: &StructuringElement,
    iterations: u32,
    op: fn(&GrayImage, &Mask) -> GrayImage,
) -> GrayImage {
    let mut out = op(plane, &element.mask);
    for _ in 1..iterations {
        out = op(&out, &element.mask);
    }
    out
}

pub fn erode_plane(plane: &GrayImage, element: &StructuringElement, iterations: u32) -> GrayImage {
    repeat(plane, element, iterations, grayscale_erode)
}

pub fn dilate_plane(plane: &GrayImage, element: &StructuringElement, iterations: u32) -> GrayImage {
    repeat(plane, element, iterations, grayscale_dilate)
}

fn saturating_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].saturating_sub(b.get_pixel(x, y)[0])])
    })
}

fn ensure_iterations(iterations: u32) -> Result<()> {
    if iterations == 0 {
        return Err(CvError::invalid("iterations", "must be at least 1"));
    }
    Ok(())
}

pub fn erode(src: &DynamicImage, shape: KernelShape, k: u32, iterations: u32) -> Result<OperatorResult> {
    ensure_iterations(iterations)?;
    let element = StructuringElement::new(shape, k)?;
    let image = map_planes(src, |plane| Ok(erode_plane(plane, &element, iterations)))?;
    Ok(OperatorResult::new(
        image,
        format!("Erode_k{k}_it{iterations}_s{}", shape.code()),
    ))
}

pub fn dilate(src: &DynamicImage, shape: KernelShape, k: u32, iterations: u32) -> Result<OperatorResult> {
    ensure_iterations(iterations)?;
    let element = StructuringElement::new(shape, k)?;
    let image = map_planes(src, |plane| Ok(dilate_plane(plane, &element, iterations)))?;
    Ok(OperatorResult::new(
        image,
        format!("Dilate_k{k}_it{iterations}_s{}", shape.code()),
    ))
}

pub fn morphology_ex(
    src: &DynamicImage,
    kind: MorphKind,
    shape: KernelShape,
    k: u32,
    iterations: u32,
) -> Result<OperatorResult> {
    ensure_iterations(iterations)?;
    let element = StructuringElement::new(shape, k)?;
    let n = iterations;
    let image = map_planes(src, |plane| {
        let open = || dilate_plane(&erode_plane(plane, &element, n), &element, n);
        let close = || erode_plane(&dilate_plane(plane, &element, n), &element, n);
        Ok(match kind {
            MorphKind::Open => open(),
            MorphKind::Close => close(),
            MorphKind::Gradient => saturating_diff(&dilate_plane(plane, &element, n), &erode_plane(plane, &element, n)),
            MorphKind::TopHat => saturating_diff(plane, &open()),
            MorphKind::BlackHat => saturating_diff(&close(), plane),
        })
    })?;
    Ok(OperatorResult::new(
        image,
        format!("MorphologyEx{kind}_k{k}_it{iterations}_s{}", shape.code()),
    ))
}
