//! Gray-level transforms: lookup-table mappings, histogram equalisation and CLAHE.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::equalize_histogram;

use super::{OperatorResult, apply_lut, reflect_101, saturate, single_channel};
use crate::error::{CvError, Result};

pub const GAMMA_PRESETS: [f64; 5] = [0.4, 0.67, 1.0, 1.5, 2.5];

/// `(alpha, beta)` pairs: brighten, darken, more contrast, less contrast, soft negative, negative
pub const ALPHA_BETA_PRESETS: [(f64, f64); 6] = [
    (1.0, 50.0),
    (1.0, -50.0),
    (1.5, 0.0),
    (0.75, 0.0),
    (-0.5, 0.0),
    (-1.0, 255.0),
];

pub fn gamma_preset(index: usize) -> Result<f64> {
    GAMMA_PRESETS.get(index).copied().ok_or_else(|| {
        CvError::invalid("preset", format!("gamma presets are 0..{}, got {index}", GAMMA_PRESETS.len()))
    })
}

pub fn alpha_beta_preset(index: usize) -> Result<(f64, f64)> {
    ALPHA_BETA_PRESETS.get(index).copied().ok_or_else(|| {
        CvError::invalid(
            "preset",
            format!("alpha/beta presets are 0..{}, got {index}", ALPHA_BETA_PRESETS.len()),
        )
    })
}

fn ensure_level(name: &'static str, value: i32) -> Result<u8> {
    u8::try_from(value).map_err(|_| CvError::invalid(name, format!("must be in 0..=255, got {value}")))
}

pub fn equalize_hist(src: &DynamicImage) -> Result<OperatorResult> {
    let gray = single_channel(src, "EqualizeHist")?;
    Ok(OperatorResult::new(
        DynamicImage::ImageLuma8(equalize_histogram(gray)),
        "EqualizeHist",
    ))
}

/// Contrast-limited adaptive histogram equalisation over a `tile_grid`×`tile_grid` grid.
///
/// A `clip_limit` of zero disables clipping.
pub fn clahe(src: &DynamicImage, clip_limit: f64, tile_grid: u32) -> Result<OperatorResult> {
    let gray = single_channel(src, "CreateCLAHE")?;
    if !clip_limit.is_finite() || clip_limit < 0.0 {
        return Err(CvError::invalid("clip", format!("must be a non-negative number, got {clip_limit}")));
    }
    if tile_grid == 0 {
        return Err(CvError::invalid("tiles", "tile grid must be at least 1"));
    }
    let out = clahe_plane(gray, clip_limit, tile_grid);
    Ok(OperatorResult::new(DynamicImage::ImageLuma8(out), "CreateCLAHE"))
}

fn clahe_plane(src: &GrayImage, clip_limit: f64, tiles: u32) -> GrayImage {
    let (w, h) = src.dimensions();

    // Tiles must cover the image exactly; pad with reflected borders when they don't
    let padded_w = w.div_ceil(tiles) * tiles;
    let padded_h = h.div_ceil(tiles) * tiles;
    let tile_w = padded_w / tiles;
    let tile_h = padded_h / tiles;
    let tile_area = (tile_w * tile_h) as f64;

    let clip = if clip_limit > 0.0 {
        Some(((clip_limit * tile_area / 256.0) as u32).max(1))
    } else {
        None
    };
    let lut_scale = 255.0 / tile_area;

    let mut luts = vec![[0u8; 256]; (tiles * tiles) as usize];
    for ty in 0..tiles {
        for tx in 0..tiles {
            let mut hist = [0u32; 256];
            for y in ty * tile_h..(ty + 1) * tile_h {
                for x in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect_101(x as i64, w);
                    let sy = reflect_101(y as i64, h);
                    hist[src.get_pixel(sx, sy)[0] as usize] += 1;
                }
            }

            if let Some(clip) = clip {
                let mut excess = 0u32;
                for bin in hist.iter_mut() {
                    if *bin > clip {
                        excess += *bin - clip;
                        *bin = clip;
                    }
                }
                let batch = excess / 256;
                let mut residual = excess - batch * 256;
                for bin in hist.iter_mut() {
                    *bin += batch;
                }
                if residual > 0 {
                    let step = (256 / residual).max(1) as usize;
                    let mut i = 0;
                    while i < 256 && residual > 0 {
                        hist[i] += 1;
                        residual -= 1;
                        i += step;
                    }
                }
            }

            let lut = &mut luts[(ty * tiles + tx) as usize];
            let mut sum = 0u32;
            for (entry, &count) in lut.iter_mut().zip(hist.iter()) {
                sum += count;
                *entry = saturate(sum as f64 * lut_scale);
            }
        }
    }

    let last = tiles as i64 - 1;
    let lut_at = |tx: i64, ty: i64| &luts[(ty * tiles as i64 + tx) as usize];
    GrayImage::from_fn(w, h, |x, y| {
        let v = src.get_pixel(x, y)[0] as usize;

        let txf = x as f64 / tile_w as f64 - 0.5;
        let tx1 = txf.floor() as i64;
        let xa = txf - tx1 as f64;
        let (tx1, tx2) = (tx1.max(0), (tx1 + 1).min(last));

        let tyf = y as f64 / tile_h as f64 - 0.5;
        let ty1 = tyf.floor() as i64;
        let ya = tyf - ty1 as f64;
        let (ty1, ty2) = (ty1.max(0), (ty1 + 1).min(last));

        let top = lut_at(tx1, ty1)[v] as f64 * (1.0 - xa) + lut_at(tx2, ty1)[v] as f64 * xa;
        let bottom = lut_at(tx1, ty2)[v] as f64 * (1.0 - xa) + lut_at(tx2, ty2)[v] as f64 * xa;
        Luma([saturate(top * (1.0 - ya) + bottom * ya)])
    })
}

/// Stretch the image's own min..max range onto `out_min..=out_max`
pub fn linear_gray_transform(src: &DynamicImage, out_min: i32, out_max: i32) -> Result<OperatorResult> {
    let gray = single_channel(src, "LinearGrayTransform")?;
    let (mut min, mut max) = (u8::MAX, u8::MIN);
    for p in gray.pixels() {
        min = min.min(p[0]);
        max = max.max(p[0]);
    }
    if min == max {
        return Err(CvError::ConstantImage);
    }
    linear_gray_transform_range(src, min as i32, max as i32, out_min, out_max)
}

pub fn linear_gray_transform_range(
    src: &DynamicImage,
    in_min: i32,
    in_max: i32,
    out_min: i32,
    out_max: i32,
) -> Result<OperatorResult> {
    let in_lo = ensure_level("in_min", in_min)?;
    let in_hi = ensure_level("in_max", in_max)?;
    ensure_level("out_min", out_min)?;
    ensure_level("out_max", out_max)?;
    if in_lo >= in_hi {
        return Err(CvError::invalid(
            "in_min",
            format!("input range is invalid: {in_min} >= {in_max}"),
        ));
    }

    let alpha = (out_max - out_min) as f64 / (in_max - in_min) as f64;
    let beta = out_min as f64 - in_min as f64 * alpha;
    let lut: [u8; 256] = std::array::from_fn(|i| {
        let clipped = (i as u8).clamp(in_lo, in_hi);
        saturate(alpha * clipped as f64 + beta)
    });

    let image = apply_lut(src, &lut)?;
    Ok(OperatorResult::new(
        image,
        format!("LinearGrayTransform_min{out_min}_max{out_max}"),
    ))
}

pub fn linear_alpha_beta(src: &DynamicImage, alpha: f64, beta: f64) -> Result<OperatorResult> {
    if !alpha.is_finite() {
        return Err(CvError::invalid("alpha", format!("must be finite, got {alpha}")));
    }
    if !beta.is_finite() {
        return Err(CvError::invalid("beta", format!("must be finite, got {beta}")));
    }
    let lut: [u8; 256] = std::array::from_fn(|i| saturate(alpha * i as f64 + beta));
    let image = apply_lut(src, &lut)?;
    Ok(OperatorResult::new(image, format!("LinearAlphaBeta_a{alpha}_b{beta}")))
}

/// Three-segment lookup table through `(r1, s1)` and `(r2, s2)`
pub fn piecewise_lut(r1: i32, s1: i32, r2: i32, s2: i32) -> Result<[u8; 256]> {
    ensure_level("r1", r1)?;
    ensure_level("s1", s1)?;
    ensure_level("r2", r2)?;
    ensure_level("s2", s2)?;
    if r1 >= r2 {
        return Err(CvError::invalid("r1", format!("must be below r2, got r1={r1} r2={r2}")));
    }

    let (r1, s1, r2, s2) = (r1 as f64, s1 as f64, r2 as f64, s2 as f64);
    Ok(std::array::from_fn(|i| {
        let i = i as f64;
        let v = if i <= r1 {
            if r1 == 0.0 { s1 } else { s1 * i / r1 }
        } else if i <= r2 {
            s1 + (s2 - s1) * (i - r1) / (r2 - r1)
        } else if r2 == 255.0 {
            255.0
        } else {
            s2 + (255.0 - s2) * (i - r2) / (255.0 - r2)
        };
        saturate(v)
    }))
}

pub fn piecewise_linear(src: &DynamicImage, r1: i32, s1: i32, r2: i32, s2: i32) -> Result<OperatorResult> {
    let lut = piecewise_lut(r1, s1, r2, s2)?;
    let image = apply_lut(src, &lut)?;
    Ok(OperatorResult::new(
        image,
        format!("PiecewiseLinearGrayTransform_r1{r1}_s1{s1}_r2{r2}_s2{s2}"),
    ))
}

pub fn gamma_lut(gamma: f64) -> Result<[u8; 256]> {
    if !gamma.is_finite() || gamma <= 0.0 {
        return Err(CvError::invalid("gamma", format!("must be a positive number, got {gamma}")));
    }
    Ok(std::array::from_fn(|i| saturate(255.0 * (i as f64 / 255.0).powf(gamma))))
}

pub fn gamma_transform(src: &DynamicImage, gamma: f64) -> Result<OperatorResult> {
    let lut = gamma_lut(gamma)?;
    let image = apply_lut(src, &lut)?;
    Ok(OperatorResult::new(image, format!("GammaTransform_g{gamma}")))
}
