//! Contour detection and bounding-box rendering.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{BorderType, find_contours as trace_contours};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{FindContoursResult, OperatorResult, ensure_non_empty, single_channel};
use crate::error::{CvError, Result};
use crate::models::{ContourObject, Rect};

pub const BOUNDING_RECT_COLOR: Rgb<u8> = Rgb([144, 238, 144]);

/// Douglas-Peucker tolerance used for the TC89 approximations
const TC89_EPSILON: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    #[default]
    External,
    List,
    CComp,
    Tree,
}

impl RetrievalMode {
    pub fn code(self) -> u8 {
        match self {
            RetrievalMode::External => 0,
            RetrievalMode::List => 1,
            RetrievalMode::CComp => 2,
            RetrievalMode::Tree => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproximationMode {
    None,
    #[default]
    Simple,
    Tc89L1,
    Tc89Kcos,
}

impl ApproximationMode {
    pub fn code(self) -> u8 {
        match self {
            ApproximationMode::None => 1,
            ApproximationMode::Simple => 2,
            ApproximationMode::Tc89L1 => 3,
            ApproximationMode::Tc89Kcos => 4,
        }
    }
}

fn step(from: Point<i32>, to: Point<i32>) -> (i32, i32) {
    ((to.x - from.x).signum(), (to.y - from.y).signum())
}

/// Keep only the points where a closed chain changes direction
fn compress_runs(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let kept: Vec<Point<i32>> = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect();
    if kept.is_empty() { vec![points[0]] } else { kept }
}

fn approximate(points: Vec<Point<i32>>, mode: ApproximationMode) -> Vec<Point<i32>> {
    match mode {
        ApproximationMode::None => points,
        ApproximationMode::Simple => compress_runs(&points),
        ApproximationMode::Tc89L1 | ApproximationMode::Tc89Kcos => {
            if points.len() < 3 {
                points
            } else {
                approximate_polygon_dp(&points, TC89_EPSILON, true)
            }
        }
    }
}

/// Polygon area by the shoelace formula
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: i64 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum();
    twice.abs() as f64 / 2.0
}

fn draw_closed<I>(canvas: &mut I, points: &[Point<i32>], color: I::Pixel)
where
    I: image::GenericImage,
{
    match points {
        [] => {}
        [p] => {
            if p.x >= 0 && p.y >= 0 && (p.x as u32) < canvas.width() && (p.y as u32) < canvas.height() {
                canvas.put_pixel(p.x as u32, p.y as u32, color);
            }
        }
        _ => {
            for (i, a) in points.iter().enumerate() {
                let b = points[(i + 1) % points.len()];
                draw_line_segment_mut(canvas, (a.x as f32, a.y as f32), (b.x as f32, b.y as f32), color);
            }
        }
    }
}

/// Derive the outline mask and geometry of a closed polygon on a `width`×`height` canvas
pub fn contour_from_points(points: Vec<Point<i32>>, width: u32, height: u32) -> Option<ContourObject> {
    let bounding_rect = Rect::bounding(&points)?;
    let mut mask = GrayImage::new(width, height);
    draw_closed(&mut mask, &points, Luma([255]));
    Some(ContourObject {
        mask,
        area: polygon_area(&points),
        perimeter: arc_length(&points, true),
        bounding_rect,
        points,
    })
}

/// Trace the borders of non-zero regions in a single-channel image.
///
/// The returned image draws every contour in a random colour on a black
/// canvas; each contour also gets its own outline mask.
pub fn find_contours(
    src: &DynamicImage,
    retrieval: RetrievalMode,
    approximation: ApproximationMode,
) -> Result<FindContoursResult> {
    let gray = single_channel(src, "FindContours")?;
    let (w, h) = gray.dimensions();

    let traced = trace_contours::<i32>(gray);
    let mut canvas = RgbImage::new(w, h);
    let mut rng = rand::thread_rng();
    let mut contours = Vec::new();

    for contour in traced {
        if retrieval == RetrievalMode::External
            && !(contour.border_type == BorderType::Outer && contour.parent.is_none())
        {
            continue;
        }
        let points = approximate(contour.points, approximation);
        let Some(object) = contour_from_points(points, w, h) else {
            continue;
        };

        let color: Rgb<u8> = Rgb([rng.r#gen(), rng.r#gen(), rng.r#gen()]);
        draw_closed(&mut canvas, &object.points, color);
        contours.push(object);
    }

    tracing::debug!(count = contours.len(), ?retrieval, ?approximation, "contours found");
    Ok(FindContoursResult {
        image: DynamicImage::ImageRgb8(canvas),
        contours,
        suffix: format!("FindContours_rm{}_am{}", retrieval.code(), approximation.code()),
    })
}

/// Outline each contour's bounding rectangle on a copy of `target`
pub fn draw_bounding_rects(target: &DynamicImage, contours: &[ContourObject]) -> Result<OperatorResult> {
    ensure_non_empty(target)?;
    if contours.is_empty() {
        return Err(CvError::invalid("contours", "the selected operation has no contours"));
    }
    let mut canvas = target.to_rgb8();
    for contour in contours {
        draw_hollow_rect_mut(&mut canvas, contour.bounding_rect.into(), BOUNDING_RECT_COLOR);
    }
    Ok(OperatorResult::new(DynamicImage::ImageRgb8(canvas), "DrawingBoundingRect"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Filled squares at the given top-left corners, `size` pixels wide
    fn squares(corners: &[(u32, u32)], size: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(20, 20, |x, y| {
            let inside = corners
                .iter()
                .any(|&(cx, cy)| (cx..cx + size).contains(&x) && (cy..cy + size).contains(&y));
            Luma([if inside { 255 } else { 0 }])
        }))
    }

    fn ring() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(20, 20, |x, y| {
            let outer = (3..16).contains(&x) && (3..16).contains(&y);
            let inner = (7..12).contains(&x) && (7..12).contains(&y);
            Luma([if outer && !inner { 255 } else { 0 }])
        }))
    }

    #[test]
    fn simple_square_geometry() {
        let out = find_contours(&squares(&[(3, 3)], 5), RetrievalMode::External, ApproximationMode::Simple).unwrap();
        assert_eq!(out.suffix, "FindContours_rm0_am2");
        assert_eq!(out.contours.len(), 1);

        let c = &out.contours[0];
        assert_eq!(c.points.len(), 4);
        assert_eq!(c.area, 16.0);
        assert!((c.perimeter - 16.0).abs() < 1e-9);
        assert_eq!(c.bounding_rect, Rect { x: 3, y: 3, width: 5, height: 5 });
        assert_eq!(c.mask.dimensions(), (20, 20));
        assert_eq!(c.mask.get_pixel(3, 3)[0], 255);
        assert_eq!(c.mask.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn no_approximation_keeps_every_border_pixel() {
        let out = find_contours(&squares(&[(3, 3)], 5), RetrievalMode::List, ApproximationMode::None).unwrap();
        assert_eq!(out.suffix, "FindContours_rm1_am1");
        assert_eq!(out.contours[0].points.len(), 16);
    }

    #[test]
    fn one_contour_per_blob_and_masks_are_separate() {
        let out = find_contours(&squares(&[(1, 1), (12, 12)], 4), RetrievalMode::External, ApproximationMode::Simple)
            .unwrap();
        assert_eq!(out.contours.len(), 2);
        for c in &out.contours {
            let lit = c.mask.pixels().filter(|p| p[0] == 255).count();
            assert_eq!(lit, 12);
        }
    }

    #[test]
    fn external_skips_holes() {
        let external = find_contours(&ring(), RetrievalMode::External, ApproximationMode::Simple).unwrap();
        assert_eq!(external.contours.len(), 1);
        let list = find_contours(&ring(), RetrievalMode::List, ApproximationMode::Simple).unwrap();
        assert_eq!(list.contours.len(), 2);
        let ccomp = find_contours(&ring(), RetrievalMode::CComp, ApproximationMode::Simple).unwrap();
        assert_eq!(ccomp.suffix, "FindContours_rm2_am2");
        assert_eq!(ccomp.contours.len(), 2);
        let tree = find_contours(&ring(), RetrievalMode::Tree, ApproximationMode::Tc89L1).unwrap();
        assert_eq!(tree.suffix, "FindContours_rm3_am3");
        assert_eq!(tree.contours.len(), 2);
    }

    #[test]
    fn contours_need_gray_input() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert!(matches!(
            find_contours(&rgb, RetrievalMode::List, ApproximationMode::None),
            Err(CvError::NotSingleChannel { .. })
        ));
        let empty = find_contours(&squares(&[], 1), RetrievalMode::List, ApproximationMode::None).unwrap();
        assert!(empty.contours.is_empty());
    }

    #[test]
    fn bounding_rects_are_light_green_on_target_copy() {
        let src = squares(&[(3, 3)], 5);
        let found = find_contours(&src, RetrievalMode::External, ApproximationMode::Simple).unwrap();
        let out = draw_bounding_rects(&src, &found.contours).unwrap();
        assert_eq!(out.suffix, "DrawingBoundingRect");
        let img = out.image.as_rgb8().unwrap();
        assert_eq!(*img.get_pixel(3, 3), BOUNDING_RECT_COLOR);
        assert_eq!(*img.get_pixel(7, 7), BOUNDING_RECT_COLOR);
        assert_eq!(img.get_pixel(5, 5).0, [255, 255, 255]);
        assert!(draw_bounding_rects(&src, &[]).is_err());
    }

    #[test]
    fn shoelace_area() {
        let tri = [Point::new(0, 0), Point::new(4, 0), Point::new(0, 3)];
        assert_eq!(polygon_area(&tri), 6.0);
        assert_eq!(polygon_area(&tri[..2]), 0.0);
    }
}
