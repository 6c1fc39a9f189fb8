use image::{DynamicImage, GenericImageView, GrayImage};
use imageproc::point::Point;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::labels;
use crate::operators;

/// Axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Smallest rectangle containing every point (None for an empty slice)
    pub fn bounding(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        })
    }

    pub fn area(&self) -> u32 {
        self.width * self.height
    }
}

impl From<Rect> for imageproc::rect::Rect {
    fn from(r: Rect) -> Self {
        imageproc::rect::Rect::at(r.x, r.y).of_size(r.width.max(1), r.height.max(1))
    }
}

/// One contour found by the contour detector, with derived geometry
#[derive(Debug, Clone)]
pub struct ContourObject {
    /// Single-channel image of the source size holding only this outline
    pub mask: GrayImage,
    pub points: Vec<Point<i32>>,
    pub area: f64,
    pub perimeter: f64,
    pub bounding_rect: Rect,
}

/// A node of the edit history: an image plus the label describing how it was produced.
///
/// Operations are never modified after creation; operators always produce a new one.
#[derive(Debug, Clone)]
pub struct Operation {
    id: Uuid,
    name: String,
    image: DynamicImage,
    contours: Vec<ContourObject>,
    created_at: OffsetDateTime,
}

impl Operation {
    /// Create an operation, normalising the image to 8-bit gray or RGB
    pub fn new(name: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            image: operators::normalize(image),
            contours: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_contours(mut self, contours: Vec<ContourObject>) -> Self {
        self.contours = contours;
        self
    }

    /// Rebuild an operation with a known identity (used when importing sessions)
    pub(crate) fn restore(
        id: Uuid,
        name: String,
        image: DynamicImage,
        contours: Vec<ContourObject>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            name,
            image: operators::normalize(image),
            contours,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Full chained name, e.g. `photo.png_RGB2GRAY_GaussianBlur_k5`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> String {
        labels::display_name(&self.name)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn contours(&self) -> &[ContourObject] {
        &self.contours
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        let (w, h) = self.dimensions();
        w == 0 || h == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn bounding_rect_covers_all_points() {
        let points = vec![Point::new(3, 4), Point::new(7, 2), Point::new(5, 9)];
        let rect = Rect::bounding(&points).unwrap();
        assert_eq!(rect, Rect { x: 3, y: 2, width: 5, height: 8 });
        assert_eq!(rect.area(), 40);
        assert!(Rect::bounding(&[]).is_none());
    }

    #[test]
    fn operation_drops_alpha_channel() {
        let rgba = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 128]));
        let op = Operation::new("a.png", DynamicImage::ImageRgba8(rgba));
        assert_eq!(op.channels(), 3);
        assert_eq!(op.image().to_rgb8().get_pixel(0, 0).0, [10, 20, 30]);
    }
}
