use serde::{Deserialize, Serialize};

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Scale a normalized [0,1] point to pixel coordinates of a `width` x `height` image.
    pub fn to_pixels(self, width: u32, height: u32) -> Point {
        Point::new(self.x * width as f32, self.y * height as f32)
    }
}

/// An integer rectangle in pixel space, as produced by contour analysis.
///
/// `width` and `height` are inclusive pixel extents, so a single pixel has
/// size 1x1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// True if `other` lies entirely within this rectangle.
    pub fn contains(&self, other: &PixelRect) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    pub fn to_bbox(self) -> BoundingBox {
        BoundingBox::new(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }
}

/// A bounding box defined by top-left corner, width, and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Convert a point from normalized coordinates [0,1] to image coordinates
    /// within this bounding box.
    pub fn denormalize_point(&self, p: Point) -> Point {
        Point::new(self.x + p.x * self.width, self.y + p.y * self.height)
    }

    /// A square box centred on this one, with side `max(width, height) * scale`.
    pub fn squared(&self, scale: f32) -> BoundingBox {
        let side = self.width.max(self.height) * scale;
        let c = self.center();
        BoundingBox::new(c.x - side / 2.0, c.y - side / 2.0, side, side)
    }

    /// Intersect with the `width` x `height` image area. Returns `None` when
    /// nothing of the box lies inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x0 = self.x.max(0.0);
        let y0 = self.y.max(0.0);
        let x1 = (self.x + self.width).min(width as f32);
        let y1 = (self.y + self.height).min(height as f32);
        if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
            return None;
        }
        Some(BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_denormalization() {
        let bbox = BoundingBox::new(100.0, 100.0, 200.0, 200.0);

        let center_img = bbox.denormalize_point(Point::new(0.5, 0.5));
        assert_eq!(center_img.x, 200.0);
        assert_eq!(center_img.y, 200.0);
    }

    #[test]
    fn pixel_rect_containment() {
        let outer = PixelRect::new(10, 10, 100, 80);
        assert!(outer.contains(&PixelRect::new(10, 10, 100, 80)));
        assert!(outer.contains(&PixelRect::new(20, 30, 10, 10)));
        assert!(!outer.contains(&PixelRect::new(5, 30, 10, 10)));
        assert!(!outer.contains(&PixelRect::new(20, 30, 100, 10)));
    }

    #[test]
    fn pixel_rect_center_is_fractional() {
        let r = PixelRect::new(0, 0, 5, 4);
        assert_eq!(r.center(), Point::new(2.5, 2.0));
        assert!(PixelRect::default().is_empty());
    }

    #[test]
    fn squared_box_keeps_center() {
        let bbox = BoundingBox::new(10.0, 20.0, 40.0, 80.0);
        let sq = bbox.squared(1.5);
        assert_eq!(sq.width, 120.0);
        assert_eq!(sq.height, 120.0);
        assert_eq!(sq.center(), bbox.center());
    }

    #[test]
    fn clamp_to_image() {
        let bbox = BoundingBox::new(-10.0, -10.0, 50.0, 50.0);
        let clamped = bbox.clamp_to(30, 100).unwrap();
        assert_eq!(clamped, BoundingBox::new(0.0, 0.0, 30.0, 40.0));
        assert!(BoundingBox::new(200.0, 0.0, 10.0, 10.0).clamp_to(100, 100).is_none());
    }
}
