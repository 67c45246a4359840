//! Low-level raster primitives used by the oval estimator.
//!
//! [`ImageFilterBackend`] is the seam between the contour-aggregation logic
//! and the pixel operations it needs. [`ImageprocBackend`] is the built-in
//! implementation: morphology, edge detection and contour tracing come from
//! `imageproc`. The bilateral filter is computed directly on
//! `image::GrayImage` over a disk-shaped window with an unquantized range
//! kernel.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
use imageproc::point::Point as ContourPoint;

use crate::types::PixelRect;

/// Largest structuring element side a morphology mask supports.
pub const MAX_KERNEL_SIZE: u32 = 511;

/// Pixel operations needed to estimate a face oval.
pub trait ImageFilterBackend {
    /// Grayscale erosion with a `kernel_size` x `kernel_size` square kernel.
    /// Pixels outside the image do not take part.
    fn erode(&self, image: &GrayImage, kernel_size: u32) -> GrayImage;

    /// Grayscale dilation with a `kernel_size` x `kernel_size` square kernel.
    fn dilate(&self, image: &GrayImage, kernel_size: u32) -> GrayImage;

    /// Edge-preserving smoothing.
    ///
    /// `diameter` is the pixel neighbourhood diameter; a non-positive value
    /// derives it from `sigma_space`.
    fn bilateral(
        &self,
        image: &GrayImage,
        diameter: i32,
        sigma_color: f32,
        sigma_space: f32,
    ) -> GrayImage;

    /// Binary edge map (0 / 255) using hysteresis thresholds.
    fn canny(&self, image: &GrayImage, low: f32, high: f32) -> GrayImage;

    /// Bounding rectangles of the outermost contours of a binary image.
    fn external_contour_rects(&self, edges: &GrayImage) -> Vec<PixelRect>;
}

/// Default [`ImageFilterBackend`] built on `image` and `imageproc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageprocBackend;

impl ImageFilterBackend for ImageprocBackend {
    fn erode(&self, image: &GrayImage, kernel_size: u32) -> GrayImage {
        grayscale_erode(image, &rect_mask(kernel_size))
    }

    fn dilate(&self, image: &GrayImage, kernel_size: u32) -> GrayImage {
        grayscale_dilate(image, &rect_mask(kernel_size))
    }

    fn bilateral(
        &self,
        image: &GrayImage,
        diameter: i32,
        sigma_color: f32,
        sigma_space: f32,
    ) -> GrayImage {
        bilateral_filter(image, diameter, sigma_color, sigma_space)
    }

    fn canny(&self, image: &GrayImage, low: f32, high: f32) -> GrayImage {
        imageproc::edges::canny(image, low, high)
    }

    fn external_contour_rects(&self, edges: &GrayImage) -> Vec<PixelRect> {
        find_contours::<i32>(edges)
            .into_iter()
            .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
            .filter_map(|c| bounding_rect(&c.points))
            .collect()
    }
}

/// Axis-aligned bounding rectangle of a point set, with inclusive extents.
pub fn bounding_rect(points: &[ContourPoint<i32>]) -> Option<PixelRect> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Some(PixelRect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Square structuring element of side `kernel_size`, anchored at
/// `kernel_size / 2` like OpenCV's default anchor.
fn rect_mask(kernel_size: u32) -> Mask {
    let side = kernel_size.clamp(1, MAX_KERNEL_SIZE);
    let anchor = (side / 2) as u8;
    Mask::from_image(&GrayImage::from_pixel(side, side, Luma([255])), anchor, anchor)
}

/// Bilateral filter over a circular window with replicated borders.
fn bilateral_filter(
    image: &GrayImage,
    diameter: i32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let sigma_color = if sigma_color > 0.0 { sigma_color } else { 1.0 };
    let sigma_space = if sigma_space > 0.0 { sigma_space } else { 1.0 };
    let radius = if diameter > 0 {
        diameter / 2
    } else {
        (sigma_space * 1.5).round() as i32
    }
    .max(1);

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let color_weights: Vec<f32> = (0..256)
        .map(|d: i32| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let mut window = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2.sqrt() > radius as f32 {
                continue;
            }
            window.push((dx, dy, (r2 * space_coeff).exp()));
        }
    }

    let (w, h) = image.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let center = image.get_pixel(x, y)[0];
        let mut sum = 0.0f32;
        let mut weight_sum = 0.0f32;
        for &(dx, dy, space_weight) in &window {
            let sx = (x as i32 + dx).clamp(0, w as i32 - 1) as u32;
            let sy = (y as i32 + dy).clamp(0, h as i32 - 1) as u32;
            let v = image.get_pixel(sx, sy)[0];
            let weight = space_weight * color_weights[center.abs_diff(v) as usize];
            sum += weight * v as f32;
            weight_sum += weight;
        }
        Luma([(sum / weight_sum).round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_image(size: u32, x0: u32, y0: u32, side: u32, fg: u8, bg: u8) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let inside = x >= x0 && x < x0 + side && y >= y0 && y < y0 + side;
            Luma([if inside { fg } else { bg }])
        })
    }

    #[test]
    fn erosion_removes_small_specks() {
        let img = square_image(40, 10, 10, 3, 255, 0);
        let eroded = ImageprocBackend.erode(&img, 8);
        assert!(eroded.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn opening_preserves_large_regions() {
        let img = square_image(60, 10, 10, 30, 255, 0);
        let b = ImageprocBackend;
        let opened = b.dilate(&b.erode(&img, 8), 8);
        assert_eq!(opened.get_pixel(25, 25)[0], 255);
        assert_eq!(opened.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn kernel_of_one_is_identity() {
        let img = square_image(20, 5, 5, 4, 200, 10);
        assert_eq!(ImageprocBackend.erode(&img, 1), img);
    }

    #[test]
    fn dilation_kernel_is_anchored_at_half_side() {
        let img = square_image(40, 20, 20, 1, 255, 0);
        let dilated = ImageprocBackend.dilate(&img, 8);
        let lit: Vec<u32> = (0..40).filter(|&x| dilated.get_pixel(x, 20)[0] == 255).collect();
        assert_eq!(lit, (17..=24).collect::<Vec<_>>());
        let lit: Vec<u32> = (0..40).filter(|&y| dilated.get_pixel(20, y)[0] == 255).collect();
        assert_eq!(lit, (17..=24).collect::<Vec<_>>());
    }

    #[test]
    fn morphology_keeps_uniform_image_and_matches_imageproc() {
        let flat = GrayImage::from_pixel(30, 20, Luma([90]));
        assert_eq!(ImageprocBackend.erode(&flat, 8), flat);
        assert_eq!(ImageprocBackend.dilate(&flat, 8), flat);

        let textured = GrayImage::from_fn(97, 83, |x, y| Luma([((x * 37 + y * 91) % 256) as u8]));
        let mask = Mask::from_image(&GrayImage::from_pixel(8, 8, Luma([255])), 4, 4);
        assert_eq!(
            ImageprocBackend.erode(&textured, 8),
            grayscale_erode(&textured, &mask)
        );
        assert_eq!(
            ImageprocBackend.dilate(&textured, 8),
            grayscale_dilate(&textured, &mask)
        );
    }

    #[test]
    fn bilateral_keeps_uniform_image() {
        let img = GrayImage::from_pixel(30, 30, Luma([77]));
        let out = ImageprocBackend.bilateral(&img, 10, 10.0, 10.0);
        assert!(out.pixels().all(|p| p[0] == 77));
    }

    #[test]
    fn bilateral_preserves_strong_step() {
        let img = GrayImage::from_fn(40, 40, |x, _| Luma([if x < 20 { 0 } else { 255 }]));
        let out = ImageprocBackend.bilateral(&img, 10, 10.0, 10.0);
        assert!(out.get_pixel(18, 20)[0] < 10);
        assert!(out.get_pixel(21, 20)[0] > 245);
    }

    #[test]
    fn canny_on_uniform_image_is_empty() {
        let img = GrayImage::from_pixel(50, 50, Luma([128]));
        let edges = ImageprocBackend.canny(&img, 25.0, 200.0);
        assert!(edges.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn contour_rect_of_filled_square() {
        let img = square_image(50, 10, 12, 20, 255, 0);
        let rects = ImageprocBackend.external_contour_rects(&img);
        assert_eq!(rects, vec![PixelRect::new(10, 12, 20, 20)]);
    }

    #[test]
    fn nested_contours_report_only_the_outer_one() {
        // Hollow square ring: one outer border and one hole.
        let img = GrayImage::from_fn(50, 50, |x, y| {
            let outer = (10..40).contains(&x) && (10..40).contains(&y);
            let inner = (15..35).contains(&x) && (15..35).contains(&y);
            let dot = (24..26).contains(&x) && (24..26).contains(&y);
            Luma([if (outer && !inner) || dot { 255 } else { 0 }])
        });
        let rects = ImageprocBackend.external_contour_rects(&img);
        assert_eq!(rects, vec![PixelRect::new(10, 10, 30, 30)]);
    }

    #[test]
    fn bounding_rect_of_points() {
        let pts = [
            ContourPoint::new(3, 4),
            ContourPoint::new(7, 2),
            ContourPoint::new(5, 9),
        ];
        assert_eq!(bounding_rect(&pts), Some(PixelRect::new(3, 2, 5, 8)));
        assert_eq!(bounding_rect(&[]), None);
    }
}
