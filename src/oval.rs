//! Contour-based face oval estimation.
//!
//! Stimulus images show a face on a plain background, so the silhouette can
//! be found geometrically: suppress speckle with an erosion/dilation pass,
//! smooth texture with a bilateral filter, run Canny, then take the union of
//! the bounding rectangles of every sufficiently large external contour.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filter::{ImageFilterBackend, MAX_KERNEL_SIZE};
use crate::types::PixelRect;

/// Tunable parameters of the oval estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OvalParams {
    /// Side of the square structuring element used for erosion/dilation.
    pub kernel_size: u32,
    /// Bilateral filter neighbourhood diameter.
    pub blur_diameter: i32,
    pub sigma_color: f32,
    pub sigma_space: f32,
    pub canny_low: u32,
    pub canny_high: u32,
    /// Contours narrower than this AND shorter than `min_contour_height` are discarded.
    pub min_contour_width: i32,
    pub min_contour_height: i32,
}

impl Default for OvalParams {
    fn default() -> Self {
        Self {
            kernel_size: 8,
            blur_diameter: 10,
            sigma_color: 10.0,
            sigma_space: 10.0,
            canny_low: 25,
            canny_high: 200,
            min_contour_width: 40,
            min_contour_height: 40,
        }
    }
}

impl OvalParams {
    pub fn validate(&self) -> Result<()> {
        if self.kernel_size == 0 || self.kernel_size > MAX_KERNEL_SIZE {
            return Err(Error::InvalidParams(format!(
                "kernel_size must be in 1..={}, got {}",
                MAX_KERNEL_SIZE, self.kernel_size
            )));
        }
        if self.sigma_color <= 0.0 || self.sigma_space <= 0.0 {
            return Err(Error::InvalidParams(format!(
                "blur sigmas must be positive, got color={} space={}",
                self.sigma_color, self.sigma_space
            )));
        }
        if self.canny_low < 1 || self.canny_low >= self.canny_high || self.canny_high > 255 {
            return Err(Error::InvalidParams(format!(
                "edge thresholds must satisfy 1 <= low < high <= 255, got {}/{}",
                self.canny_low, self.canny_high
            )));
        }
        Ok(())
    }
}

/// Output of [`OvalEstimator::estimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OvalResult {
    /// Union of accepted contour rectangles; all-zero when `success` is false.
    pub rect: PixelRect,
    pub success: bool,
}

impl OvalResult {
    pub const fn failed() -> Self {
        Self {
            rect: PixelRect::new(0, 0, 0, 0),
            success: false,
        }
    }
}

/// Every intermediate raster of one estimator run, for inspection.
pub struct OvalStages {
    pub dilated: GrayImage,
    pub blurred: GrayImage,
    pub edges: GrayImage,
    pub result: OvalResult,
}

/// Estimates the face oval of a grayscale image.
pub struct OvalEstimator {
    backend: Box<dyn ImageFilterBackend>,
}

impl OvalEstimator {
    pub fn new(backend: Box<dyn ImageFilterBackend>) -> Self {
        Self { backend }
    }

    pub fn estimate(&self, gray: &GrayImage, params: &OvalParams) -> OvalResult {
        self.estimate_stages(gray, params).result
    }

    pub fn estimate_stages(&self, gray: &GrayImage, params: &OvalParams) -> OvalStages {
        let eroded = self.backend.erode(gray, params.kernel_size);
        let dilated = self.backend.dilate(&eroded, params.kernel_size);
        let blurred = self.backend.bilateral(
            &dilated,
            params.blur_diameter,
            params.sigma_color,
            params.sigma_space,
        );
        let edges = self
            .backend
            .canny(&blurred, params.canny_low as f32, params.canny_high as f32);

        let rects = self.backend.external_contour_rects(&edges);
        let result = aggregate_rects(
            &rects,
            gray.dimensions(),
            params.min_contour_width,
            params.min_contour_height,
        );
        log::trace!(
            "oval: {} contours, result {:?} (success={})",
            rects.len(),
            result.rect,
            result.success
        );

        OvalStages {
            dilated,
            blurred,
            edges,
            result,
        }
    }
}

impl Default for OvalEstimator {
    fn default() -> Self {
        Self::new(Box::new(crate::filter::ImageprocBackend))
    }
}

/// True if a contour rectangle survives the minimum-size filter.
///
/// Only rectangles small in both dimensions are rejected; thin elongated
/// contours (hair, glasses frames) are kept.
pub fn accepts_rect(rect: &PixelRect, min_width: i32, min_height: i32) -> bool {
    !(rect.width < min_width && rect.height < min_height)
}

/// Union bounding box over every accepted rectangle.
pub fn aggregate_rects(
    rects: &[PixelRect],
    (img_w, img_h): (u32, u32),
    min_width: i32,
    min_height: i32,
) -> OvalResult {
    let (mut x1, mut y1, mut x2, mut y2) = (img_w as i32, img_h as i32, 0, 0);
    for r in rects.iter().filter(|r| accepts_rect(r, min_width, min_height)) {
        x1 = x1.min(r.x);
        y1 = y1.min(r.y);
        x2 = x2.max(r.right());
        y2 = y2.max(r.bottom());
    }

    if x2 == 0 || y2 == 0 {
        return OvalResult::failed();
    }
    OvalResult {
        rect: PixelRect::new(x1, y1, x2 - x1, y2 - y1),
        success: true,
    }
}
