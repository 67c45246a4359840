//! Dense landmark inference and projection onto sparse schemes.

use image::RgbImage;
use serde::Serialize;

use crate::error::Result;
use crate::scheme::LandmarkScheme;
use crate::types::{BoundingBox, Point};

/// Landmarks from a dense model, normalized to [0,1] relative to the full image.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLandmarks {
    pub points: Vec<Point>,
}

/// Pluggable dense facial landmark model.
pub trait LandmarkModel {
    fn name(&self) -> &str;

    /// Infer dense landmarks for the face inside `roi` (or the whole image).
    ///
    /// Returns `Ok(None)` when the model finds no face.
    fn infer(&mut self, image: &RgbImage, roi: Option<&BoundingBox>)
        -> Result<Option<DenseLandmarks>>;

    /// Switch iris/lip refinement on or off, for models that support it.
    fn set_refine(&mut self, _refine: bool) {}
}

/// A complete set of scheme landmarks in image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LandmarkSet {
    pub scheme: LandmarkScheme,
    pub points: Vec<Point>,
}

impl LandmarkSet {
    /// Project dense landmarks onto `scheme` and scale them to pixels.
    ///
    /// Returns `None` unless every point of the scheme is available.
    pub fn from_dense(
        dense: &DenseLandmarks,
        scheme: LandmarkScheme,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        let points = scheme
            .remap(&dense.points)?
            .into_iter()
            .map(|p| p.to_pixels(width, height))
            .collect();
        Some(Self { scheme, points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Runs a [`LandmarkModel`] on a resolved face box and remaps its output.
pub struct LandmarkExtractor {
    model: Box<dyn LandmarkModel>,
}

impl LandmarkExtractor {
    pub fn new(model: Box<dyn LandmarkModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn set_refine(&mut self, refine: bool) {
        self.model.set_refine(refine);
    }

    /// Dense landmarks for the face in `bbox`, or `None` on any miss.
    ///
    /// A missing box short-circuits without invoking the model; model errors
    /// are logged and reported as a miss.
    pub fn infer_dense(
        &mut self,
        image: &RgbImage,
        bbox: Option<&BoundingBox>,
    ) -> Option<DenseLandmarks> {
        let bbox = bbox?;
        match self.model.infer(image, Some(bbox)) {
            Ok(dense) => dense,
            Err(e) => {
                log::warn!("landmark model {} failed: {}", self.model.name(), e);
                None
            }
        }
    }

    pub fn extract(
        &mut self,
        image: &RgbImage,
        bbox: Option<&BoundingBox>,
        scheme: LandmarkScheme,
    ) -> Option<LandmarkSet> {
        let dense = self.infer_dense(image, bbox)?;
        let set = LandmarkSet::from_dense(&dense, scheme, image.width(), image.height());
        if set.is_none() {
            log::warn!(
                "landmark model {} returned {} points, scheme {} needs {}",
                self.model.name(),
                dense.points.len(),
                scheme,
                scheme.required_dense_len()
            );
        }
        set
    }
}
