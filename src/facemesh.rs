//! ONNX face-mesh landmark backend.
//!
//! Runs a MediaPipe-style face landmark network: a square crop around the
//! face box is resized to the network input (192x192, NHWC, values in [0,1]).
//! The first output holds `(x, y, z)` triples in input pixels: 468 points,
//! or 478 for exports that fold the iris points into the mesh. Among the
//! remaining outputs, the first single-value tensor is taken as the
//! face-presence logit. Separate lip, eye and iris refinement tensors are
//! ignored. Every landmark scheme reads dense indices below 468.

use std::path::PathBuf;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::landmarks::{DenseLandmarks, LandmarkModel};
use crate::types::{BoundingBox, Point};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceMeshConfig {
    pub model: PathBuf,
    /// Model with iris/lip refinement, used while refinement is on.
    pub refined_model: Option<PathBuf>,
    pub input_size: u32,
    /// Minimum face-presence probability to accept the mesh.
    pub presence_threshold: f32,
    /// Extra context around the face box, as a fraction of its longer side.
    pub roi_margin: f32,
}

impl Default for FaceMeshConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("face_landmark.onnx"),
            refined_model: None,
            input_size: 192,
            presence_threshold: 0.5,
            roi_margin: 0.5,
        }
    }
}

pub struct FaceMeshModel {
    config: FaceMeshConfig,
    session: Session,
    refined: Option<Session>,
    refine: bool,
}

impl FaceMeshModel {
    pub fn new(config: FaceMeshConfig) -> Result<Self> {
        let session = Session::builder()?.commit_from_file(&config.model)?;
        let refined = match &config.refined_model {
            Some(path) => Some(Session::builder()?.commit_from_file(path)?),
            None => None,
        };
        log::debug!(
            "loaded face mesh {} (refined: {})",
            config.model.display(),
            refined.is_some()
        );
        Ok(Self {
            refine: refined.is_some(),
            config,
            session,
            refined,
        })
    }

    /// Square crop around `roi`, padded with black outside the image and
    /// resized to the network input. Returns the crop and its source box.
    fn prepare(&self, image: &RgbImage, roi: &BoundingBox) -> Option<(RgbImage, BoundingBox)> {
        let size = self.config.input_size;
        let square = roi.squared(1.0 + self.config.roi_margin);
        let visible = square.clamp_to(image.width(), image.height())?;
        let scale = size as f32 / square.width;

        let crop = imageops::crop_imm(
            image,
            visible.x as u32,
            visible.y as u32,
            visible.width as u32,
            visible.height as u32,
        )
        .to_image();
        let resized = imageops::resize(
            &crop,
            ((visible.width * scale).round() as u32).clamp(1, size),
            ((visible.height * scale).round() as u32).clamp(1, size),
            FilterType::Triangle,
        );

        let mut canvas = RgbImage::new(size, size);
        imageops::overlay(
            &mut canvas,
            &resized,
            ((visible.x - square.x) * scale).round() as i64,
            ((visible.y - square.y) * scale).round() as i64,
        );
        Some((canvas, square))
    }
}

impl LandmarkModel for FaceMeshModel {
    fn name(&self) -> &str {
        if self.refine && self.refined.is_some() {
            "facemesh-refined"
        } else {
            "facemesh"
        }
    }

    fn infer(
        &mut self,
        image: &RgbImage,
        roi: Option<&BoundingBox>,
    ) -> Result<Option<DenseLandmarks>> {
        let (width, height) = image.dimensions();
        let full = BoundingBox::new(0.0, 0.0, width as f32, height as f32);
        let Some((input, square)) = self.prepare(image, roi.unwrap_or(&full)) else {
            return Ok(None);
        };

        let size = self.config.input_size as usize;
        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
        for (x, y, px) in input.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = px[c] as f32 / 255.0;
            }
        }

        let threshold = self.config.presence_threshold;
        let refine = self.refine;
        let session = match self.refined.as_mut() {
            Some(refined) if refine => refined,
            _ => &mut self.session,
        };

        let outputs = session.run(ort::inputs![Tensor::from_array(tensor)?])?;

        let mut extras = Vec::with_capacity(outputs.len().saturating_sub(1));
        for i in 1..outputs.len() {
            if let Ok(values) = outputs[i].try_extract_array::<f32>() {
                extras.push(values.iter().copied().collect::<Vec<f32>>());
            }
        }
        if let Some(logit) = presence_logit(&extras) {
            let presence = 1.0 / (1.0 + (-logit).exp());
            if presence < threshold {
                log::debug!("face mesh presence {:.3} below {:.3}", presence, threshold);
                return Ok(None);
            }
        }

        let mesh = outputs[0].try_extract_array::<f32>()?;
        let raw: Vec<f32> = mesh.iter().copied().collect();
        let points = mesh_points(&raw, size as f32, &square, width, height);

        Ok(Some(DenseLandmarks { points }))
    }

    fn set_refine(&mut self, refine: bool) {
        if refine && self.refined.is_none() {
            log::warn!("no refined face mesh model configured, keeping the plain mesh");
        }
        self.refine = refine;
    }
}

/// The presence output is the only single-value tensor a face-mesh export
/// produces.
fn presence_logit(outputs: &[Vec<f32>]) -> Option<f32> {
    outputs
        .iter()
        .find(|values| values.len() == 1)
        .map(|values| values[0])
}

/// Map `(x, y, z)` triples in crop pixels to points normalized to the image.
fn mesh_points(raw: &[f32], input_size: f32, square: &BoundingBox, width: u32, height: u32) -> Vec<Point> {
    raw.chunks_exact(3)
        .map(|xyz| {
            let px = square.denormalize_point(Point::new(xyz[0] / input_size, xyz[1] / input_size));
            Point::new(px.x / width as f32, px.y / height as f32)
        })
        .collect()
}
