use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::detector::{FaceBox, FaceDetector};
use crate::error::{Error, Result};
use crate::types::BoundingBox;

/// Settings for one SeetaFace detection tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub name: String,
    pub model: PathBuf,
    pub min_face_size: u32,
    pub score_thresh: f64,
    pub pyramid_scale_factor: f32,
    pub slide_window_step: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            name: "seeta".to_string(),
            model: PathBuf::from("seeta_fd_frontal_v1.0.bin"),
            min_face_size: 20,
            score_thresh: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: 4,
        }
    }
}

impl DetectorConfig {
    /// A strict tier followed by a lenient one over the same model file.
    ///
    /// The lenient tier searches a finer pyramid with a lower score threshold,
    /// catching profile and low-contrast faces the strict tier rejects.
    pub fn tiers(model: impl Into<PathBuf>) -> Vec<DetectorConfig> {
        let model = model.into();
        vec![
            DetectorConfig {
                model: model.clone(),
                ..DetectorConfig::default()
            },
            DetectorConfig {
                name: "seeta-lenient".to_string(),
                model,
                score_thresh: 0.5,
                pyramid_scale_factor: 0.9,
                slide_window_step: 2,
                ..DetectorConfig::default()
            },
        ]
    }
}

/// Face detector backed by the `rustface` crate (SeetaFace engine).
pub struct RustfaceDetector {
    config: DetectorConfig,
    detector: Box<dyn rustface::Detector>,
}

impl RustfaceDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let file = File::open(&config.model)?;
        let model = rustface::read_model(BufReader::new(file)).map_err(|e| {
            Error::Model(format!(
                "failed to load SeetaFace model {}: {}",
                config.model.display(),
                e
            ))
        })?;

        let mut detector = rustface::create_detector_with_model(model);
        detector.set_min_face_size(config.min_face_size);
        detector.set_score_thresh(config.score_thresh);
        detector.set_pyramid_scale_factor(config.pyramid_scale_factor);
        detector.set_slide_window_step(config.slide_window_step, config.slide_window_step);

        Ok(Self { config, detector })
    }
}

impl FaceDetector for RustfaceDetector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn detect(&mut self, gray: &GrayImage) -> Result<Option<FaceBox>> {
        let (width, height) = gray.dimensions();
        let faces = self
            .detector
            .detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        let best = faces
            .iter()
            .max_by(|a, b| a.score().total_cmp(&b.score()));

        Ok(best.map(|face| {
            let bbox = face.bbox();
            FaceBox {
                bbox: BoundingBox::new(
                    bbox.x() as f32,
                    bbox.y() as f32,
                    bbox.width() as f32,
                    bbox.height() as f32,
                ),
                confidence: Some(face.score() as f32),
            }
        }))
    }
}

/// Build one detector per configured tier, in order.
pub fn build_detectors(configs: &[DetectorConfig]) -> Result<Vec<Box<dyn FaceDetector>>> {
    configs
        .iter()
        .map(|c| RustfaceDetector::new(c.clone()).map(|d| Box::new(d) as Box<dyn FaceDetector>))
        .collect()
}
