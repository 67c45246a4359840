//! # stim-face
//!
//! Face geometry extraction for batches of face stimulus images.
//!
//! This crate provides:
//! - **Oval estimation**: contour-based bounding box of the face silhouette
//!   (erode/dilate, bilateral blur, Canny, external contours)
//! - **Detector cascade**: ordered face detector backends with oval fallback
//! - **Landmarks**: dense face-mesh inference projected onto a 68-point
//!   scheme or its 121/101-point extensions
//! - **Batch pipeline**: one CSV row per image, annotated previews, failure
//!   report
//! - **Tuning console**: interactive exploration of the oval parameters
//!
//! ## Pipeline
//!
//! 1. Estimate the face oval from the grayscale image
//! 2. Resolve a face box: detector backends in order, then the oval
//! 3. Run the landmark model inside the box and keep the scheme's points
//! 4. Emit a row with image size, oval geometry and landmark coordinates
//!
//! ## Quick Start
//!
//! ```rust
//! use stim_face::{GrayImage, OvalEstimator, OvalParams};
//!
//! let image = GrayImage::from_fn(200, 200, |x, y| {
//!     let dx = (x as f32 - 100.0) / 50.0;
//!     let dy = (y as f32 - 100.0) / 65.0;
//!     image::Luma([if dx * dx + dy * dy <= 1.0 { 40 } else { 255 }])
//! });
//!
//! let oval = OvalEstimator::default().estimate(&image, &OvalParams::default());
//! assert!(oval.success);
//! println!("face oval at {:?}", oval.rect);
//! ```
//!
//! ## Custom Backends
//!
//! Detectors and landmark models are traits. Implement [`FaceDetector`] or
//! [`LandmarkModel`] to plug in another engine:
//!
//! ```rust
//! use stim_face::{FaceBox, FaceDetector, GrayImage, Result};
//!
//! struct NoFaces;
//!
//! impl FaceDetector for NoFaces {
//!     fn name(&self) -> &str { "none-ever" }
//!     fn detect(&mut self, _gray: &GrayImage) -> Result<Option<FaceBox>> {
//!         Ok(None)
//!     }
//! }
//! ```

pub mod annotate;
pub mod config;
pub mod detector;
mod error;
pub mod filter;
pub mod landmarks;
pub mod oval;
pub mod pipeline;
pub mod scheme;
pub mod tuning;
mod types;

#[cfg(feature = "onnx")]
pub mod facemesh;
#[cfg(feature = "rustface")]
pub mod rustface_backend;

pub use config::PipelineConfig;
pub use detector::{DetectionResult, DetectorCascade, DetectorKind, FaceBox, FaceDetector};
pub use error::{Error, Result};
pub use filter::{ImageFilterBackend, ImageprocBackend};
pub use image::{GrayImage, RgbImage};
pub use landmarks::{DenseLandmarks, LandmarkExtractor, LandmarkModel, LandmarkSet};
pub use oval::{OvalEstimator, OvalParams, OvalResult};
pub use pipeline::{BatchPipeline, Report, Row, Stimulus};
pub use scheme::LandmarkScheme;
pub use tuning::{Command, Outcome, Stage, TuningConsole, TuningState};
pub use types::{BoundingBox, PixelRect, Point};

#[cfg(feature = "onnx")]
pub use facemesh::{FaceMeshConfig, FaceMeshModel};
#[cfg(feature = "rustface")]
pub use rustface_backend::{build_detectors, DetectorConfig, RustfaceDetector};
