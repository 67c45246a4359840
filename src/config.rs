use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::oval::OvalParams;
use crate::scheme::LandmarkScheme;

#[cfg(feature = "onnx")]
use crate::facemesh::FaceMeshConfig;
#[cfg(feature = "rustface")]
use crate::rustface_backend::DetectorConfig;

pub const DEFAULT_IMAGE_SUFFIX: &str = "_Encoding.bmp";
pub const DEFAULT_ANNOTATE_DIR: &str = "_landmarks";

/// Settings for a batch run, loadable from a JSON file.
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub oval: OvalParams,
    pub scheme: LandmarkScheme,
    /// Only files whose name contains this string are processed.
    pub image_suffix: String,
    /// Annotated image directory. Relative paths are resolved against the
    /// directory of the output CSV.
    pub annotate_dir: PathBuf,
    /// Second location the finished CSV is copied to.
    pub mirror_csv: Option<PathBuf>,
    /// Detector tiers, in cascade order. Empty runs the landmark-only variant.
    #[cfg(feature = "rustface")]
    pub detectors: Vec<DetectorConfig>,
    #[cfg(feature = "onnx")]
    pub landmark_model: Option<FaceMeshConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            oval: OvalParams::default(),
            scheme: LandmarkScheme::default(),
            image_suffix: DEFAULT_IMAGE_SUFFIX.to_string(),
            annotate_dir: PathBuf::from(DEFAULT_ANNOTATE_DIR),
            mirror_csv: None,
            #[cfg(feature = "rustface")]
            detectors: Vec::new(),
            #[cfg(feature = "onnx")]
            landmark_model: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.oval.validate()?;
        if self.image_suffix.is_empty() {
            return Err(Error::InvalidParams("image_suffix must not be empty".into()));
        }
        // The annotation directory is wiped on every run, so it must name a
        // directory of its own.
        if !self
            .annotate_dir
            .components()
            .any(|c| matches!(c, Component::Normal(_)))
        {
            return Err(Error::InvalidParams(format!(
                "annotate_dir must name a dedicated directory, got '{}'",
                self.annotate_dir.display()
            )));
        }
        Ok(())
    }

    /// Annotation directory for a run writing `output_csv`.
    pub fn resolve_annotate_dir(&self, output_csv: &Path) -> PathBuf {
        if self.annotate_dir.is_absolute() {
            return self.annotate_dir.clone();
        }
        match output_csv.parent() {
            Some(parent) => parent.join(&self.annotate_dir),
            None => self.annotate_dir.clone(),
        }
    }
}
