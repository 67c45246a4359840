//! Batch processing of a stimulus directory into a landmark CSV.

use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use serde::Serialize;

use crate::annotate;
use crate::config::PipelineConfig;
use crate::detector::{DetectionResult, DetectorCascade};
use crate::error::{Error, Result};
use crate::landmarks::{LandmarkExtractor, LandmarkSet};
use crate::oval::{OvalEstimator, OvalResult};
use crate::scheme::LandmarkScheme;

/// Missing value marker in the CSV.
pub const NA: &str = "NA";

/// A decoded stimulus image.
pub struct Stimulus {
    pub name: String,
    pub rgb: RgbImage,
    pub gray: GrayImage,
}

impl Stimulus {
    pub fn load(path: &Path) -> Result<Self> {
        let img = image::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            rgb: img.to_rgb8(),
            gray: img.to_luma8(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }

    /// File name up to the first `.`, used for derived outputs.
    pub fn stem(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }
}

/// Sorted paths of every file in `dir` whose name contains `suffix`.
pub fn list_stimuli(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().contains(suffix) {
            paths.push(entry.path());
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Pick the face region for an image: the detector cascade when one is
/// configured, else the oval box.
pub fn resolve_face(
    cascade: Option<&mut DetectorCascade>,
    gray: &GrayImage,
    oval: &OvalResult,
) -> DetectionResult {
    match cascade {
        Some(cascade) => cascade.detect(gray, oval),
        None => DetectionResult::from_oval(oval),
    }
}

/// Format a value rounded to 3 decimals, always with a fractional part.
pub fn fmt_round3(value: f32) -> String {
    let mut rounded = (value as f64 * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        rounded = 0.0;
    }
    let s = rounded.to_string();
    if s.contains('.') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Per-image analysis result, one CSV row.
#[derive(Debug, Clone)]
pub struct Row {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub oval: OvalResult,
    pub detection: DetectionResult,
    pub landmarks: Option<LandmarkSet>,
}

impl Row {
    pub fn header(scheme: LandmarkScheme, with_detector: bool) -> Vec<String> {
        let mut header: Vec<String> = ["image", "img_w", "img_h", "oval_cx", "oval_cy", "oval_w", "oval_h"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if with_detector {
            header.push("detector".into());
            header.push("confidence".into());
        }
        for i in 0..scheme.len() {
            header.push(format!("x_{}", i));
            header.push(format!("y_{}", i));
        }
        header
    }

    /// True when the oval failed or no landmarks were found.
    pub fn is_failure(&self) -> bool {
        !self.oval.success || self.landmarks.is_none()
    }

    pub fn to_record(&self, scheme: LandmarkScheme, with_detector: bool) -> Vec<String> {
        let mut record = vec![
            self.image.clone(),
            self.width.to_string(),
            self.height.to_string(),
        ];

        if self.oval.success {
            let c = self.oval.rect.center();
            record.push(fmt_round3(c.x));
            record.push(fmt_round3(c.y));
            record.push(self.oval.rect.width.to_string());
            record.push(self.oval.rect.height.to_string());
        } else {
            record.extend(std::iter::repeat(NA.to_string()).take(4));
        }

        if with_detector {
            record.push(self.detection.source.to_string());
            record.push(
                self.detection
                    .confidence
                    .map(fmt_round3)
                    .unwrap_or_else(|| NA.to_string()),
            );
        }

        match &self.landmarks {
            Some(set) => {
                for p in &set.points {
                    record.push(fmt_round3(p.x));
                    record.push(fmt_round3(p.y));
                }
            }
            None => record.extend(std::iter::repeat(NA.to_string()).take(2 * scheme.len())),
        }
        record
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub processed: usize,
    /// Names of images with no oval or no landmarks.
    pub failures: Vec<String>,
    /// Every CSV file written.
    pub outputs: Vec<PathBuf>,
}

/// Sequential batch runner over a stimulus directory.
pub struct BatchPipeline {
    config: PipelineConfig,
    estimator: OvalEstimator,
    cascade: Option<DetectorCascade>,
    extractor: LandmarkExtractor,
}

impl BatchPipeline {
    /// Landmark-only pipeline: the oval box is the face region.
    pub fn new(config: PipelineConfig, extractor: LandmarkExtractor) -> Self {
        Self {
            config,
            estimator: OvalEstimator::default(),
            cascade: None,
            extractor,
        }
    }

    /// Switch to the cascade variant, adding the `detector` and `confidence`
    /// columns.
    pub fn with_cascade(mut self, cascade: DetectorCascade) -> Self {
        self.cascade = Some(cascade);
        self
    }

    fn with_detector(&self) -> bool {
        self.cascade.is_some()
    }

    /// Analyze a single stimulus.
    pub fn process(&mut self, stimulus: &Stimulus, scheme: LandmarkScheme) -> Row {
        let oval = self.estimator.estimate(&stimulus.gray, &self.config.oval);
        let detection = resolve_face(self.cascade.as_mut(), &stimulus.gray, &oval);
        let landmarks = self
            .extractor
            .extract(&stimulus.rgb, detection.bbox.as_ref(), scheme);
        let (width, height) = stimulus.dimensions();

        log::debug!(
            "{}: oval={} face={} landmarks={}",
            stimulus.name,
            oval.success,
            detection.source,
            landmarks.as_ref().map_or(0, |l| l.len())
        );

        Row {
            image: stimulus.name.clone(),
            width,
            height,
            oval,
            detection,
            landmarks,
        }
    }

    pub fn run(
        &mut self,
        image_dir: &Path,
        scheme: LandmarkScheme,
        output_csv: &Path,
        annotate: bool,
    ) -> Result<Report> {
        self.config.validate()?;
        let paths = list_stimuli(image_dir, &self.config.image_suffix)?;
        if paths.is_empty() {
            return Err(Error::EmptyInput {
                dir: image_dir.to_path_buf(),
                suffix: self.config.image_suffix.clone(),
            });
        }

        let annotate_dir = if annotate {
            let dir = self.config.resolve_annotate_dir(output_csv);
            let mut keep = vec![image_dir, output_csv];
            if let Some(mirror) = &self.config.mirror_csv {
                keep.push(mirror.as_path());
            }
            reset_dir(&dir, &keep)?;
            Some(dir)
        } else {
            None
        };

        log::info!(
            "processing {} images from {} with {}",
            paths.len(),
            image_dir.display(),
            self.extractor.model_name()
        );

        let total = paths.len();
        let mut rows = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut last_pct = 0;

        for (n, path) in paths.iter().enumerate() {
            let stimulus = Stimulus::load(path)?;
            let row = self.process(&stimulus, scheme);

            if row.is_failure() {
                failures.push(row.image.clone());
            }

            if let Some(dir) = &annotate_dir {
                let mut canvas = stimulus.rgb.clone();
                annotate::draw_oval(&mut canvas, &row.oval, annotate::OVAL_COLOR);
                if let Some(set) = &row.landmarks {
                    annotate::draw_landmarks(&mut canvas, &set.points, annotate::LANDMARK_COLOR);
                }
                canvas.save(dir.join(format!("{}.png", stimulus.stem())))?;
            }

            rows.push(row);

            let pct = (n + 1) * 10 / total * 10;
            if pct > last_pct {
                log::info!("{}% ...", pct);
                last_pct = pct;
            }
        }

        let with_detector = self.with_detector();
        let mut outputs = vec![output_csv.to_path_buf()];
        write_csv_atomic(output_csv, scheme, with_detector, &rows)?;
        if let Some(mirror) = &self.config.mirror_csv {
            if let Some(parent) = mirror.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            write_csv_atomic(mirror, scheme, with_detector, &rows)?;
            outputs.push(mirror.clone());
        }

        if failures.is_empty() {
            log::info!("all {} images processed successfully", total);
        } else {
            log::info!(
                "{} of {} images failed: {}",
                failures.len(),
                total,
                failures.join(", ")
            );
        }

        Ok(Report {
            processed: total,
            failures,
            outputs,
        })
    }
}

/// Absolute form of `path`, resolving symlinks where the path or its parent
/// exists.
fn absolute(path: &Path) -> PathBuf {
    if let Ok(p) = fs::canonicalize(path) {
        return p;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            fs::canonicalize(parent)
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// Empty `dir`, creating it if needed. Fails without touching anything when
/// `dir` is or contains one of the `keep` paths.
fn reset_dir(dir: &Path, keep: &[&Path]) -> Result<()> {
    if dir.exists() {
        let target = absolute(dir);
        if let Some(hit) = keep.iter().find(|p| absolute(p).starts_with(&target)) {
            return Err(Error::InvalidParams(format!(
                "refusing to clear annotation directory {}: it holds {}",
                dir.display(),
                hit.display()
            )));
        }
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Write header and rows to a temp file beside `path`, then move it into place.
fn write_csv_atomic(
    path: &Path,
    scheme: LandmarkScheme,
    with_detector: bool,
    rows: &[Row],
) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(&mut tmp);
        writer.write_record(Row::header(scheme, with_detector))?;
        for row in rows {
            writer.write_record(row.to_record(scheme, with_detector))?;
        }
        writer.flush()?;
    }
    tmp.persist(path)?;
    log::debug!("wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
