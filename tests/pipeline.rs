//! End-to-end batch runs over synthetic stimulus directories.

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use stim_face::{
    BatchPipeline, BoundingBox, DenseLandmarks, DetectorCascade, Error, FaceBox, FaceDetector,
    GrayImage, LandmarkExtractor, LandmarkModel, LandmarkScheme, PipelineConfig, Point, Result,
};

/// Mesh of 478 points spread over the face box.
struct BoxMesh;

impl LandmarkModel for BoxMesh {
    fn name(&self) -> &str {
        "box-mesh"
    }

    fn infer(
        &mut self,
        image: &RgbImage,
        roi: Option<&BoundingBox>,
    ) -> Result<Option<DenseLandmarks>> {
        let Some(roi) = roi else {
            return Ok(None);
        };
        let (w, h) = image.dimensions();
        let points = (0..478)
            .map(|i| {
                let fx = (i % 22) as f32 / 21.0;
                let fy = (i / 22) as f32 / 21.0;
                Point::new(
                    (roi.x + fx * roi.width) / w as f32,
                    (roi.y + fy * roi.height) / h as f32,
                )
            })
            .collect();
        Ok(Some(DenseLandmarks { points }))
    }
}

/// Detector that only ever finds a fixed box in images of one width.
struct WidthDetector(u32);

impl FaceDetector for WidthDetector {
    fn name(&self) -> &str {
        "width-gate"
    }

    fn detect(&mut self, gray: &GrayImage) -> Result<Option<FaceBox>> {
        if gray.width() != self.0 {
            return Ok(None);
        }
        Ok(Some(FaceBox {
            bbox: BoundingBox::new(20.0, 20.0, 100.0, 120.0),
            confidence: Some(0.87654),
        }))
    }
}

fn face_stimulus(width: u32, height: u32) -> RgbImage {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let (rx, ry) = (width as f32 / 4.0, height as f32 / 3.0);
    RgbImage::from_fn(width, height, |x, y| {
        let dx = (x as f32 - cx) / rx;
        let dy = (y as f32 - cy) / ry;
        if dx * dx + dy * dy <= 1.0 {
            Rgb([60, 45, 40])
        } else {
            Rgb([250, 250, 250])
        }
    })
}

/// Two stimuli (a face and a blank) plus a file the suffix filter skips.
fn stimulus_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    face_stimulus(200, 200)
        .save(dir.path().join("face01_Encoding.bmp"))
        .unwrap();
    RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]))
        .save(dir.path().join("blank02_Encoding.bmp"))
        .unwrap();
    face_stimulus(200, 200)
        .save(dir.path().join("face01_Recall.bmp"))
        .unwrap();
    dir
}

fn pipeline(config: PipelineConfig) -> BatchPipeline {
    BatchPipeline::new(config, LandmarkExtractor::new(Box::new(BoxMesh)))
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.split(',').map(str::to_string).collect())
        .collect()
}

#[test]
fn landmark_only_run_writes_one_row_per_image() {
    let input = stimulus_dir();
    let out = tempfile::tempdir().unwrap();
    let csv_path = out.path().join("facedata.csv");

    let report = pipeline(PipelineConfig::default())
        .run(input.path(), LandmarkScheme::ExtendedNoMouth, &csv_path, false)
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.failures, vec!["blank02_Encoding.bmp".to_string()]);
    assert_eq!(report.outputs, vec![csv_path.clone()]);

    let rows = read_rows(&csv_path);
    assert_eq!(rows.len(), 3);
    let width = 7 + 2 * 101;
    assert!(rows.iter().all(|r| r.len() == width));
    assert_eq!(rows[0][0], "image");
    assert_eq!(rows[0][7], "x_0");

    // Sorted by name: blank before face.
    let blank = &rows[1];
    assert_eq!(&blank[..3], &["blank02_Encoding.bmp", "100", "100"]);
    assert!(blank[3..].iter().all(|v| v == "NA"));

    let face = &rows[2];
    assert_eq!(face[0], "face01_Encoding.bmp");
    let cx: f32 = face[3].parse().unwrap();
    let cy: f32 = face[4].parse().unwrap();
    assert!((cx - 100.0).abs() <= 3.0, "cx {}", cx);
    assert!((cy - 100.0).abs() <= 3.0, "cy {}", cy);
    assert!(face[7..].iter().all(|v| v != "NA"));
}

#[test]
fn cascade_run_adds_detector_columns() {
    let input = stimulus_dir();
    let out = tempfile::tempdir().unwrap();
    let csv_path = out.path().join("facedata.csv");

    let cascade = DetectorCascade::new(vec![Box::new(WidthDetector(200))]);
    let report = pipeline(PipelineConfig::default())
        .with_cascade(cascade)
        .run(input.path(), LandmarkScheme::Canonical, &csv_path, false)
        .unwrap();
    assert_eq!(report.failures, vec!["blank02_Encoding.bmp".to_string()]);

    let rows = read_rows(&csv_path);
    assert_eq!(rows[0].len(), 9 + 2 * 68);
    assert_eq!(&rows[0][7..9], &["detector", "confidence"]);

    let blank = &rows[1];
    assert_eq!(&blank[7..9], &["none", "NA"]);
    assert!(blank[9..].iter().all(|v| v == "NA"));

    let face = &rows[2];
    assert_eq!(&face[7..9], &["width-gate", "0.877"]);
    // Every landmark lies inside the detector box, not the oval.
    for pair in face[9..].chunks(2) {
        let x: f32 = pair[0].parse().unwrap();
        let y: f32 = pair[1].parse().unwrap();
        assert!((20.0..=120.0).contains(&x) && (20.0..=140.0).contains(&y), "({}, {})", x, y);
    }
}

#[test]
fn reruns_are_byte_identical() {
    let input = stimulus_dir();
    let out = tempfile::tempdir().unwrap();
    let csv_path = out.path().join("facedata.csv");

    let mut p = pipeline(PipelineConfig::default());
    p.run(input.path(), LandmarkScheme::Extended, &csv_path, false)
        .unwrap();
    let first = fs::read(&csv_path).unwrap();
    p.run(input.path(), LandmarkScheme::Extended, &csv_path, false)
        .unwrap();
    assert_eq!(first, fs::read(&csv_path).unwrap());
}

#[test]
fn annotation_dir_is_recreated() {
    let input = stimulus_dir();
    let out = tempfile::tempdir().unwrap();
    let csv_path = out.path().join("facedata.csv");
    let annotate_dir = out.path().join("_landmarks");
    fs::create_dir_all(&annotate_dir).unwrap();
    fs::write(annotate_dir.join("stale.png"), b"old").unwrap();

    pipeline(PipelineConfig::default())
        .run(input.path(), LandmarkScheme::Canonical, &csv_path, true)
        .unwrap();

    let mut names: Vec<String> = fs::read_dir(&annotate_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["blank02_Encoding.png", "face01_Encoding.png"]);

    let annotated = image::open(annotate_dir.join("face01_Encoding.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(annotated.dimensions(), (200, 200));
    assert!(annotated.pixels().any(|p| *p == Rgb([0, 255, 0])));
    assert!(annotated.pixels().any(|p| *p == Rgb([255, 0, 0])));
}

#[test]
fn mirror_receives_same_csv() {
    let input = stimulus_dir();
    let out = tempfile::tempdir().unwrap();
    let csv_path = out.path().join("facedata.csv");
    let mirror: PathBuf = out.path().join("data").join("facedata.csv");

    let config = PipelineConfig {
        mirror_csv: Some(mirror.clone()),
        ..PipelineConfig::default()
    };
    let report = pipeline(config)
        .run(input.path(), LandmarkScheme::Canonical, &csv_path, false)
        .unwrap();

    assert_eq!(report.outputs, vec![csv_path.clone(), mirror.clone()]);
    assert_eq!(fs::read(&csv_path).unwrap(), fs::read(&mirror).unwrap());
}

#[test]
fn empty_directory_is_an_error_and_writes_nothing() {
    let input = tempfile::tempdir().unwrap();
    fs::write(input.path().join("notes.txt"), "no stimuli here").unwrap();
    let out = tempfile::tempdir().unwrap();
    let csv_path = out.path().join("facedata.csv");

    let result = pipeline(PipelineConfig::default()).run(
        input.path(),
        LandmarkScheme::Canonical,
        &csv_path,
        false,
    );
    assert!(matches!(result, Err(Error::EmptyInput { .. })));
    assert!(!csv_path.exists());
}

#[test]
fn unreadable_stimulus_aborts_run() {
    let input = tempfile::tempdir().unwrap();
    fs::write(input.path().join("broken_Encoding.bmp"), b"not a bitmap").unwrap();
    let out = tempfile::tempdir().unwrap();
    let csv_path = out.path().join("facedata.csv");

    let result = pipeline(PipelineConfig::default()).run(
        input.path(),
        LandmarkScheme::Canonical,
        &csv_path,
        false,
    );
    assert!(matches!(result, Err(Error::Image(_))));
    assert!(!csv_path.exists());
}

fn stimulus_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".bmp"))
        .collect();
    names.sort();
    names
}

#[test]
fn blank_annotate_dir_never_wipes_stimuli() {
    let input = stimulus_dir();
    let before = stimulus_names(input.path());
    let csv_path = input.path().join("facedata.csv");

    let config = PipelineConfig {
        annotate_dir: PathBuf::new(),
        ..PipelineConfig::default()
    };
    let result = pipeline(config).run(input.path(), LandmarkScheme::Canonical, &csv_path, true);

    assert!(matches!(result, Err(Error::InvalidParams(_))));
    assert_eq!(stimulus_names(input.path()), before);
}

#[test]
fn annotate_dir_holding_the_stimuli_is_refused() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("stimuli");
    fs::create_dir_all(&input).unwrap();
    face_stimulus(120, 120)
        .save(input.join("face01_Encoding.bmp"))
        .unwrap();
    let out = tempfile::tempdir().unwrap();
    let csv_path = out.path().join("facedata.csv");

    for dir in [input.clone(), root.path().to_path_buf()] {
        let config = PipelineConfig {
            annotate_dir: dir,
            ..PipelineConfig::default()
        };
        let result = pipeline(config).run(&input, LandmarkScheme::Canonical, &csv_path, true);
        assert!(matches!(result, Err(Error::InvalidParams(_))));
        assert_eq!(stimulus_names(&input), vec!["face01_Encoding.bmp"]);
        assert!(!csv_path.exists());
    }
}
