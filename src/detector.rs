//! Face detector backends and the fallback cascade over them.

use std::fmt;

use image::GrayImage;
use serde::Serialize;

use crate::error::Result;
use crate::oval::OvalResult;
use crate::types::BoundingBox;

/// A single face found by a detector backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub bbox: BoundingBox,
    /// Detector score, when the backend produces one.
    pub confidence: Option<f32>,
}

/// Pluggable face detection backend.
///
/// Implementations return the single best face in a grayscale image, or
/// `Ok(None)` when they find nothing. Errors are treated by the cascade as a
/// miss, never as fatal.
pub trait FaceDetector {
    /// Short identifier written to the `detector` output column.
    fn name(&self) -> &str;

    fn detect(&mut self, gray: &GrayImage) -> Result<Option<FaceBox>>;
}

/// Which source produced the face region of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DetectorKind {
    /// A named detector backend.
    Backend(String),
    /// The contour oval, used when every backend missed.
    Oval,
    /// Nothing found at all.
    NoFace,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::Backend(name) => f.write_str(name),
            DetectorKind::Oval => f.write_str("oval"),
            DetectorKind::NoFace => f.write_str("none"),
        }
    }
}

/// Output of [`DetectorCascade::detect`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub bbox: Option<BoundingBox>,
    pub source: DetectorKind,
    /// Only ever set for [`DetectorKind::Backend`].
    pub confidence: Option<f32>,
}

impl DetectionResult {
    /// Resolve a face region from the oval alone.
    pub fn from_oval(oval: &OvalResult) -> Self {
        if oval.success {
            Self {
                bbox: Some(oval.rect.to_bbox()),
                source: DetectorKind::Oval,
                confidence: None,
            }
        } else {
            Self {
                bbox: None,
                source: DetectorKind::NoFace,
                confidence: None,
            }
        }
    }
}

/// Ordered list of detector backends, best quality first.
///
/// The first backend returning a face wins; later backends are not queried.
/// When all backends miss, the contour oval is used if it was found.
#[derive(Default)]
pub struct DetectorCascade {
    backends: Vec<Box<dyn FaceDetector>>,
}

impl DetectorCascade {
    pub fn new(backends: Vec<Box<dyn FaceDetector>>) -> Self {
        Self { backends }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    pub fn detect(&mut self, gray: &GrayImage, oval: &OvalResult) -> DetectionResult {
        for backend in &mut self.backends {
            match backend.detect(gray) {
                Ok(Some(face)) => {
                    log::debug!("face found by {} ({:?})", backend.name(), face.confidence);
                    return DetectionResult {
                        bbox: Some(face.bbox),
                        source: DetectorKind::Backend(backend.name().to_string()),
                        confidence: face.confidence,
                    };
                }
                Ok(None) => log::trace!("{} found no face", backend.name()),
                Err(e) => log::warn!("detector {} failed, trying next: {}", backend.name(), e),
            }
        }
        DetectionResult::from_oval(oval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::PixelRect;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Stub {
        name: &'static str,
        answer: Option<FaceBox>,
        fail: bool,
        calls: Rc<Cell<usize>>,
    }

    impl Stub {
        fn boxed(
            name: &'static str,
            answer: Option<FaceBox>,
            calls: &Rc<Cell<usize>>,
        ) -> Box<dyn FaceDetector> {
            Box::new(Stub {
                name,
                answer,
                fail: false,
                calls: Rc::clone(calls),
            })
        }
    }

    impl FaceDetector for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn detect(&mut self, _: &GrayImage) -> Result<Option<FaceBox>> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(Error::Model("backend crashed".into()));
            }
            Ok(self.answer)
        }
    }

    fn face(x: f32, conf: f32) -> Option<FaceBox> {
        Some(FaceBox {
            bbox: BoundingBox::new(x, 10.0, 50.0, 60.0),
            confidence: Some(conf),
        })
    }

    fn found_oval() -> OvalResult {
        OvalResult {
            rect: PixelRect::new(20, 30, 80, 100),
            success: true,
        }
    }

    #[test]
    fn first_hit_wins_and_later_backends_are_skipped() {
        let calls: Vec<_> = (0..3).map(|_| Rc::new(Cell::new(0))).collect();
        let mut cascade = DetectorCascade::new(vec![
            Stub::boxed("mtcnn", None, &calls[0]),
            Stub::boxed("haar", face(5.0, 0.8), &calls[1]),
            Stub::boxed("hog", face(7.0, 0.9), &calls[2]),
        ]);
        let img = GrayImage::new(10, 10);

        let first = cascade.detect(&img, &found_oval());
        assert_eq!(first.source, DetectorKind::Backend("haar".into()));
        assert_eq!(first.confidence, Some(0.8));
        assert_eq!(first.bbox.unwrap().x, 5.0);
        assert_eq!(calls[2].get(), 0);

        let second = cascade.detect(&img, &found_oval());
        assert_eq!(first, second);
        assert_eq!(calls[0].get(), 2);
        assert_eq!(calls[1].get(), 2);
        assert_eq!(calls[2].get(), 0);
    }

    #[test]
    fn falls_back_to_oval() {
        let calls = Rc::new(Cell::new(0));
        let mut cascade = DetectorCascade::new(vec![Stub::boxed("a", None, &calls)]);
        let result = cascade.detect(&GrayImage::new(4, 4), &found_oval());

        assert_eq!(result.source, DetectorKind::Oval);
        assert_eq!(result.confidence, None);
        assert_eq!(result.bbox, Some(BoundingBox::new(20.0, 30.0, 80.0, 100.0)));
    }

    #[test]
    fn none_when_everything_misses() {
        let calls = Rc::new(Cell::new(0));
        let mut cascade = DetectorCascade::new(vec![
            Stub::boxed("a", None, &calls),
            Stub::boxed("b", None, &calls),
        ]);
        let result = cascade.detect(&GrayImage::new(100, 100), &OvalResult::failed());

        assert_eq!(result.source, DetectorKind::NoFace);
        assert_eq!(result.bbox, None);
        assert_eq!(result.confidence, None);
        assert_eq!(result.source.to_string(), "none");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn backend_error_counts_as_miss() {
        let calls = Rc::new(Cell::new(0));
        let mut cascade = DetectorCascade::new(vec![
            Box::new(Stub {
                name: "broken",
                answer: None,
                fail: true,
                calls: Rc::clone(&calls),
            }),
            Stub::boxed("ok", face(1.0, 0.5), &calls),
        ]);
        let result = cascade.detect(&GrayImage::new(4, 4), &OvalResult::failed());
        assert_eq!(result.source.to_string(), "ok");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn empty_cascade_is_oval_only() {
        let mut cascade = DetectorCascade::default();
        assert!(cascade.is_empty());
        let result = cascade.detect(&GrayImage::new(4, 4), &found_oval());
        assert_eq!(result, DetectionResult::from_oval(&found_oval()));
    }
}
