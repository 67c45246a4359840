//! Interactive parameter tuning over a stimulus directory.
//!
//! [`TuningState`] is a plain state machine driven by [`Command`]s. The
//! [`TuningConsole`] owns the analysis backends and re-renders the current
//! view from scratch after every command; frontends only deliver keys and
//! show the returned raster.

use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::annotate;
use crate::detector::DetectorCascade;
use crate::error::{Error, Result};
use crate::landmarks::LandmarkExtractor;
use crate::oval::{OvalEstimator, OvalParams};
use crate::pipeline::{list_stimuli, resolve_face, Stimulus};
use crate::scheme::LandmarkScheme;
use crate::types::Point;

/// Marker color of the console overlay.
const CONSOLE_LANDMARK_COLOR: image::Rgb<u8> = image::Rgb([255, 255, 255]);

/// Which raster the console displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Annotated,
    Dilated,
    Blurred,
    Edges,
}

impl Stage {
    pub fn next(self) -> Self {
        match self {
            Stage::Annotated => Stage::Dilated,
            Stage::Dilated => Stage::Blurred,
            Stage::Blurred => Stage::Edges,
            Stage::Edges => Stage::Annotated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    NextImage,
    PrevImage,
    RaiseLow,
    LowerLow,
    RaiseHigh,
    LowerHigh,
    RaiseSigmaColor,
    LowerSigmaColor,
    CycleStage,
    ToggleShowAll,
    ToggleRefine,
    ToggleLabels,
    PrintParams,
    SaveView,
    Exit,
}

impl Command {
    pub const ESC: char = '\u{1b}';

    pub fn from_key(key: char) -> Option<Command> {
        let cmd = match key {
            ']' => Command::NextImage,
            '[' => Command::PrevImage,
            'a' => Command::RaiseLow,
            'z' => Command::LowerLow,
            's' => Command::RaiseHigh,
            'x' => Command::LowerHigh,
            'd' => Command::RaiseSigmaColor,
            'c' => Command::LowerSigmaColor,
            '\\' => Command::CycleStage,
            'q' => Command::ToggleShowAll,
            'w' => Command::ToggleRefine,
            't' => Command::ToggleLabels,
            'p' => Command::PrintParams,
            '/' => Command::SaveView,
            Self::ESC => Command::Exit,
            _ => return None,
        };
        Some(cmd)
    }
}

/// What the frontend should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Print(String),
    Save(PathBuf),
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuningState {
    pub index: usize,
    pub count: usize,
    pub params: OvalParams,
    pub stage: Stage,
    pub show_all: bool,
    pub refine: bool,
    pub show_labels: bool,
}

impl TuningState {
    pub fn new(count: usize, params: OvalParams) -> Self {
        Self {
            index: 0,
            count,
            params,
            stage: Stage::Annotated,
            show_all: false,
            refine: true,
            show_labels: false,
        }
    }

    /// Apply a command. Print and save are reported back for the caller to
    /// carry out.
    pub fn apply(&mut self, cmd: Command) -> Outcome {
        let p = &mut self.params;
        match cmd {
            Command::NextImage => self.index = (self.index + 1).min(self.count.saturating_sub(1)),
            Command::PrevImage => self.index = self.index.saturating_sub(1),
            Command::RaiseLow => p.canny_low = (p.canny_low + 1).min(p.canny_high - 1),
            Command::LowerLow => p.canny_low = p.canny_low.saturating_sub(1).max(1),
            Command::RaiseHigh => p.canny_high = (p.canny_high + 1).min(255),
            Command::LowerHigh => p.canny_high = (p.canny_high - 1).max(p.canny_low + 1),
            Command::RaiseSigmaColor => p.sigma_color += 1.0,
            Command::LowerSigmaColor => p.sigma_color = (p.sigma_color - 1.0).max(1.0),
            Command::CycleStage => self.stage = self.stage.next(),
            Command::ToggleShowAll => self.show_all = !self.show_all,
            Command::ToggleRefine => self.refine = !self.refine,
            Command::ToggleLabels => self.show_labels = !self.show_labels,
            Command::PrintParams => return Outcome::Print(self.describe_params()),
            Command::SaveView => return Outcome::Save(PathBuf::from(format!("img_{}.png", self.index))),
            Command::Exit => return Outcome::Exit,
        }
        Outcome::Continue
    }

    fn describe_params(&self) -> String {
        let p = &self.params;
        format!(
            "{} {} {} {} {}",
            p.blur_diameter, p.sigma_color, p.sigma_space, p.canny_low, p.canny_high
        )
    }
}

pub struct TuningConsole {
    paths: Vec<PathBuf>,
    scheme: LandmarkScheme,
    estimator: OvalEstimator,
    cascade: Option<DetectorCascade>,
    extractor: LandmarkExtractor,
    state: TuningState,
    save_dir: PathBuf,
}

impl TuningConsole {
    pub fn open(
        image_dir: &Path,
        suffix: &str,
        params: OvalParams,
        scheme: LandmarkScheme,
        mut extractor: LandmarkExtractor,
    ) -> Result<Self> {
        params.validate()?;
        let paths = list_stimuli(image_dir, suffix)?;
        if paths.is_empty() {
            return Err(Error::EmptyInput {
                dir: image_dir.to_path_buf(),
                suffix: suffix.to_string(),
            });
        }
        let state = TuningState::new(paths.len(), params);
        extractor.set_refine(state.refine);
        Ok(Self {
            paths,
            scheme,
            estimator: OvalEstimator::default(),
            cascade: None,
            extractor,
            state,
            save_dir: PathBuf::from("."),
        })
    }

    pub fn with_cascade(mut self, cascade: DetectorCascade) -> Self {
        self.cascade = Some(cascade);
        self
    }

    /// Directory saved views are written to.
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    pub fn state(&self) -> &TuningState {
        &self.state
    }

    pub fn current_path(&self) -> &Path {
        &self.paths[self.state.index]
    }

    /// Recompute the current view from the image on disk and current params.
    pub fn render(&mut self) -> Result<RgbImage> {
        let stimulus = Stimulus::load(&self.paths[self.state.index])?;
        let stages = self
            .estimator
            .estimate_stages(&stimulus.gray, &self.state.params);

        let view = match self.state.stage {
            Stage::Dilated => annotate::gray_to_rgb(&stages.dilated),
            Stage::Blurred => annotate::gray_to_rgb(&stages.blurred),
            Stage::Edges => annotate::gray_to_rgb(&stages.edges),
            Stage::Annotated => {
                let mut canvas = stimulus.rgb.clone();
                annotate::draw_oval(&mut canvas, &stages.result, annotate::OVAL_COLOR);
                let face = resolve_face(self.cascade.as_mut(), &stimulus.gray, &stages.result);
                if let Some(dense) = self.extractor.infer_dense(&stimulus.rgb, face.bbox.as_ref()) {
                    let (w, h) = stimulus.dimensions();
                    let show_all = self.state.show_all;
                    let scheme = self.scheme;
                    // Dense indices in the show-all view, scheme positions otherwise.
                    let (points, labels): (Vec<Point>, Vec<usize>) = dense
                        .points
                        .iter()
                        .enumerate()
                        .filter_map(|(j, p)| {
                            let label = if show_all { Some(j) } else { scheme.position_of(j) }?;
                            Some((p.to_pixels(w, h), label))
                        })
                        .unzip();
                    annotate::draw_landmarks(&mut canvas, &points, CONSOLE_LANDMARK_COLOR);
                    if self.state.show_labels {
                        annotate::draw_labels(&mut canvas, &points, &labels, annotate::LABEL_COLOR);
                    }
                }
                canvas
            }
        };
        Ok(view)
    }

    /// Apply a command, carrying out its side effects against `view`, the
    /// raster currently on screen.
    pub fn handle(&mut self, cmd: Command, view: &RgbImage) -> Result<Outcome> {
        let refine = self.state.refine;
        let outcome = match self.state.apply(cmd) {
            Outcome::Print(params) => {
                let name = self
                    .current_path()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Outcome::Print(format!("{} {}", name, params))
            }
            Outcome::Save(name) => {
                let path = self.save_dir.join(name);
                view.save(&path)?;
                log::info!("saved view to {}", path.display());
                Outcome::Save(path)
            }
            other => other,
        };
        if self.state.refine != refine {
            self.extractor.set_refine(self.state.refine);
        }
        Ok(outcome)
    }

    /// Drive the console from a command stream until it ends or `Exit`.
    ///
    /// `show` receives every rendered view.
    pub fn run<I, F>(&mut self, commands: I, mut show: F) -> Result<()>
    where
        I: IntoIterator<Item = Command>,
        F: FnMut(&RgbImage) -> Result<()>,
    {
        let mut commands = commands.into_iter();
        loop {
            let view = self.render()?;
            show(&view)?;
            let Some(cmd) = commands.next() else {
                return Ok(());
            };
            match self.handle(cmd, &view)? {
                Outcome::Exit => return Ok(()),
                Outcome::Print(line) => println!("{}", line),
                Outcome::Continue | Outcome::Save(_) => {}
            }
        }
    }
}
