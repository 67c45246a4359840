//! GUI frontend for the oval/landmark tuning console.
//!
//! Run with: cargo run --features gui,onnx --bin stim-face-gui

use eframe::egui;
use image::RgbImage;
use std::path::PathBuf;
use stim_face::{
    Command, FaceMeshConfig, FaceMeshModel, LandmarkExtractor, LandmarkScheme, Outcome,
    PipelineConfig, Stage, TuningConsole,
};

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1024.0, 768.0]),
        ..Default::default()
    };

    eframe::run_native(
        "stim-face - Oval & Landmark Tuning",
        options,
        Box::new(|cc| Ok(Box::new(TuneApp::new(cc)))),
    )
}

struct TuneApp {
    console: Option<TuningConsole>,
    view: Option<RgbImage>,
    texture: Option<egui::TextureHandle>,
    dirty: bool,
    status: String,
    printed: Vec<String>,

    // Settings
    config: PipelineConfig,
    landmark_model_path: String,
    refined_model_path: String,
    seeta_model_path: String,
}

impl TuneApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        Self {
            console: None,
            view: None,
            texture: None,
            dirty: false,
            status: "Pick a stimulus folder to begin".to_string(),
            printed: Vec::new(),
            config: PipelineConfig::default(),
            landmark_model_path: "face_landmark.onnx".to_string(),
            refined_model_path: String::new(),
            seeta_model_path: String::new(),
        }
    }

    fn open_dir(&mut self, dir: PathBuf) {
        match self.build_console(&dir) {
            Ok(console) => {
                self.status = format!("Opened {}", dir.display());
                self.console = Some(console);
                self.dirty = true;
            }
            Err(e) => self.status = format!("Failed to open {}: {}", dir.display(), e),
        }
    }

    fn build_console(&self, dir: &std::path::Path) -> Result<TuningConsole, Box<dyn std::error::Error>> {
        let mesh = FaceMeshConfig {
            model: PathBuf::from(&self.landmark_model_path),
            refined_model: (!self.refined_model_path.is_empty())
                .then(|| PathBuf::from(&self.refined_model_path)),
            ..FaceMeshConfig::default()
        };
        let extractor = LandmarkExtractor::new(Box::new(FaceMeshModel::new(mesh)?));
        let console = TuningConsole::open(
            dir,
            &self.config.image_suffix,
            self.config.oval.clone(),
            self.config.scheme,
            extractor,
        )?;

        #[cfg(feature = "rustface")]
        if !self.seeta_model_path.is_empty() {
            let tiers = stim_face::DetectorConfig::tiers(&self.seeta_model_path);
            let cascade = stim_face::DetectorCascade::new(stim_face::build_detectors(&tiers)?);
            return Ok(console.with_cascade(cascade));
        }
        Ok(console)
    }

    fn send(&mut self, cmd: Command, ctx: &egui::Context) {
        let (Some(console), Some(view)) = (self.console.as_mut(), self.view.as_ref()) else {
            return;
        };
        match console.handle(cmd, view) {
            Ok(Outcome::Exit) => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
            Ok(Outcome::Print(line)) => {
                println!("{}", line);
                self.printed.push(line);
            }
            Ok(Outcome::Save(path)) => self.status = format!("Saved {}", path.display()),
            Ok(Outcome::Continue) => {}
            Err(e) => self.status = format!("Command failed: {}", e),
        }
        self.dirty = true;
    }

    fn refresh(&mut self, ctx: &egui::Context) {
        let Some(console) = self.console.as_mut() else {
            return;
        };
        match console.render() {
            Ok(view) => {
                let size = [view.width() as usize, view.height() as usize];
                let color_image = egui::ColorImage::from_rgb(size, view.as_raw());
                self.texture = Some(ctx.load_texture("view", color_image, Default::default()));
                self.view = Some(view);
            }
            Err(e) => self.status = format!("Render failed: {}", e),
        }
        self.dirty = false;
    }

    fn collect_commands(ctx: &egui::Context) -> Vec<Command> {
        if ctx.wants_keyboard_input() {
            return Vec::new();
        }
        ctx.input(|i| {
            i.events
                .iter()
                .flat_map(|event| match event {
                    egui::Event::Text(text) => text.chars().filter_map(Command::from_key).collect::<Vec<_>>(),
                    egui::Event::Key {
                        key: egui::Key::Escape,
                        pressed: true,
                        ..
                    } => vec![Command::Exit],
                    _ => Vec::new(),
                })
                .collect()
        })
    }
}

impl eframe::App for TuneApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for cmd in Self::collect_commands(ctx) {
            self.send(cmd, ctx);
        }

        egui::TopBottomPanel::top("menu").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Open Folder...").clicked() {
                        if let Some(dir) = rfd::FileDialog::new().pick_folder() {
                            self.open_dir(dir);
                        }
                        ui.close_menu();
                    }
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
            });
        });

        egui::SidePanel::left("controls").min_width(250.0).show(ctx, |ui| {
            ui.heading("Models");
            ui.separator();

            ui.label("Face Mesh Model:");
            ui.text_edit_singleline(&mut self.landmark_model_path);
            ui.label("Refined Face Mesh Model (optional):");
            ui.text_edit_singleline(&mut self.refined_model_path);
            ui.label("SeetaFace Model (optional):");
            ui.text_edit_singleline(&mut self.seeta_model_path);
            ui.add_space(8.0);

            egui::ComboBox::from_label("Scheme")
                .selected_text(self.config.scheme.name())
                .show_ui(ui, |ui| {
                    for scheme in [
                        LandmarkScheme::Canonical,
                        LandmarkScheme::Extended,
                        LandmarkScheme::ExtendedNoMouth,
                    ] {
                        ui.selectable_value(&mut self.config.scheme, scheme, scheme.name());
                    }
                });
            ui.label("Scheme and models apply when a folder is opened.");
            ui.add_space(16.0);

            ui.heading("State");
            ui.separator();
            if let Some(console) = &self.console {
                let state = console.state();
                let name = console
                    .current_path()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                ui.label(format!("Image {}/{}: {}", state.index + 1, state.count, name));
                ui.label(format!("View: {}", stage_label(state.stage)));
                ui.label(format!(
                    "Canny: {} / {}",
                    state.params.canny_low, state.params.canny_high
                ));
                ui.label(format!(
                    "Blur: d={} sigma_color={} sigma_space={}",
                    state.params.blur_diameter, state.params.sigma_color, state.params.sigma_space
                ));
                ui.label(format!(
                    "All points: {}  Refine: {}  Labels: {}",
                    state.show_all, state.refine, state.show_labels
                ));
            }
            ui.add_space(16.0);

            ui.heading("Keys");
            ui.separator();
            ui.label("] [  next / previous image");
            ui.label("a z  raise / lower Canny low");
            ui.label("s x  raise / lower Canny high");
            ui.label("d c  raise / lower sigma color");
            ui.label("\\    cycle view");
            ui.label("q w t  all points, refine, labels");
            ui.label("p print  / save  Esc quit");
            ui.add_space(16.0);

            ui.heading("Status");
            ui.separator();
            ui.label(&self.status);
            for line in self.printed.iter().rev().take(5) {
                ui.monospace(line);
            }
        });

        if self.dirty {
            self.refresh(ctx);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(ref texture) = self.texture {
                let available_size = ui.available_size();
                let texture_size = texture.size_vec2();

                // Scale to fit
                let scale = (available_size.x / texture_size.x)
                    .min(available_size.y / texture_size.y)
                    .min(1.0);
                let display_size = texture_size * scale;

                ui.centered_and_justified(|ui| {
                    ui.image((texture.id(), display_size));
                });
            } else {
                ui.centered_and_justified(|ui| {
                    ui.heading("Drop a folder here or use File > Open Folder");
                });
            }
        });

        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .filter(|p| p.is_dir())
                .collect()
        });
        if let Some(dir) = dropped.into_iter().next() {
            self.open_dir(dir);
        }
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Annotated => "annotated",
        Stage::Dilated => "dilated",
        Stage::Blurred => "blurred",
        Stage::Edges => "edges",
    }
}
