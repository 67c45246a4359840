//! CLI for batch landmark extraction and oval parameter tuning.
//!
//! Usage:
//!   stim-face process <dir> -o facedata.csv --landmark-model face_landmark.onnx
//!   stim-face process <dir> -o facedata.csv --seeta-model seeta.bin --annotate
//!   stim-face tune <dir> --landmark-model face_landmark.onnx

use std::io::{self, BufRead};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stim_face::{
    BatchPipeline, Command, FaceMeshConfig, FaceMeshModel, LandmarkExtractor, LandmarkScheme,
    PipelineConfig, Report, TuningConsole,
};

#[cfg(feature = "rustface")]
use stim_face::{build_detectors, DetectorCascade, DetectorConfig};

#[derive(Parser, Debug)]
#[command(name = "stim-face")]
#[command(author, version, about = "Face oval and landmark extraction for stimulus images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Mode,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Process every stimulus in a directory into a CSV
    Process {
        #[command(flatten)]
        common: CommonArgs,

        /// Output CSV path
        #[arg(short, long, default_value = "facedata.csv")]
        output: PathBuf,

        /// Save annotated images next to the CSV
        #[arg(long)]
        annotate: bool,

        /// Also write the CSV here
        #[arg(long)]
        mirror: Option<PathBuf>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Step through images and tune oval parameters with key commands on stdin
    Tune {
        #[command(flatten)]
        common: CommonArgs,

        /// Where the current view is written after every command
        #[arg(long, default_value = "preview.png")]
        preview: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Directory of stimulus images
    image_dir: PathBuf,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Landmark scheme: 68, extended or extended-no-mouth
    #[arg(short, long)]
    scheme: Option<LandmarkScheme>,

    /// Only files whose name contains this are processed
    #[arg(long)]
    suffix: Option<String>,

    /// SeetaFace model; enables the detector cascade
    #[arg(long)]
    seeta_model: Option<PathBuf>,

    /// Face mesh ONNX model
    #[arg(long)]
    landmark_model: Option<PathBuf>,

    /// Face mesh ONNX model with iris refinement
    #[arg(long)]
    refined_model: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(mode: Mode) -> Result<(), Box<dyn std::error::Error>> {
    match mode {
        Mode::Process {
            common,
            output,
            annotate,
            mirror,
            json,
        } => {
            let mut config = load_config(&common)?;
            if mirror.is_some() {
                config.mirror_csv = mirror;
            }
            let scheme = config.scheme;
            let extractor = build_extractor(&config)?;

            let mut pipeline = BatchPipeline::new(config.clone(), extractor);
            if let Some(cascade) = build_cascade(&config)? {
                pipeline = pipeline.with_cascade(cascade);
            }

            let report = pipeline.run(&common.image_dir, scheme, &output, annotate)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", format_report(&report));
            }
        }
        Mode::Tune { common, preview } => {
            let config = load_config(&common)?;
            let extractor = build_extractor(&config)?;
            let mut console = TuningConsole::open(
                &common.image_dir,
                &config.image_suffix,
                config.oval.clone(),
                config.scheme,
                extractor,
            )?;
            if let Some(cascade) = build_cascade(&config)? {
                console = console.with_cascade(cascade);
            }

            eprintln!("Keys: ] [ next/prev, a z s x thresholds, d c sigma, \\ stage,");
            eprintln!("      q all points, w refine, t labels, p print, / save, Esc or EOF quit");
            console.run(read_commands(), |view| {
                view.save(&preview)?;
                log::info!("view written to {}", preview.display());
                Ok(())
            })?;
        }
    }
    Ok(())
}

fn load_config(common: &CommonArgs) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &common.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(scheme) = common.scheme {
        config.scheme = scheme;
    }
    if let Some(suffix) = &common.suffix {
        config.image_suffix = suffix.clone();
    }
    #[cfg(feature = "rustface")]
    if let Some(model) = &common.seeta_model {
        config.detectors = DetectorConfig::tiers(model);
    }
    #[cfg(not(feature = "rustface"))]
    if common.seeta_model.is_some() {
        return Err("built without the rustface feature, --seeta-model is unavailable".into());
    }
    if let Some(model) = &common.landmark_model {
        let mut mesh = config.landmark_model.take().unwrap_or_default();
        mesh.model = model.clone();
        config.landmark_model = Some(mesh);
    }
    if let Some(refined) = &common.refined_model {
        let mut mesh = config.landmark_model.take().unwrap_or_default();
        mesh.refined_model = Some(refined.clone());
        config.landmark_model = Some(mesh);
    }
    config.validate()?;
    Ok(config)
}

fn build_extractor(config: &PipelineConfig) -> Result<LandmarkExtractor, Box<dyn std::error::Error>> {
    let mesh: FaceMeshConfig = config
        .landmark_model
        .clone()
        .ok_or("no landmark model configured (use --landmark-model or the config file)")?;
    log::debug!("loading face mesh from {}", mesh.model.display());
    let model = FaceMeshModel::new(mesh)?;
    Ok(LandmarkExtractor::new(Box::new(model)))
}

#[cfg(feature = "rustface")]
fn build_cascade(
    config: &PipelineConfig,
) -> Result<Option<DetectorCascade>, Box<dyn std::error::Error>> {
    if config.detectors.is_empty() {
        return Ok(None);
    }
    let cascade = DetectorCascade::new(build_detectors(&config.detectors)?);
    log::debug!("detector cascade: {}", cascade.backend_names().join(" -> "));
    Ok(Some(cascade))
}

#[cfg(not(feature = "rustface"))]
fn build_cascade(
    _config: &PipelineConfig,
) -> Result<Option<stim_face::DetectorCascade>, Box<dyn std::error::Error>> {
    Ok(None)
}

/// Keys from stdin, one command per character; unknown keys are ignored.
/// The literal word `esc` on a line stands for the Escape key.
fn read_commands() -> impl Iterator<Item = Command> {
    io::stdin()
        .lock()
        .lines()
        .map_while(|line| line.ok())
        .flat_map(|line| {
            let keys: Vec<char> = if line.trim() == "esc" {
                vec![Command::ESC]
            } else {
                line.chars().collect()
            };
            keys.into_iter()
        })
        .filter_map(Command::from_key)
}

fn format_report(report: &Report) -> String {
    let mut s = String::new();
    s.push_str(&format!("Processed: {} images\n", report.processed));
    for path in &report.outputs {
        s.push_str(&format!("Wrote: {}\n", path.display()));
    }
    if report.failures.is_empty() {
        s.push_str("\nAll images processed successfully.\n");
        return s;
    }
    s.push_str(&format!("\nFailures ({}):\n", report.failures.len()));
    for name in &report.failures {
        s.push_str(&format!("  {}\n", name));
    }
    s
}
