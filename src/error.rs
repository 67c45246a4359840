use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Failed to replace output file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[cfg(feature = "onnx")]
    #[error("ONNX runtime error: {0}")]
    Onnx(#[from] ort::Error),

    #[error("No images containing '{suffix}' found in {dir}")]
    EmptyInput { dir: PathBuf, suffix: String },

    #[error("Unknown landmark scheme '{0}' (expected 68, extended or extended-no-mouth)")]
    UnknownScheme(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Model error: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, Error>;
