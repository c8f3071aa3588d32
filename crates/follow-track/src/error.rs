//! Error types for the follow tracking pipeline.

use thiserror::Error;

/// Result type alias for the follow tracking library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the pipeline and its collaborators.
///
/// Startup failures (`Acquisition` on open, `ModelLoad`, `ThreadSpawn`) are fatal.
/// Everything raised while processing a single frame is contained by the main loop.
#[derive(Error, Debug)]
pub enum Error {
    #[error("frame acquisition failed: {0}")]
    Acquisition(String),

    #[error("frame source exhausted")]
    EndOfStream,

    #[error("frame buffer allocation failed: {0}")]
    Allocation(String),

    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("resource release failed: {0}")]
    Release(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("kalman filter failure: {0}")]
    Filter(#[from] ndarray_linalg::error::LinalgError),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("report emission failed: {0}")]
    Report(String),

    #[error("failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("frame producer thread panicked")]
    ProducerPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn acquisition<S: Into<String>>(msg: S) -> Self {
        Self::Acquisition(msg.into())
    }

    pub fn allocation<S: Into<String>>(msg: S) -> Self {
        Self::Allocation(msg.into())
    }

    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn release<S: Into<String>>(msg: S) -> Self {
        Self::Release(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
