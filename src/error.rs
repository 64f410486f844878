use thiserror::Error;
use uuid::Uuid;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
    #[error("Failed to bind to {1}: {0}")]
    Bind(std::io::Error, String),
    #[error("Failed to accept connection: {0}")]
    Accept(std::io::Error),
    #[error("Client error: {0}")]
    Client(String),
    #[error("Failed to send shutdown to client handle: {0}")]
    ClientShutdown(Uuid),
    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),
    #[error("UI error: {0}")]
    Ui(String),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Jutsu {0} has an empty sequence")]
    EmptySequence(String),
    #[error("Jutsu {name} has invalid duration {duration}")]
    InvalidDuration { name: String, duration: f64 },
    #[error("Jutsu {name} combo part {part} has step {at_step} outside 1..={len}")]
    ComboStepOutOfRange {
        name: String,
        part: String,
        at_step: usize,
        len: usize,
    },
    #[error("Jutsu {name} combo steps are not strictly increasing at {part}")]
    ComboStepOrder { name: String, part: String },
    #[error("Unknown jutsu: {0}")]
    UnknownJutsu(String),
    #[error("Catalog is empty")]
    Empty,
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to read frame: {0}")]
    Read(std::io::Error),
    #[error("Failed to write frame: {0}")]
    Write(std::io::Error),
    #[error("Frame of {0} bytes exceeds the {1} byte limit")]
    TooLarge(usize, usize),
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Failed to encode image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera is not available: {0}")]
    Unavailable(String),
    #[error("Camera returned no frame")]
    NoFrame,
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Model unavailable: {0}")]
    Unavailable(String),
    #[error("Inference failed: {0}")]
    Failed(String),
    #[error("Inference timed out")]
    Timeout,
}

#[derive(Error, Debug)]
pub enum EffectError {
    #[error("Effect {0} failed: {1}")]
    Failed(String, String),
}

#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("Segmentation model unavailable: {0}")]
    Unavailable(String),
    #[error("Segmentation failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("Score service is offline")]
    Offline,
    #[error("Request failed: {0}")]
    Request(String),
}
