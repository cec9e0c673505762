use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the segmentation core and its record sources.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    /// Zero duration or zero detected peaks; the heart rate is undefined.
    #[error("insufficient signal: {0}")]
    InsufficientSignal(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to parse {context}: {message}")]
    Parse { context: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Opaque failure raised by an injected R-peak detector.
    #[error(transparent)]
    Detector(#[from] anyhow::Error),
}

pub type SegmentResult<T> = std::result::Result<T, SegmentError>;
